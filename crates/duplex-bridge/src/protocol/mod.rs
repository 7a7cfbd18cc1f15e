//! Wire protocol for the duplex channel.
//!
//! Every frame is a single line of UTF-8 JSON carrying a string `type`
//! discriminator. [`Message`] is the closed set of frame kinds understood by
//! either side of the channel; [`encode`] and [`decode`] implement the line
//! framing.
//!
//! Decoding never fails. A line that is not JSON becomes [`Message::Text`];
//! a JSON value whose `type` is missing, not a string, not a known frame kind,
//! or whose fields do not match that kind becomes [`Message::Unknown`]
//! carrying the raw `type` value.
//!
//! Correlation ids are carried as raw JSON values so they round-trip
//! verbatim; a request without an id is answered with `"id": null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single frame exchanged over the duplex channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Capabilities snapshot written once when the pump loop starts.
    #[serde(rename_all = "camelCase")]
    Ready {
        /// Target module specifier.
        #[serde(default)]
        target_specifier: String,
        /// Whether the target exports a message handler.
        #[serde(default)]
        has_exported_handler: bool,
        /// Whether a global message handler is installed.
        #[serde(default)]
        has_global_handler: bool,
        /// Whether a host-call result handler is available.
        #[serde(default)]
        has_rust_result_handler: bool,
        /// Whether an mfa-update handler is available.
        #[serde(default)]
        has_mfa_update_handler: bool,
        /// Modules loaded so far.
        #[serde(default)]
        modules: Vec<String>,
        /// Auxiliary factor list.
        #[serde(default)]
        mfa: Vec<String>,
        /// Runtime arguments.
        #[serde(default)]
        args: Vec<String>,
    },

    /// Liveness probe from the host.
    Ping {
        /// Optional sequence number echoed in the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<Value>,
    },

    /// Answer to a [`Message::Ping`].
    Pong {
        /// Sequence number of the ping, or `null`.
        seq: Value,
        /// Unix timestamp in milliseconds.
        at: u64,
    },

    /// Request for the script's message handler.
    Message {
        /// Correlation id.
        #[serde(default)]
        id: Option<Value>,
        /// Arbitrary payload.
        #[serde(default)]
        payload: Value,
    },

    /// Request originating from a process outside the host.
    ExternalMessage {
        /// Correlation id.
        #[serde(default)]
        id: Option<Value>,
        /// Arbitrary payload.
        #[serde(default)]
        payload: Value,
    },

    /// Successful answer to a message.
    MessageResult {
        /// Correlation id of the request.
        id: Option<Value>,
        /// Value returned by the handler.
        result: Value,
    },

    /// Failed answer to a message.
    Error {
        /// Correlation id of the request.
        id: Option<Value>,
        /// Human-readable failure.
        error: String,
    },

    /// Request to import a module while the session runs.
    Module {
        /// Correlation id.
        #[serde(default)]
        id: Option<Value>,
        /// Module specifier; validated by the dispatcher.
        #[serde(default)]
        specifier: Option<Value>,
    },

    /// A module was imported.
    ModuleLoaded {
        /// Correlation id of the request.
        id: Option<Value>,
        /// Imported specifier.
        specifier: String,
        /// Loaded module list after the import.
        modules: Vec<String>,
    },

    /// A module import failed.
    ModuleError {
        /// Correlation id of the request.
        id: Option<Value>,
        /// Specifier, when the request carried a string.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        specifier: Option<String>,
        /// Human-readable failure.
        error: String,
    },

    /// Request to append auxiliary factors.
    Mfa {
        /// Correlation id.
        #[serde(default)]
        id: Option<Value>,
        /// Several values; wins over `value`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Value>,
        /// A single value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },

    /// The auxiliary factor list changed.
    MfaUpdated {
        /// Correlation id of the request.
        id: Option<Value>,
        /// Full list after the update.
        mfa: Vec<String>,
    },

    /// Request to replace the runtime arguments.
    RuntimeArgs {
        /// Correlation id.
        #[serde(default)]
        id: Option<Value>,
        /// Replacement list; validated by the dispatcher.
        #[serde(default)]
        args: Option<Value>,
    },

    /// The runtime arguments were replaced.
    RuntimeArgsUpdated {
        /// Correlation id of the request.
        id: Option<Value>,
        /// New argument list.
        args: Vec<String>,
    },

    /// Host call issued by the script side.
    RustCall {
        /// Correlation id chosen by the caller.
        id: Value,
        /// Operation payload.
        payload: Value,
    },

    /// Successful answer to a host call.
    RustCallResult {
        /// Correlation id of the call.
        #[serde(default)]
        id: Value,
        /// Result produced by the host.
        #[serde(default)]
        result: Value,
    },

    /// Failed answer to a host call.
    RustCallError {
        /// Correlation id of the call.
        #[serde(default)]
        id: Value,
        /// Failure reported by the host; any JSON value is accepted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },

    /// Request to stop the session.
    Shutdown {
        /// Optional reason echoed in the acknowledgement; any JSON value is
        /// accepted and rendered as text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<Value>,
    },

    /// Acknowledges a [`Message::Shutdown`]; the last frame of a session.
    ShutdownAck {
        /// Reason given by the host, or `"requested"`.
        reason: String,
    },

    /// Answer to any frame the dispatcher does not handle.
    #[serde(rename_all = "camelCase")]
    Unknown {
        /// The `type` value that was received, or `null`.
        #[serde(default)]
        received_type: Value,
    },

    /// A line that was not JSON.
    Text {
        /// The raw line.
        raw: String,
    },
}

impl Message {
    /// Returns the wire name of the frame kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Message { .. } => "message",
            Self::ExternalMessage { .. } => "external_message",
            Self::MessageResult { .. } => "message_result",
            Self::Error { .. } => "error",
            Self::Module { .. } => "module",
            Self::ModuleLoaded { .. } => "module_loaded",
            Self::ModuleError { .. } => "module_error",
            Self::Mfa { .. } => "mfa",
            Self::MfaUpdated { .. } => "mfa_updated",
            Self::RuntimeArgs { .. } => "runtime_args",
            Self::RuntimeArgsUpdated { .. } => "runtime_args_updated",
            Self::RustCall { .. } => "rust_call",
            Self::RustCallResult { .. } => "rust_call_result",
            Self::RustCallError { .. } => "rust_call_error",
            Self::Shutdown { .. } => "shutdown",
            Self::ShutdownAck { .. } => "shutdown_ack",
            Self::Unknown { .. } => "unknown",
            Self::Text { .. } => "text",
        }
    }

    /// Builds an `unknown` reply for a received `type` value.
    #[must_use]
    pub const fn unknown(received_type: Value) -> Self {
        Self::Unknown { received_type }
    }

    /// Builds a `shutdown` request.
    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::Shutdown {
            reason: Some(Value::String(reason.into())),
        }
    }
}

/// Renders a free-form field as text: strings without quotes, `null` or an
/// absent field as `fallback`, anything else as JSON.
#[must_use]
pub fn render_text(value: Option<&Value>, fallback: &str) -> String {
    match value {
        None | Some(Value::Null) => fallback.to_owned(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Serialises a frame to a single line of JSON without a trailing newline.
///
/// # Errors
///
/// Returns the serialisation error; with the types in this crate this only
/// happens for maps with non-string keys inside caller-supplied payloads.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Parses a line into a [`Message`], degrading instead of failing.
#[must_use]
pub fn decode(line: &str) -> Message {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => {
            return Message::Text {
                raw: trimmed.to_owned(),
            };
        }
    };

    let received_type = value.get("type").cloned().unwrap_or(Value::Null);
    if !received_type.is_string() {
        return Message::unknown(received_type);
    }

    match serde_json::from_value::<Message>(value) {
        // A JSON frame tagged `text` did not come from the raw-line fallback.
        Ok(Message::Text { .. }) | Err(_) => Message::unknown(received_type),
        Ok(message) => message,
    }
}

#[cfg(test)]
mod tests;
