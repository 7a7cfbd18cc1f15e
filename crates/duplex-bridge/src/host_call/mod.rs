//! Script-to-host call correlation.
//!
//! The script side asks the host for privileged work by writing `rust_call`
//! frames; the host answers with `rust_call_result` or `rust_call_error`
//! carrying the same id. [`HostCallBridge`] allocates those frames, tracks
//! which ids are still outstanding, and emits the single bootstrap call a
//! session makes on its first `ping`.

use std::collections::HashSet;

use serde_json::{Value, json};
use tracing::warn;

use crate::handlers::HostCallReply;
use crate::protocol::Message;

const HOST_CALL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host_call");

/// Prefix of the id used by the bootstrap call.
pub const BOOTSTRAP_CALL_PREFIX: &str = "ts-rust-";

/// Tracks outstanding host calls for one session.
#[derive(Debug, Default)]
pub struct HostCallBridge {
    bootstrap_sent: bool,
    pending: HashSet<String>,
}

impl HostCallBridge {
    /// Creates a bridge that has not yet issued its bootstrap call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the bootstrap call has been emitted.
    #[must_use]
    pub const fn bootstrap_sent(&self) -> bool {
        self.bootstrap_sent
    }

    /// Number of calls without a reply.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` when `id` is awaiting a reply.
    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// Produces the bootstrap call on the first ping of the session.
    ///
    /// The id is `ts-rust-<seq>`, or `ts-rust-<now_ms>` when the ping had no
    /// sequence number.
    pub fn on_ping(&mut self, seq: Option<&Value>, now_ms: u64) -> Option<Message> {
        if self.bootstrap_sent {
            return None;
        }
        self.bootstrap_sent = true;

        let seq_text = seq.map(render_seq);
        let id = format!(
            "{BOOTSTRAP_CALL_PREFIX}{}",
            seq_text.as_deref().map_or_else(|| now_ms.to_string(), ToOwned::to_owned)
        );
        let text = format!(
            "hello from ts (seq={})",
            seq_text.as_deref().unwrap_or("n/a")
        );
        Some(self.call(id, json!({ "op": "uppercase", "text": text })))
    }

    /// Registers a call and returns the `rust_call` frame to write.
    pub fn call(&mut self, id: impl Into<String>, payload: Value) -> Message {
        let key: String = id.into();
        self.pending.insert(key.clone());
        Message::RustCall {
            id: Value::String(key),
            payload,
        }
    }

    /// Marks the call answered by `reply` as complete.
    ///
    /// Returns `false` for replies to ids that were never issued or were
    /// already answered; such replies are still worth forwarding, so this
    /// only logs.
    pub fn resolve(&mut self, reply: &HostCallReply) -> bool {
        let key = render_seq(reply.id());
        let known = self.pending.remove(&key);
        if !known {
            warn!(
                target: HOST_CALL_TARGET,
                id = %key,
                "reply for unknown host call"
            );
        }
        known
    }
}

/// Renders a JSON scalar the way string interpolation would: strings
/// without quotes, everything else as JSON text.
fn render_seq(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests;
