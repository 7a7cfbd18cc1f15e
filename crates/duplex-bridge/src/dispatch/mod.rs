//! Routing of decoded frames to state changes and handlers.
//!
//! [`Dispatcher`] owns the session state and every handler table. It never
//! touches the channel: each call to [`Dispatcher::dispatch`] appends the
//! frames to write to an outbox, in order, and tells the caller whether the
//! loop should continue. The pump loop in [`crate::pump`] does the I/O.
//!
//! Errors returned from `dispatch` come from handlers. Failures of a
//! message handler are already answered with an `error` frame; failures of
//! the host-result and mfa-update handlers are returned untouched so the
//! pump can log them. Any [`HandlerError::Fatal`] ends the session.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{HandlerError, SessionError};
use crate::handlers::{
    Delivery, DeliveryKind, GlobalScope, HandlerContext, HostCallReply, HostResultHandler,
    MessageHandler, MfaUpdate, MfaUpdateHandler, ModuleExports,
};
use crate::host_call::HostCallBridge;
use crate::loader::ModuleLoader;
use crate::protocol::{Message, render_text};
use crate::session::{SessionPhase, SessionSeed, SessionState};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Reason reported in `shutdown_ack` when the request gave none.
pub const DEFAULT_SHUTDOWN_REASON: &str = "requested";

/// Error text handed to result handlers when a `rust_call_error` has none.
pub const UNKNOWN_HOST_ERROR: &str = "unknown";

const INVALID_SPECIFIER: &str = "module specifier must be a non-empty string";
const INVALID_ARGS: &str = "runtime_args requires an array of strings";

/// Source of `pong` timestamps, in Unix milliseconds.
pub type Clock = fn() -> u64;

/// Current Unix time in milliseconds.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// What the pump loop does after a frame was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next frame.
    Continue,
    /// Stop reading; the session is over.
    Stop,
}

/// Routes frames for a single session.
pub struct Dispatcher {
    state: SessionState,
    loader: ModuleLoader,
    exports: ModuleExports,
    globals: GlobalScope,
    host_calls: HostCallBridge,
    phase: SessionPhase,
    shutdown_reason: Option<String>,
    clock: Clock,
}

impl Dispatcher {
    /// Validates the seed, imports the target and preloads modules.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingTarget`] for a missing or blank target,
    /// [`SessionError::TargetImport`] when the target cannot be imported and
    /// [`SessionError::Loader`] when a preload fails.
    pub fn bootstrap(seed: &SessionSeed, loader: ModuleLoader) -> Result<Self, SessionError> {
        let mut state = SessionState::from_seed(seed)?;
        let target = state.target_specifier().to_owned();
        let module =
            loader
                .import_target(&target)
                .map_err(|source| SessionError::TargetImport {
                    specifier: target.clone(),
                    source,
                })?;

        let mut globals = GlobalScope::default();
        module.install(&mut globals);
        let exports = module.exports();
        let preloaded = loader.preload(seed.modules(), &mut state, &mut globals)?;
        info!(
            target: DISPATCH_TARGET,
            specifier = %target,
            preloaded = preloaded.len(),
            "session bootstrapped"
        );

        Ok(Self {
            state,
            loader,
            exports,
            globals,
            host_calls: HostCallBridge::new(),
            phase: SessionPhase::Running,
            shutdown_reason: None,
            clock: unix_millis,
        })
    }

    /// Replaces the timestamp source used for `pong` frames.
    #[must_use]
    pub const fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Reason of the acknowledged shutdown, once one was received.
    #[must_use]
    pub fn shutdown_reason(&self) -> Option<&str> {
        self.shutdown_reason.as_deref()
    }

    /// Host calls still awaiting a reply.
    #[must_use]
    pub fn pending_host_calls(&self) -> usize {
        self.host_calls.pending_len()
    }

    pub(crate) const fn mark_stopped(&mut self) {
        self.phase = SessionPhase::Stopped;
    }

    /// Builds the `ready` capabilities frame.
    #[must_use]
    pub fn ready(&self) -> Message {
        Message::Ready {
            target_specifier: self.state.target_specifier().to_owned(),
            has_exported_handler: self.exports.message.is_some(),
            has_global_handler: self.globals.message_handler().is_some(),
            has_rust_result_handler: self.host_result_handler().is_some(),
            has_mfa_update_handler: self.mfa_update_handler().is_some(),
            modules: self.state.modules().to_vec(),
            mfa: self.state.mfa().to_vec(),
            args: self.state.args().to_vec(),
        }
    }

    /// Handles one frame, appending replies to `out` in write order.
    ///
    /// # Errors
    ///
    /// Returns handler failures that are not answered on the wire, and every
    /// fatal handler failure.
    pub fn dispatch(
        &mut self,
        message: Message,
        out: &mut Vec<Message>,
    ) -> Result<Flow, HandlerError> {
        match message {
            Message::Ping { seq } => {
                self.on_ping(seq, out);
                Ok(Flow::Continue)
            }
            Message::Message { id, payload } => {
                self.on_message(DeliveryKind::Message, id, &payload, out)
            }
            Message::ExternalMessage { id, payload } => {
                self.on_message(DeliveryKind::External, id, &payload, out)
            }
            Message::Module { id, specifier } => {
                self.on_module(id, specifier, out);
                Ok(Flow::Continue)
            }
            Message::Mfa { id, values, value } => self.on_mfa(id, values, value, out),
            Message::RuntimeArgs { id, args } => {
                self.on_runtime_args(id, args, out);
                Ok(Flow::Continue)
            }
            Message::RustCallResult { id, result } => {
                self.on_host_reply(&HostCallReply::Result { id, result }, out)
            }
            Message::RustCallError { id, error: raw } => {
                let error = render_text(raw.as_ref(), UNKNOWN_HOST_ERROR);
                self.on_host_reply(&HostCallReply::Error { id, error }, out)
            }
            Message::Shutdown { reason } => {
                let ack_reason = render_text(reason.as_ref(), DEFAULT_SHUTDOWN_REASON);
                self.phase = SessionPhase::ShuttingDown;
                self.shutdown_reason = Some(ack_reason.clone());
                info!(target: DISPATCH_TARGET, reason = %ack_reason, "shutdown requested");
                out.push(Message::ShutdownAck { reason: ack_reason });
                Ok(Flow::Stop)
            }
            Message::Unknown { received_type } => {
                out.push(Message::unknown(received_type));
                Ok(Flow::Continue)
            }
            Message::Text { .. } => {
                out.push(Message::unknown(Value::Null));
                Ok(Flow::Continue)
            }
            other => {
                debug!(target: DISPATCH_TARGET, kind = other.kind(), "frame not handled here");
                out.push(Message::unknown(Value::String(other.kind().to_owned())));
                Ok(Flow::Continue)
            }
        }
    }

    fn on_ping(&mut self, seq: Option<Value>, out: &mut Vec<Message>) {
        let now = (self.clock)();
        let bootstrap_call = self.host_calls.on_ping(seq.as_ref(), now);
        out.push(Message::Pong {
            seq: seq.unwrap_or(Value::Null),
            at: now,
        });
        out.extend(bootstrap_call);
    }

    fn on_message(
        &mut self,
        kind: DeliveryKind,
        id: Option<Value>,
        payload: &Value,
        out: &mut Vec<Message>,
    ) -> Result<Flow, HandlerError> {
        let handler: Option<Arc<dyn MessageHandler>> = self
            .exports
            .message
            .clone()
            .or_else(|| self.globals.message_handler());
        let request = self.globals.request_handler();

        let mut ctx = HandlerContext::new(&self.state, &mut self.host_calls, out);
        let outcome = if let Some(handler) = handler {
            let delivery = Delivery {
                kind,
                id: id.as_ref(),
                payload,
            };
            handler.handle(&delivery, &mut ctx)
        } else if let Some(request) = request {
            let text = match payload {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            request.handle(&text, &mut ctx)
        } else {
            Ok(Value::Null)
        };

        match outcome {
            Ok(result) => {
                out.push(Message::MessageResult { id, result });
                Ok(Flow::Continue)
            }
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "message handler failed");
                out.push(Message::Error {
                    id,
                    error: error.message().to_owned(),
                });
                if error.is_fatal() {
                    Err(error)
                } else {
                    Ok(Flow::Continue)
                }
            }
        }
    }

    fn on_module(&mut self, id: Option<Value>, raw: Option<Value>, out: &mut Vec<Message>) {
        let specifier = match raw {
            Some(Value::String(text)) if !text.trim().is_empty() => text,
            Some(Value::String(text)) => {
                out.push(Message::ModuleError {
                    id,
                    specifier: Some(text),
                    error: INVALID_SPECIFIER.to_owned(),
                });
                return;
            }
            _ => {
                out.push(Message::ModuleError {
                    id,
                    specifier: None,
                    error: INVALID_SPECIFIER.to_owned(),
                });
                return;
            }
        };

        match self
            .loader
            .load_live(&specifier, &mut self.state, &mut self.globals)
        {
            Ok(()) => out.push(Message::ModuleLoaded {
                id,
                specifier,
                modules: self.state.modules().to_vec(),
            }),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %specifier, %error, "module import failed");
                out.push(Message::ModuleError {
                    id,
                    specifier: Some(specifier),
                    error: error.to_string(),
                });
            }
        }
    }

    fn on_mfa(
        &mut self,
        id: Option<Value>,
        values: Option<Value>,
        value: Option<Value>,
        out: &mut Vec<Message>,
    ) -> Result<Flow, HandlerError> {
        let added = normalise_mfa(values, value);
        self.state.extend_mfa(added.iter().cloned());
        out.push(Message::MfaUpdated {
            id: id.clone(),
            mfa: self.state.mfa().to_vec(),
        });

        if added.is_empty() {
            return Ok(Flow::Continue);
        }
        let Some(handler) = self.mfa_update_handler() else {
            return Ok(Flow::Continue);
        };
        let update = MfaUpdate {
            id,
            added,
            mfa: self.state.mfa().to_vec(),
        };
        let mut ctx = HandlerContext::new(&self.state, &mut self.host_calls, out);
        handler.handle(&update, &mut ctx).map(|()| Flow::Continue)
    }

    fn on_runtime_args(&mut self, id: Option<Value>, args: Option<Value>, out: &mut Vec<Message>) {
        match args.as_ref().and_then(string_list) {
            Some(list) => {
                self.state.replace_args(list);
                out.push(Message::RuntimeArgsUpdated {
                    id,
                    args: self.state.args().to_vec(),
                });
            }
            None => out.push(Message::Error {
                id,
                error: INVALID_ARGS.to_owned(),
            }),
        }
    }

    fn on_host_reply(
        &mut self,
        reply: &HostCallReply,
        out: &mut Vec<Message>,
    ) -> Result<Flow, HandlerError> {
        self.host_calls.resolve(reply);
        match reply {
            HostCallReply::Result { id, result } => {
                info!(target: DISPATCH_TARGET, %id, %result, "host call result");
            }
            HostCallReply::Error { id, error } => {
                warn!(target: DISPATCH_TARGET, %id, %error, "host call error");
            }
        }

        let Some(handler) = self.host_result_handler() else {
            debug!(target: DISPATCH_TARGET, "no host result handler; reply discarded");
            return Ok(Flow::Continue);
        };
        let mut ctx = HandlerContext::new(&self.state, &mut self.host_calls, out);
        handler.handle(reply, &mut ctx).map(|()| Flow::Continue)
    }

    fn host_result_handler(&self) -> Option<Arc<dyn HostResultHandler>> {
        self.exports
            .host_result
            .clone()
            .or_else(|| self.globals.host_result_handler())
    }

    fn mfa_update_handler(&self) -> Option<Arc<dyn MfaUpdateHandler>> {
        self.exports
            .mfa_update
            .clone()
            .or_else(|| self.globals.mfa_update_handler())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state)
            .field("phase", &self.phase)
            .field("exports", &self.exports)
            .field("globals", &self.globals)
            .finish_non_exhaustive()
    }
}

/// Collects the values of an `mfa` frame. `values` wins over `value`;
/// non-string entries are dropped.
fn normalise_mfa(values: Option<Value>, value: Option<Value>) -> Vec<String> {
    match values.or(value) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        Some(Value::String(text)) => vec![text],
        _ => Vec::new(),
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(ToOwned::to_owned))
        .collect()
}
