//! Handler traits implemented by script modules.
//!
//! A [`ScriptModule`] contributes handlers in two ways. Its
//! [`ScriptModule::exports`] are consulted only when the module is the
//! session target. Its [`ScriptModule::install`] hook runs once when the
//! module is imported and may register handlers in the session's
//! [`GlobalScope`]. When both exist, the target's export wins.
//!
//! Every handler receives a [`HandlerContext`] giving read access to the
//! session state and the ability to issue host calls.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::HandlerError;
use crate::host_call::HostCallBridge;
use crate::protocol::Message;
use crate::session::SessionState;

/// Origin of a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    /// A `message` frame from the host.
    Message,
    /// An `external_message` frame forwarded from outside the host.
    External,
}

/// A request handed to a [`MessageHandler`].
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// Which frame carried the request.
    pub kind: DeliveryKind,
    /// Correlation id, if any.
    pub id: Option<&'a Value>,
    /// Request payload.
    pub payload: &'a Value,
}

/// A host-call reply handed to a [`HostResultHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostCallReply {
    /// The host completed the call.
    Result {
        /// Correlation id of the call.
        id: Value,
        /// Value produced by the host.
        result: Value,
    },
    /// The host rejected the call.
    Error {
        /// Correlation id of the call.
        id: Value,
        /// Human-readable failure.
        error: String,
    },
}

impl HostCallReply {
    /// Correlation id of the call.
    #[must_use]
    pub const fn id(&self) -> &Value {
        match self {
            Self::Result { id, .. } | Self::Error { id, .. } => id,
        }
    }

    /// Returns `true` for successful replies.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Result { .. })
    }
}

/// Notification sent to an [`MfaUpdateHandler`] after values were appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaUpdate {
    /// Correlation id of the originating `mfa` frame.
    pub id: Option<Value>,
    /// Values appended by this update.
    pub added: Vec<String>,
    /// Full list after the update.
    pub mfa: Vec<String>,
}

/// Handles `message` and `external_message` frames.
pub trait MessageHandler: Send + Sync {
    /// Produces the `result` for a request.
    ///
    /// # Errors
    ///
    /// A [`HandlerError::Failed`] is reported to the host as an `error`
    /// frame; a [`HandlerError::Fatal`] ends the session.
    fn handle(
        &self,
        delivery: &Delivery<'_>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Value, HandlerError>;
}

/// Generic request hook consulted when no [`MessageHandler`] exists.
///
/// String payloads are passed as-is; anything else is passed as JSON text.
pub trait RequestHandler: Send + Sync {
    /// Produces the `result` for a request.
    ///
    /// # Errors
    ///
    /// Same contract as [`MessageHandler::handle`].
    fn handle(&self, request: &str, ctx: &mut HandlerContext<'_>) -> Result<Value, HandlerError>;
}

/// Receives replies to host calls.
pub trait HostResultHandler: Send + Sync {
    /// Consumes a reply.
    ///
    /// # Errors
    ///
    /// Failures are logged by the pump loop, which keeps running unless the
    /// error is fatal.
    fn handle(
        &self,
        reply: &HostCallReply,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError>;
}

/// Observes additions to the auxiliary factor list.
pub trait MfaUpdateHandler: Send + Sync {
    /// Consumes an update.
    ///
    /// # Errors
    ///
    /// Failures are logged by the pump loop, which keeps running unless the
    /// error is fatal.
    fn handle(
        &self,
        update: &MfaUpdate,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), HandlerError>;
}

/// Handlers a target module exports.
#[derive(Clone, Default)]
pub struct ModuleExports {
    /// Message handler.
    pub message: Option<Arc<dyn MessageHandler>>,
    /// Host-call result handler.
    pub host_result: Option<Arc<dyn HostResultHandler>>,
    /// Auxiliary factor update handler.
    pub mfa_update: Option<Arc<dyn MfaUpdateHandler>>,
}

impl ModuleExports {
    /// Exports nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds a message handler.
    #[must_use]
    pub fn with_message(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.message = Some(Arc::new(handler));
        self
    }

    /// Adds a host-call result handler.
    #[must_use]
    pub fn with_host_result(mut self, handler: impl HostResultHandler + 'static) -> Self {
        self.host_result = Some(Arc::new(handler));
        self
    }

    /// Adds an auxiliary factor update handler.
    #[must_use]
    pub fn with_mfa_update(mut self, handler: impl MfaUpdateHandler + 'static) -> Self {
        self.mfa_update = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleExports")
            .field("message", &self.message.is_some())
            .field("host_result", &self.host_result.is_some())
            .field("mfa_update", &self.mfa_update.is_some())
            .finish()
    }
}

/// Handlers registered by module install hooks, shared by the session.
///
/// A later registration replaces an earlier one.
#[derive(Clone, Default)]
pub struct GlobalScope {
    message: Option<Arc<dyn MessageHandler>>,
    request: Option<Arc<dyn RequestHandler>>,
    host_result: Option<Arc<dyn HostResultHandler>>,
    mfa_update: Option<Arc<dyn MfaUpdateHandler>>,
}

impl GlobalScope {
    /// Registers the global message handler.
    pub fn set_message_handler(&mut self, handler: impl MessageHandler + 'static) {
        self.message = Some(Arc::new(handler));
    }

    /// Registers the generic request handler.
    pub fn set_request_handler(&mut self, handler: impl RequestHandler + 'static) {
        self.request = Some(Arc::new(handler));
    }

    /// Registers the global host-call result handler.
    pub fn set_host_result_handler(&mut self, handler: impl HostResultHandler + 'static) {
        self.host_result = Some(Arc::new(handler));
    }

    /// Registers the global auxiliary factor update handler.
    pub fn set_mfa_update_handler(&mut self, handler: impl MfaUpdateHandler + 'static) {
        self.mfa_update = Some(Arc::new(handler));
    }

    /// Global message handler.
    #[must_use]
    pub fn message_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.message.clone()
    }

    /// Generic request handler.
    #[must_use]
    pub fn request_handler(&self) -> Option<Arc<dyn RequestHandler>> {
        self.request.clone()
    }

    /// Global host-call result handler.
    #[must_use]
    pub fn host_result_handler(&self) -> Option<Arc<dyn HostResultHandler>> {
        self.host_result.clone()
    }

    /// Global auxiliary factor update handler.
    #[must_use]
    pub fn mfa_update_handler(&self) -> Option<Arc<dyn MfaUpdateHandler>> {
        self.mfa_update.clone()
    }
}

impl fmt::Debug for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalScope")
            .field("message", &self.message.is_some())
            .field("request", &self.request.is_some())
            .field("host_result", &self.host_result.is_some())
            .field("mfa_update", &self.mfa_update.is_some())
            .finish()
    }
}

/// A module the session can import.
pub trait ScriptModule: Send + Sync {
    /// Handlers exported when this module is the session target.
    fn exports(&self) -> ModuleExports {
        ModuleExports::none()
    }

    /// Side effect run once on import.
    fn install(&self, _globals: &mut GlobalScope) {}
}

/// Session access available to a running handler.
pub struct HandlerContext<'a> {
    state: &'a SessionState,
    host_calls: &'a mut HostCallBridge,
    outbox: &'a mut Vec<Message>,
}

impl<'a> HandlerContext<'a> {
    pub(crate) const fn new(
        state: &'a SessionState,
        host_calls: &'a mut HostCallBridge,
        outbox: &'a mut Vec<Message>,
    ) -> Self {
        Self {
            state,
            host_calls,
            outbox,
        }
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        self.state
    }

    /// Issues a host call. The `rust_call` frame is written before the
    /// reply to the frame being handled.
    pub fn call_host(&mut self, id: impl Into<String>, payload: Value) {
        let frame = self.host_calls.call(id, payload);
        self.outbox.push(frame);
    }
}

impl fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("state", &self.state)
            .field("queued", &self.outbox.len())
            .finish_non_exhaustive()
    }
}
