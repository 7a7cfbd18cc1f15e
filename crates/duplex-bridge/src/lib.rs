//! Duplex resource bridge and message dispatcher.
//!
//! The `duplex-bridge` crate implements the script side of a line-framed
//! duplex channel between an embedding host and a scripting session. The
//! host writes JSON frames such as `ping`, `message`, `module` and
//! `shutdown`; the session answers each one, keeps a small piece of state
//! that only protocol messages may change, and can ask the host for
//! privileged work through `rust_call` frames.
//!
//! # Architecture
//!
//! - [`channel`] owns the line transport behind an opaque resource id.
//! - [`protocol`] encodes and decodes frames without ever failing a read.
//! - [`session`] holds the target, module list, auxiliary factors and
//!   runtime arguments.
//! - [`loader`] imports modules through a [`ModuleImporter`].
//! - [`host_call`] correlates host calls with their replies.
//! - [`dispatch`] routes one frame to state changes and handlers.
//! - [`pump`] ties the pieces into the sequential read/dispatch/write loop.
//!
//! One failing message never ends a session. Only channel failures, a
//! `shutdown` frame or a [`HandlerError::Fatal`] stop the loop.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use duplex_bridge::{
//!     ChannelSlot, ModuleLoader, ModuleRegistry, ScriptModule, Session, SessionOptions,
//!     SessionSeed, memory_pair,
//! };
//!
//! struct Target;
//! impl ScriptModule for Target {}
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register("builtin:target", Target).expect("register target");
//!
//! let (script_end, _host_end) = memory_pair();
//! let slot = ChannelSlot::with_transport(script_end);
//! let session = Session::bootstrap(
//!     &SessionSeed::new("builtin:target"),
//!     ModuleLoader::new(Arc::new(registry)),
//!     &slot,
//!     SessionOptions::new(),
//! )
//! .expect("bootstrap");
//! // session.run() blocks until the host sends `shutdown`.
//! ```

pub mod channel;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod host_call;
pub mod loader;
pub mod protocol;
pub mod pump;
pub mod session;

#[cfg(test)]
mod tests;

pub use self::channel::{
    ChannelHandle, ChannelSlot, DuplexTransport, MemoryTransport, ResourceId, StreamTransport,
    memory_pair,
};
pub use self::dispatch::{Dispatcher, Flow};
pub use self::error::{ChannelError, HandlerError, ImportError, LoaderError, SessionError};
pub use self::handlers::{
    Delivery, DeliveryKind, GlobalScope, HandlerContext, HostCallReply, HostResultHandler,
    MessageHandler, MfaUpdate, MfaUpdateHandler, ModuleExports, RequestHandler, ScriptModule,
};
pub use self::host_call::HostCallBridge;
pub use self::loader::{ModuleImporter, ModuleLoader, ModuleRegistry};
pub use self::protocol::{Message, decode, encode};
pub use self::pump::{Session, SessionOptions, SessionReport};
pub use self::session::{SessionPhase, SessionSeed, SessionState, StateSnapshot};
