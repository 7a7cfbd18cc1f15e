//! Domain errors raised by the bridge.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! to satisfy the `result_large_err` Clippy lint.

use std::sync::Arc;

use thiserror::Error;

use crate::channel::ResourceId;

/// Failures of the channel handle and its transports.
///
/// Every variant except [`ChannelError::TimedOut`] means the channel can no
/// longer be used; the pump loop treats all of them as fatal.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// No transport was installed, or the slot could not be accessed.
    #[error("duplex channel is not available: {message}")]
    Unavailable {
        /// Why the channel could not be provided.
        message: String,
    },

    /// The one-shot channel slot has already been opened.
    #[error("duplex channel already opened")]
    AlreadyOpened,

    /// A read or write named a resource id the handle does not own.
    #[error("bad resource id {rid}; handle owns {owned}")]
    BadResource {
        /// Id supplied by the caller.
        rid: ResourceId,
        /// Id owned by the handle.
        owned: ResourceId,
    },

    /// The peer closed its end of the channel.
    #[error("duplex channel reached EOF")]
    Closed,

    /// No line arrived within the configured read timeout.
    #[error("no line received within {timeout_ms}ms")]
    TimedOut {
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// An I/O error occurred on a stream transport.
    #[error("duplex channel I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl ChannelError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Wraps an I/O error.
    #[must_use]
    pub fn io(source: std::io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }
}

/// Failures reported by handlers supplied by script modules.
///
/// [`HandlerError::Fatal`] is the only way a handler can end the session;
/// every other failure is contained by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler failed; the session continues.
    #[error("{message}")]
    Failed {
        /// Human-readable failure, sent back to the host verbatim.
        message: String,
    },

    /// The handler requests termination of the session.
    #[error("fatal handler error: {message}")]
    Fatal {
        /// Human-readable reason.
        message: String,
    },
}

impl HandlerError {
    /// Creates a recoverable handler failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates a session-ending handler failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that must terminate the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Returns the message without the fatal prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Failed { message } | Self::Fatal { message } => message,
        }
    }
}

/// Failures of a single module import.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// No module is known under the specifier.
    #[error("module not found: {specifier}")]
    NotFound {
        /// Specifier that was looked up.
        specifier: String,
    },

    /// The module exists but could not be loaded.
    #[error("failed to load module {specifier}: {message}")]
    Failed {
        /// Specifier that failed.
        specifier: String,
        /// Human-readable failure.
        message: String,
    },
}

impl ImportError {
    /// Creates a not-found error.
    pub fn not_found(specifier: impl Into<String>) -> Self {
        Self::NotFound {
            specifier: specifier.into(),
        }
    }

    /// Creates a load failure.
    pub fn failed(specifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            specifier: specifier.into(),
            message: message.into(),
        }
    }

    /// Returns the specifier the error refers to.
    #[must_use]
    pub fn specifier(&self) -> &str {
        match self {
            Self::NotFound { specifier } | Self::Failed { specifier, .. } => specifier,
        }
    }
}

/// Failures of the module loader outside a single import.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// A module from the startup preload list failed to import.
    #[error("failed to preload module {specifier}: {source}")]
    Preload {
        /// Specifier that failed.
        specifier: String,
        /// Import failure.
        #[source]
        source: ImportError,
    },

    /// A module was registered twice under the same specifier.
    #[error("module '{specifier}' is already registered")]
    DuplicateModule {
        /// Conflicting specifier.
        specifier: String,
    },
}

/// Failures that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The target specifier was missing or blank.
    #[error("target specifier is not set")]
    MissingTarget,

    /// The target module could not be imported.
    #[error("failed to import target module {specifier}: {source}")]
    TargetImport {
        /// Target specifier.
        specifier: String,
        /// Original import failure.
        #[source]
        source: ImportError,
    },

    /// A preload module could not be imported.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// The channel failed; the session cannot continue.
    #[error("channel failure: {0}")]
    Channel(#[from] ChannelError),

    /// An outbound frame could not be encoded.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] Arc<serde_json::Error>),

    /// A handler raised a fatal error.
    #[error("session terminated by handler: {message}")]
    Fatal {
        /// Reason given by the handler.
        message: String,
    },
}

impl SessionError {
    /// Wraps a JSON encoding error.
    #[must_use]
    pub fn encode(source: serde_json::Error) -> Self {
        Self::Encode(Arc::new(source))
    }

    /// Returns `true` when the failure happened before the pump loop started.
    #[must_use]
    pub const fn is_bootstrap(&self) -> bool {
        matches!(
            self,
            Self::MissingTarget | Self::TargetImport { .. } | Self::Loader(_)
        )
    }
}

#[cfg(test)]
mod tests;
