//! The JSON runtime-configuration object supplied by the embedding host.
//!
//! The object is optional and every key within it is optional:
//!
//! ```json
//! {"targetSpecifier":"builtin:echo","modules":["builtin:upper"],"mfa":["otp"]}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session inputs carried by the runtime-configuration object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_specifier: Option<String>,
    #[serde(default)]
    modules: Vec<String>,
    #[serde(default)]
    mfa: Vec<String>,
}

impl RuntimeConfig {
    /// Parses a runtime-configuration object from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeConfigError::Malformed`] when the text is not JSON or
    /// does not describe an object of the expected shape.
    pub fn parse(raw: &str) -> Result<Self, RuntimeConfigError> {
        serde_json::from_str(raw).map_err(|source| RuntimeConfigError::Malformed {
            message: source.to_string(),
            source,
        })
    }

    /// Builds a runtime configuration directly.
    #[must_use]
    pub fn new(target_specifier: Option<String>, modules: Vec<String>, mfa: Vec<String>) -> Self {
        Self {
            target_specifier,
            modules,
            mfa,
        }
    }

    /// Target specifier override, ignoring blank values.
    #[must_use]
    pub fn target_specifier(&self) -> Option<&str> {
        self.target_specifier
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
    }

    /// Modules to preload before the session starts.
    #[must_use]
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Seed values for the auxiliary factor list.
    #[must_use]
    pub fn mfa(&self) -> &[String] {
        &self.mfa
    }
}

/// Errors raised while reading the runtime-configuration object.
#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    /// The JSON could not be parsed into a [`RuntimeConfig`].
    #[error("malformed runtime configuration: {message}")]
    Malformed {
        /// Human-readable parse failure.
        message: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}
