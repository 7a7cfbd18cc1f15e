//! Per-session state mutated by the dispatcher.
//!
//! [`SessionState`] is created once at bootstrap from a [`SessionSeed`] and
//! then changes only in response to protocol messages: `module` appends to
//! the module list, `mfa` appends to the auxiliary factor list and
//! `runtime_args` replaces the argument list. The target specifier never
//! changes after bootstrap.

use serde::Serialize;

use crate::error::SessionError;

/// Inputs used to bootstrap a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSeed {
    target_specifier: Option<String>,
    modules: Vec<String>,
    mfa: Vec<String>,
    args: Vec<String>,
}

impl SessionSeed {
    /// Creates a seed for the given target specifier.
    pub fn new(target_specifier: impl Into<String>) -> Self {
        Self {
            target_specifier: Some(target_specifier.into()),
            ..Self::default()
        }
    }

    /// Creates a seed without a target; bootstrap will fail.
    #[must_use]
    pub fn without_target() -> Self {
        Self::default()
    }

    /// Sets the modules preloaded before the pump loop starts.
    #[must_use]
    pub fn with_modules(mut self, modules: Vec<String>) -> Self {
        self.modules = modules;
        self
    }

    /// Sets the initial auxiliary factor list.
    #[must_use]
    pub fn with_mfa(mut self, mfa: Vec<String>) -> Self {
        self.mfa = mfa;
        self
    }

    /// Sets the snapshot of process arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Target specifier, if one was given.
    #[must_use]
    pub fn target_specifier(&self) -> Option<&str> {
        self.target_specifier.as_deref()
    }

    /// Modules to preload.
    #[must_use]
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Initial auxiliary factor list.
    #[must_use]
    pub fn mfa(&self) -> &[String] {
        &self.mfa
    }

    /// Initial runtime arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// The pump loop is reading and dispatching frames.
    #[default]
    Running,
    /// A `shutdown` was received and the acknowledgement is being written.
    ShuttingDown,
    /// The pump loop has returned; no further I/O happens.
    Stopped,
}

/// Mutable state of a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    target_specifier: String,
    modules: Vec<String>,
    mfa: Vec<String>,
    args: Vec<String>,
}

impl SessionState {
    /// Creates state from a seed. The module list starts empty; the loader
    /// fills it as preloads succeed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingTarget`] when the seed has no target or
    /// the target is blank.
    pub fn from_seed(seed: &SessionSeed) -> Result<Self, SessionError> {
        let target = seed
            .target_specifier()
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .ok_or(SessionError::MissingTarget)?;
        Ok(Self {
            target_specifier: target.to_owned(),
            modules: Vec::new(),
            mfa: seed.mfa.clone(),
            args: seed.args.clone(),
        })
    }

    /// Target specifier imported at bootstrap.
    #[must_use]
    pub fn target_specifier(&self) -> &str {
        &self.target_specifier
    }

    /// Loaded modules in load order.
    #[must_use]
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Auxiliary factor list.
    #[must_use]
    pub fn mfa(&self) -> &[String] {
        &self.mfa
    }

    /// Runtime arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns `true` when `specifier` is already loaded.
    #[must_use]
    pub fn has_module(&self, specifier: &str) -> bool {
        self.modules.iter().any(|loaded| loaded == specifier)
    }

    /// Appends `specifier` unless already present. Returns `true` if added.
    pub fn add_module(&mut self, specifier: &str) -> bool {
        if self.has_module(specifier) {
            return false;
        }
        self.modules.push(specifier.to_owned());
        true
    }

    /// Appends `values` to the auxiliary factor list, keeping duplicates.
    pub fn extend_mfa(&mut self, values: impl IntoIterator<Item = String>) {
        self.mfa.extend(values);
    }

    /// Replaces the runtime arguments.
    pub fn replace_args(&mut self, args: Vec<String>) {
        self.args = args;
    }

    /// Copies the current state for reporting.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            target_specifier: self.target_specifier.clone(),
            modules: self.modules.clone(),
            mfa: self.mfa.clone(),
            args: self.args.clone(),
        }
    }
}

/// Point-in-time copy of [`SessionState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Target specifier.
    pub target_specifier: String,
    /// Loaded modules.
    pub modules: Vec<String>,
    /// Auxiliary factor list.
    pub mfa: Vec<String>,
    /// Runtime arguments.
    pub args: Vec<String>,
}
