//! Module import with an opt-in fallback search.
//!
//! Imports go through a [`ModuleImporter`]. [`ModuleRegistry`] is the
//! in-process importer used by the host binary and tests: it maps
//! specifiers to [`ScriptModule`] instances registered up front.
//!
//! [`ModuleLoader`] adds session semantics on top of the importer. Every
//! import retries under each configured fallback segment before giving up,
//! and the first successful import of a module runs its install hook
//! against the session's [`GlobalScope`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::error::{ImportError, LoaderError};
use crate::handlers::{GlobalScope, ScriptModule};
use crate::session::SessionState;

const LOADER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::loader");

/// Resolves a specifier to a module.
pub trait ModuleImporter: Send + Sync {
    /// Imports the module named by `specifier`.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] when the module is unknown or fails to load.
    fn import(&self, specifier: &str) -> Result<Arc<dyn ScriptModule>, ImportError>;
}

/// Importer backed by modules registered in process.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn ScriptModule>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` under `specifier`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::DuplicateModule`] when the specifier is taken.
    pub fn register(
        &mut self,
        specifier: impl Into<String>,
        module: impl ScriptModule + 'static,
    ) -> Result<(), LoaderError> {
        let name = specifier.into();
        if self.modules.contains_key(&name) {
            return Err(LoaderError::DuplicateModule { specifier: name });
        }
        self.modules.insert(name, Arc::new(module));
        Ok(())
    }

    /// Returns `true` when a module is registered under `specifier`.
    #[must_use]
    pub fn contains(&self, specifier: &str) -> bool {
        self.modules.contains_key(specifier)
    }

    /// Registered specifiers in sorted order.
    #[must_use]
    pub fn specifiers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("specifiers", &self.specifiers())
            .finish()
    }
}

impl ModuleImporter for ModuleRegistry {
    fn import(&self, specifier: &str) -> Result<Arc<dyn ScriptModule>, ImportError> {
        self.modules
            .get(specifier)
            .cloned()
            .ok_or_else(|| ImportError::not_found(specifier))
    }
}

/// Session-facing import operations.
#[derive(Clone)]
pub struct ModuleLoader {
    importer: Arc<dyn ModuleImporter>,
    fallback_segments: Vec<String>,
}

impl ModuleLoader {
    /// Creates a loader without fallback segments.
    #[must_use]
    pub fn new(importer: Arc<dyn ModuleImporter>) -> Self {
        Self {
            importer,
            fallback_segments: Vec::new(),
        }
    }

    /// Sets the directory segments tried when the target import fails.
    #[must_use]
    pub fn with_fallback_segments(mut self, segments: Vec<String>) -> Self {
        self.fallback_segments = segments;
        self
    }

    /// Configured fallback segments.
    #[must_use]
    pub fn fallback_segments(&self) -> &[String] {
        &self.fallback_segments
    }

    /// Imports the session target, retrying under each fallback segment.
    ///
    /// # Errors
    ///
    /// Returns the error of the first attempt when every retry fails too.
    pub fn import_target(&self, specifier: &str) -> Result<Arc<dyn ScriptModule>, ImportError> {
        self.import_with_fallback(specifier)
    }

    fn import_with_fallback(&self, specifier: &str) -> Result<Arc<dyn ScriptModule>, ImportError> {
        let first_error = match self.importer.import(specifier) {
            Ok(module) => return Ok(module),
            Err(error) => error,
        };

        for candidate in self.fallback_candidates(specifier) {
            warn!(
                target: LOADER_TARGET,
                specifier,
                candidate = %candidate,
                "failed to import module; retrying"
            );
            match self.importer.import(&candidate) {
                Ok(module) => return Ok(module),
                Err(error) => {
                    debug!(target: LOADER_TARGET, candidate = %candidate, %error, "retry failed");
                }
            }
        }
        Err(first_error)
    }

    /// Alternative specifiers for a failed import.
    ///
    /// Only `file:` URLs are rewritten. For each segment not already present
    /// as a directory in the path, the final path component is moved under
    /// that segment.
    #[must_use]
    pub fn fallback_candidates(&self, specifier: &str) -> Vec<String> {
        let Ok(url) = Url::parse(specifier) else {
            return Vec::new();
        };
        if url.scheme() != "file" {
            return Vec::new();
        }
        let Some(file_name) = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned)
        else {
            return Vec::new();
        };

        self.fallback_segments
            .iter()
            .filter(|segment| !url.path().contains(&format!("/{segment}/")))
            .filter_map(|segment| {
                let mut candidate = url.clone();
                candidate
                    .path_segments_mut()
                    .ok()?
                    .pop()
                    .push(segment)
                    .push(&file_name);
                Some(String::from(candidate))
            })
            .filter(|candidate| candidate != specifier)
            .collect()
    }

    /// Imports each preload module in order and runs its install hook.
    ///
    /// Successful specifiers are appended to `state`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Preload`] for the first module that fails.
    pub fn preload(
        &self,
        specifiers: &[String],
        state: &mut SessionState,
        globals: &mut GlobalScope,
    ) -> Result<Vec<String>, LoaderError> {
        let mut loaded = Vec::with_capacity(specifiers.len());
        for specifier in specifiers {
            let module = self
                .import_with_fallback(specifier)
                .map_err(|source| LoaderError::Preload {
                    specifier: specifier.clone(),
                    source,
                })?;
            if admit(specifier, module.as_ref(), state, globals) {
                debug!(target: LOADER_TARGET, specifier = %specifier, "module preloaded");
                loaded.push(specifier.clone());
            }
        }
        Ok(loaded)
    }

    /// Imports a module while the session runs, with the same fallback
    /// search as the target import.
    ///
    /// The install hook runs only when the module was not loaded before.
    ///
    /// # Errors
    ///
    /// Returns the error of the first attempt; the state is left untouched.
    pub fn load_live(
        &self,
        specifier: &str,
        state: &mut SessionState,
        globals: &mut GlobalScope,
    ) -> Result<(), ImportError> {
        let module = self.import_with_fallback(specifier)?;
        if admit(specifier, module.as_ref(), state, globals) {
            debug!(target: LOADER_TARGET, specifier, "module loaded");
        } else {
            debug!(target: LOADER_TARGET, specifier, "module already loaded");
        }
        Ok(())
    }
}

/// Records `specifier` and runs the install hook on first load. The target
/// was installed at bootstrap, so importing it again only records it.
fn admit(
    specifier: &str,
    module: &dyn ScriptModule,
    state: &mut SessionState,
    globals: &mut GlobalScope,
) -> bool {
    if !state.add_module(specifier) {
        return false;
    }
    if specifier != state.target_specifier() {
        module.install(globals);
    }
    true
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("fallback_segments", &self.fallback_segments)
            .finish_non_exhaustive()
    }
}
