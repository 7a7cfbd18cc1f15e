//! Resolution of the target specifier handed to the session.
//!
//! URL-like specifiers pass through untouched. Anything else is treated as a
//! filesystem path: absolute paths are converted directly, relative paths are
//! searched in an explicit candidate list and the first existing file wins.

use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use url::Url;

const URL_PREFIXES: &[&str] = &["file://", "http://", "https://", "jsr:", "npm:", "builtin:"];

/// Returns `true` when the specifier already names a module by URL.
#[must_use]
pub fn is_url_like(specifier: &str) -> bool {
    URL_PREFIXES
        .iter()
        .any(|prefix| specifier.starts_with(prefix))
}

/// Resolves raw target arguments into module specifiers.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    base: Utf8PathBuf,
    roots: Vec<Utf8PathBuf>,
}

impl TargetResolver {
    /// Creates a resolver that searches relative paths under `base` first.
    #[must_use]
    pub fn new(base: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base: base.into(),
            roots: Vec::new(),
        }
    }

    /// Adds a further search root, consulted after the base directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Candidate locations for a relative path, in search order.
    #[must_use]
    pub fn candidates(&self, relative: &Utf8Path) -> Vec<Utf8PathBuf> {
        std::iter::once(&self.base)
            .chain(self.roots.iter())
            .map(|root| root.join(relative))
            .collect()
    }

    /// Resolves `raw` into a module specifier.
    ///
    /// # Errors
    ///
    /// Returns [`TargetResolutionError::Empty`] for blank input,
    /// [`TargetResolutionError::NotFound`] when no candidate file exists, and
    /// [`TargetResolutionError::NotAFileUrl`] when a path cannot be expressed
    /// as a `file://` URL.
    pub fn resolve(&self, raw: &str) -> Result<String, TargetResolutionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TargetResolutionError::Empty);
        }
        if is_url_like(trimmed) {
            return Ok(trimmed.to_owned());
        }

        let path = Utf8Path::new(trimmed);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            let candidates = self.candidates(path);
            match candidates.iter().find(|candidate| candidate.is_file()) {
                Some(found) => found.clone(),
                None => {
                    return Err(TargetResolutionError::NotFound {
                        target: trimmed.to_owned(),
                        tried: candidates,
                    });
                }
            }
        };

        Url::from_file_path(PathBuf::from(resolved.as_std_path()))
            .map(String::from)
            .map_err(|()| TargetResolutionError::NotAFileUrl { path: resolved })
    }
}

/// Errors raised while resolving the target specifier.
#[derive(Debug, Error)]
pub enum TargetResolutionError {
    /// The target argument was blank.
    #[error("target specifier is empty")]
    Empty,
    /// No candidate path held a file.
    #[error("target script not found for `{target}`; looked in: {}", join_candidates(tried))]
    NotFound {
        /// Raw target argument.
        target: String,
        /// Every location that was checked.
        tried: Vec<Utf8PathBuf>,
    },
    /// The path could not be converted to a file URL.
    #[error("failed to convert path to file url: {path}")]
    NotAFileUrl {
        /// Offending path.
        path: Utf8PathBuf,
    },
}

fn join_candidates(tried: &[Utf8PathBuf]) -> String {
    tried
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
