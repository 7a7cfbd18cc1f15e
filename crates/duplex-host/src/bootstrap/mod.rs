//! Host bootstrap orchestration.
//!
//! Bootstrap turns the process arguments into [`HostSettings`]: the layered
//! [`Config`], installed telemetry and a [`SessionSeed`] whose target has
//! been resolved. Nothing touches the channel until [`crate::run`] starts
//! the session.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use duplex_bridge::SessionSeed;
use duplex_config::{
    CONFIG_CLI_FLAGS, Config, RuntimeConfigError, TargetResolutionError, TargetResolver,
};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Configuration flags that never take a value.
const CONFIG_SWITCHES: &[&str] = &["--trace-frames"];

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the host configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when a source is malformed.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that parses configuration flags from an argument list.
#[derive(Debug, Clone)]
pub struct ArgsConfigLoader {
    args: Vec<OsString>,
}

impl ArgsConfigLoader {
    /// Creates a loader over `args`, including the program name.
    #[must_use]
    pub const fn new(args: Vec<OsString>) -> Self {
        Self { args }
    }
}

impl ConfigLoader for ArgsConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(self.args.clone())
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Creates a loader that always yields `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Splits process arguments into configuration flags and runtime arguments.
///
/// The first argument (the program name) always goes to the configuration
/// side. Flags listed in [`CONFIG_CLI_FLAGS`] are kept with their value,
/// whether written as `--flag value` or `--flag=value`. Everything else, and
/// everything after a bare `--`, is handed to the session as its argument
/// list.
#[must_use]
pub fn split_args(args: impl IntoIterator<Item = OsString>) -> (Vec<OsString>, Vec<String>) {
    let mut iter = args.into_iter();
    let mut config_args: Vec<OsString> = iter.next().into_iter().collect();
    let mut runtime_args = Vec::new();

    while let Some(arg) = iter.next() {
        let text = arg.to_string_lossy().into_owned();
        if text == "--" {
            runtime_args.extend(iter.by_ref().map(|rest| rest.to_string_lossy().into_owned()));
            break;
        }
        let flag = text.split_once('=').map_or(text.as_str(), |(name, _)| name);
        if !CONFIG_CLI_FLAGS.contains(&flag) {
            runtime_args.push(text);
            continue;
        }
        let takes_value = flag == text && !CONFIG_SWITCHES.contains(&flag);
        config_args.push(arg);
        if takes_value {
            config_args.extend(iter.next());
        }
    }
    (config_args, runtime_args)
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The inline runtime configuration was malformed.
    #[error(transparent)]
    RuntimeConfig(#[from] RuntimeConfigError),
    /// Neither the configuration nor the runtime configuration named a target.
    #[error("no target specifier configured; pass --target or set DUPLEX_TARGET")]
    MissingTarget,
    /// The working directory could not be used to resolve relative targets.
    #[error("working directory is unavailable: {message}")]
    WorkingDirectory {
        /// Why the directory could not be read.
        message: String,
    },
    /// The target could not be resolved to a module specifier.
    #[error(transparent)]
    Target(#[from] TargetResolutionError),
}

/// Everything the host needs to start a session.
#[derive(Debug, Clone)]
pub struct HostSettings {
    config: Config,
    seed: SessionSeed,
    telemetry: TelemetryHandle,
}

impl HostSettings {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Seed for the script-side session.
    #[must_use]
    pub const fn seed(&self) -> &SessionSeed {
        &self.seed
    }

    /// Telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

/// Bootstraps the host using the supplied collaborators.
///
/// The runtime configuration's `targetSpecifier` overrides
/// [`Config::target`]; its `modules` and `mfa` seed the session and
/// `runtime_args` become the session's argument list. Relative targets are
/// resolved against the working directory.
///
/// # Errors
///
/// Returns a [`BootstrapError`] for the first stage that fails; the reporter
/// sees the same error.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    runtime_args: Vec<String>,
) -> Result<HostSettings, BootstrapError> {
    reporter.bootstrap_starting();
    let result = bootstrap_stages(loader, runtime_args);
    match &result {
        Ok(settings) => reporter.bootstrap_succeeded(settings),
        Err(error) => reporter.bootstrap_failed(error),
    }
    result
}

fn bootstrap_stages(
    loader: &dyn ConfigLoader,
    runtime_args: Vec<String>,
) -> Result<HostSettings, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    let runtime = config.runtime_config()?;

    let raw_target = runtime
        .target_specifier()
        .or_else(|| config.target())
        .ok_or(BootstrapError::MissingTarget)?;
    let target = resolver(&config)?.resolve(raw_target)?;

    let seed = SessionSeed::new(target)
        .with_modules(runtime.modules().to_vec())
        .with_mfa(runtime.mfa().to_vec())
        .with_args(runtime_args);
    Ok(HostSettings {
        config,
        seed,
        telemetry,
    })
}

/// Searches the working directory, then each configured root. Relative
/// roots are taken from the working directory.
fn resolver(config: &Config) -> Result<TargetResolver, BootstrapError> {
    let cwd = std::env::current_dir().map_err(|error| BootstrapError::WorkingDirectory {
        message: error.to_string(),
    })?;
    let base = Utf8PathBuf::from_path_buf(cwd).map_err(|path| BootstrapError::WorkingDirectory {
        message: format!("{} is not valid UTF-8", path.display()),
    })?;
    let roots = config.search_roots();
    Ok(roots.iter().fold(TargetResolver::new(base.clone()), |resolver, root| {
        resolver.with_root(base.join(root))
    }))
}
