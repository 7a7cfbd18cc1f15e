//! Host side of the duplex bridge.
//!
//! `duplex-host` embeds a [`duplex_bridge`] session in a process. Bootstrap
//! layers configuration from [`duplex_config`], installs structured
//! telemetry and resolves the target specifier. [`launch`] then starts the
//! session on its own thread and drives it with a [`HostDriver`], which
//! answers host calls through [`HostOps`] and decides when to shut down:
//!
//! - one-shot mode pings on a fixed interval and stops once the session has
//!   answered enough pings;
//! - persistent mode forwards stdin lines as external messages until stdin
//!   closes.
//!
//! Health reporting hooks emit structured events at each lifecycle stage.

mod bootstrap;
pub mod driver;
mod health;
pub mod launch;
pub mod modules;
pub mod ops;
pub mod telemetry;

use std::ffi::OsString;
use std::io::{self, BufReader, Write};
use std::process::ExitCode;
use std::sync::Arc;

pub use bootstrap::{
    ArgsConfigLoader, BootstrapError, ConfigLoader, HostSettings, StaticConfigLoader,
    bootstrap_with, split_args,
};
pub use driver::{
    DriveReport, DriverError, DriverEvent, DriverOptions, HostDriver, normalize_external_message,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use launch::{ExternalInput, HostOutcome, HostParts, RunError, run_session};
pub use modules::builtin_registry;
pub use ops::{HostCallError, HostCallExecutor, HostOps};
pub use telemetry::{TelemetryError, TelemetryHandle};

/// Bootstraps the host from `args` and runs one session with the built-in
/// modules and operations.
///
/// In persistent mode `external` supplies the lines forwarded to the
/// session; it is ignored in one-shot mode.
///
/// # Errors
///
/// Returns a [`RunError`] describing the first failure.
pub fn run_with(
    args: impl IntoIterator<Item = OsString>,
    reporter: &dyn HealthReporter,
    external: Option<ExternalInput>,
) -> Result<HostOutcome, RunError> {
    let (config_args, runtime_args) = split_args(args);
    let loader = ArgsConfigLoader::new(config_args);
    let settings = bootstrap_with(&loader, reporter, runtime_args)?;
    let registry = builtin_registry()?;
    let parts = HostParts {
        importer: Arc::new(registry),
        executor: Arc::new(HostOps::new()),
        driver: DriverOptions::new(),
        external,
    };
    run_session(&settings, parts, reporter)
}

/// Entry point used by the `duplexd` binary.
///
/// Reads external input from stdin in persistent mode. Errors are written
/// to `stderr` as well as the log.
pub fn run(args: impl IntoIterator<Item = OsString>, stderr: &mut dyn Write) -> ExitCode {
    let reporter = StructuredHealthReporter::new();
    let external: ExternalInput = Box::new(BufReader::new(io::stdin()));
    match run_with(args, &reporter, Some(external)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "duplexd: {error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
