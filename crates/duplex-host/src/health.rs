//! Structured health reporting for host lifecycle events.

use std::sync::Arc;

use duplex_bridge::{SessionError, SessionReport};

use crate::bootstrap::{BootstrapError, HostSettings};
use crate::driver::{DriveReport, DriverError};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, settings: &HostSettings);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the session thread is running.
    fn session_started(&self, target: &str);

    /// Invoked when the session stops after a shutdown.
    fn session_finished(&self, report: &SessionReport);

    /// Invoked when the session ends with an error.
    fn session_failed(&self, error: &SessionError);

    /// Invoked when the host driver returns normally.
    fn drive_finished(&self, report: &DriveReport);

    /// Invoked when the host driver aborts.
    fn drive_failed(&self, error: &DriverError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, settings: &HostSettings) {
        (**self).bootstrap_succeeded(settings);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn session_started(&self, target: &str) {
        (**self).session_started(target);
    }

    fn session_finished(&self, report: &SessionReport) {
        (**self).session_finished(report);
    }

    fn session_failed(&self, error: &SessionError) {
        (**self).session_failed(error);
    }

    fn drive_finished(&self, report: &DriveReport) {
        (**self).drive_finished(report);
    }

    fn drive_failed(&self, error: &DriverError) {
        (**self).drive_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting host bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, settings: &HostSettings) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            target_specifier = %settings.seed().target_specifier().unwrap_or_default(),
            preload = settings.seed().modules().len(),
            drive_mode = %settings.config().drive_mode(),
            log_filter = %settings.config().log_filter(),
            log_format = ?settings.config().log_format(),
            "host bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "host bootstrap failed"
        );
    }

    fn session_started(&self, target: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_started",
            target_specifier = target,
            "session started"
        );
    }

    fn session_finished(&self, report: &SessionReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_finished",
            reason = %report.shutdown_reason,
            frames_in = report.frames_in,
            frames_out = report.frames_out,
            modules = report.state.modules.len(),
            "session finished"
        );
    }

    fn session_failed(&self, error: &SessionError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "session_failed",
            error = %error,
            "session failed"
        );
    }

    fn drive_finished(&self, report: &DriveReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "drive_finished",
            pings = report.pings_sent,
            pongs = report.pongs_received,
            host_calls = report.host_calls_served,
            reason = report.shutdown_reason.as_deref().unwrap_or("none"),
            "host driver finished"
        );
    }

    fn drive_failed(&self, error: &DriverError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "drive_failed",
            error = %error,
            "host driver failed"
        );
    }
}
