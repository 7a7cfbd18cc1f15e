//! Test doubles shared by the host's unit and behaviour tests.

use std::sync::{Mutex, PoisonError};

use duplex_bridge::{SessionError, SessionReport};
use duplex_config::Config;

use crate::bootstrap::{BootstrapError, HostSettings, StaticConfigLoader, bootstrap_with};
use crate::driver::{DriveReport, DriverError};
use crate::health::HealthReporter;

/// Lifecycle events captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    SessionStarted(String),
    SessionFinished(String),
    SessionFailed(String),
    DriveFinished,
    DriveFailed(String),
}

/// Reporter that records every event for later assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: HealthEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingReporter {
    fn bootstrap_starting(&self) {
        self.push(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _settings: &HostSettings) {
        self.push(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.push(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn session_started(&self, target: &str) {
        self.push(HealthEvent::SessionStarted(target.to_owned()));
    }

    fn session_finished(&self, report: &SessionReport) {
        self.push(HealthEvent::SessionFinished(report.shutdown_reason.clone()));
    }

    fn session_failed(&self, error: &SessionError) {
        self.push(HealthEvent::SessionFailed(error.to_string()));
    }

    fn drive_finished(&self, _report: &DriveReport) {
        self.push(HealthEvent::DriveFinished);
    }

    fn drive_failed(&self, error: &DriverError) {
        self.push(HealthEvent::DriveFailed(error.to_string()));
    }
}

/// Quiet configuration targeting `target`.
pub(crate) fn quiet_config(target: &str) -> Config {
    Config {
        log_filter: Some(String::from("off")),
        target: Some(target.to_owned()),
        ..Config::default()
    }
}

/// Bootstraps settings from a fixed configuration.
pub(crate) fn settings_for(config: Config) -> HostSettings {
    bootstrap_with(
        &StaticConfigLoader::new(config),
        &RecordingReporter::default(),
        Vec::new(),
    )
    .expect("bootstrap succeeds")
}
