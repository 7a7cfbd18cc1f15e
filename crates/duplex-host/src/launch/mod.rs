//! Session wiring: one thread for the script side, one driver for the host.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::debug;

use duplex_bridge::{
    ChannelError, ChannelSlot, LoaderError, ModuleImporter, ModuleLoader, Session, SessionError,
    SessionOptions, SessionReport, memory_pair,
};
use duplex_config::DriveMode;

use crate::bootstrap::{BootstrapError, HostSettings};
use crate::driver::{DriveReport, DriverError, DriverEvent, DriverOptions, HostDriver};
use crate::health::HealthReporter;
use crate::ops::HostCallExecutor;

const LAUNCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::launch");

/// Source of external process input for persistent drives.
pub type ExternalInput = Box<dyn BufRead + Send>;

/// Result of a session that shut down cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutcome {
    /// Report from the script side.
    pub session: SessionReport,
    /// Report from the host driver.
    pub drive: DriveReport,
}

/// Failures that stop the host.
#[derive(Debug, Error)]
pub enum RunError {
    /// Bootstrap failed before a session existed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The module registry could not be built.
    #[error("failed to build module registry: {0}")]
    Registry(#[from] LoaderError),
    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The session failed to start or ended with an error.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The host driver aborted.
    #[error(transparent)]
    Drive(#[from] DriverError),
    /// A worker thread panicked.
    #[error("{name} thread panicked")]
    Panicked {
        /// Thread name.
        name: &'static str,
    },
}

const SESSION_THREAD: &str = "duplex-session";
const FRAMES_THREAD: &str = "duplex-frames";
const INPUT_THREAD: &str = "duplex-input";

/// Collaborators for [`run_session`].
pub struct HostParts {
    /// Resolves module specifiers for the session.
    pub importer: Arc<dyn ModuleImporter>,
    /// Executes `rust_call` payloads.
    pub executor: Arc<dyn HostCallExecutor>,
    /// Driver tuning.
    pub driver: DriverOptions,
    /// External input forwarded in persistent mode.
    pub external: Option<ExternalInput>,
}

/// Runs one session to completion.
///
/// The session runs on its own thread over an in-memory channel pair; the
/// calling thread drives it. Script frames and external input are funnelled
/// into one event queue by forwarding threads. External input is only read
/// in [`DriveMode::Persistent`]; a persistent drive without input behaves as
/// if the input closed immediately.
///
/// # Errors
///
/// Returns [`RunError::Session`] when the session fails to bootstrap or ends
/// with its own error. When the driver aborts first, for example on a
/// `module_error` frame, the session only sees its channel close and the
/// driver's failure surfaces as [`RunError::Drive`].
pub fn run_session(
    settings: &HostSettings,
    parts: HostParts,
    reporter: &dyn HealthReporter,
) -> Result<HostOutcome, RunError> {
    let config = settings.config();
    let (script_end, host_end) = memory_pair();
    let slot = ChannelSlot::with_transport(script_end);
    let loader =
        ModuleLoader::new(parts.importer).with_fallback_segments(config.fallback_segments());
    let options = SessionOptions::new()
        .with_read_timeout(config.read_timeout())
        .with_trace_frames(config.trace_frames());

    let session = Session::bootstrap(settings.seed(), loader, &slot, options).inspect_err(|error| {
        reporter.session_failed(error);
    })?;
    let target = session.state().target_specifier().to_owned();
    let session_thread = spawn(SESSION_THREAD, move || session.run())?;
    reporter.session_started(&target);

    let (outbound, inbound) = host_end.split();
    let (events_tx, events) = mpsc::channel();
    let _frames = spawn(FRAMES_THREAD, {
        let sender = events_tx.clone();
        move || forward_frames(&inbound, &sender)
    })?;
    let mode = config.drive_mode();
    if mode == DriveMode::Persistent {
        match parts.external {
            Some(input) => {
                let _input = spawn(INPUT_THREAD, move || forward_input(input, &events_tx))?;
            }
            None => {
                // The receiver is still alive here.
                let _closed = events_tx.send(DriverEvent::ExternalClosed);
            }
        }
    }

    let driver = HostDriver::new(mode, parts.driver, parts.executor, outbound);
    let drive_result = driver.drive(&events);
    drop(events);
    let session_result = join(session_thread)?;

    match &drive_result {
        Ok(report) => reporter.drive_finished(report),
        Err(error) => reporter.drive_failed(error),
    }
    match &session_result {
        Ok(report) => reporter.session_finished(report),
        Err(error) => reporter.session_failed(error),
    }

    match (session_result, drive_result) {
        (Ok(session), Ok(drive)) => Ok(HostOutcome { session, drive }),
        (Err(SessionError::Channel(ChannelError::Closed)), Err(drive)) => Err(drive.into()),
        (Err(session), _) => Err(session.into()),
        (Ok(_), Err(drive)) => Err(drive.into()),
    }
}

fn spawn<T, F>(name: &'static str, work: F) -> Result<JoinHandle<T>, RunError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(work)
        .map_err(|source| RunError::Spawn {
            name,
            source: Arc::new(source),
        })
}

fn join<T>(handle: JoinHandle<T>) -> Result<T, RunError> {
    handle.join().map_err(|_| RunError::Panicked {
        name: SESSION_THREAD,
    })
}

fn forward_frames(inbound: &Receiver<String>, events: &Sender<DriverEvent>) {
    for line in inbound {
        if events.send(DriverEvent::Frame(line)).is_err() {
            return;
        }
    }
    debug!(target: LAUNCH_TARGET, "session channel closed");
    let _closed = events.send(DriverEvent::ScriptClosed);
}

fn forward_input(input: ExternalInput, events: &Sender<DriverEvent>) {
    for line in input.lines() {
        let Ok(text) = line else {
            break;
        };
        if text.trim().is_empty() {
            continue;
        }
        if events.send(DriverEvent::External(text)).is_err() {
            return;
        }
    }
    debug!(target: LAUNCH_TARGET, "external input closed");
    let _closed = events.send(DriverEvent::ExternalClosed);
}
