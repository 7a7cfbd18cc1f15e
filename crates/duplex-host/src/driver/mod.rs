//! The host side of the duplex channel.
//!
//! [`HostDriver`] reacts to frames written by the session, answers host
//! calls through a [`HostCallExecutor`], and decides when the session should
//! shut down. All inputs arrive on a single [`DriverEvent`] queue so that
//! script frames, external process input and ping ticks are handled by one
//! sequential loop.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use duplex_bridge::{Message, decode, encode};
use duplex_config::{
    DEFAULT_ONESHOT_MAX_PINGS, DEFAULT_ONESHOT_PONG_TARGET, DEFAULT_TICK_INTERVAL, DriveMode,
};

use crate::ops::HostCallExecutor;

const DRIVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::driver");

/// Shutdown reason once a one-shot drive has seen enough pongs.
pub const ONESHOT_COMPLETED: &str = "oneshot_completed";
/// Shutdown reason once a one-shot drive ran out of pings.
pub const ONESHOT_TIMEOUT: &str = "oneshot_timeout";
/// Shutdown reason once external input closes in persistent mode.
pub const PROCESS_INPUT_CLOSED: &str = "process_input_closed";

/// Inputs consumed by the driver loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A line written by the session.
    Frame(String),
    /// The session closed its end of the channel.
    ScriptClosed,
    /// A line read from external process input.
    External(String),
    /// External process input reached EOF.
    ExternalClosed,
}

/// Failures that abort a drive.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The session reported a failure the host cannot recover from.
    #[error("script reported {kind}: {frame}")]
    Script {
        /// Frame type, `error` or `module_error`.
        kind: &'static str,
        /// The offending frame as written by the session.
        frame: String,
    },
    /// The session went away before a shutdown was requested.
    #[error("duplex channel closed before shutdown")]
    ChannelClosed,
    /// An outbound frame could not be encoded.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] Arc<serde_json::Error>),
}

/// Tuning for one-shot drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    tick_interval: Duration,
    pong_target: u64,
    max_pings: u64,
}

impl DriverOptions {
    /// Options with the defaults from `duplex_config`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            pong_target: DEFAULT_ONESHOT_PONG_TARGET,
            max_pings: DEFAULT_ONESHOT_MAX_PINGS,
        }
    }

    /// Sets the interval between pings.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the pongs required before a one-shot drive completes.
    #[must_use]
    pub const fn with_pong_target(mut self, target: u64) -> Self {
        self.pong_target = target;
        self
    }

    /// Sets the ping budget of a one-shot drive.
    #[must_use]
    pub const fn with_max_pings(mut self, max: u64) -> Self {
        self.max_pings = max;
        self
    }
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened during a drive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveReport {
    /// Pings written.
    pub pings_sent: u64,
    /// Pongs received.
    pub pongs_received: u64,
    /// Host calls answered, successfully or not.
    pub host_calls_served: u64,
    /// Reason of the shutdown the host sent or forwarded, if any.
    pub shutdown_reason: Option<String>,
    /// Reason echoed in `shutdown_ack`, if one arrived.
    pub acknowledged_reason: Option<String>,
}

/// Drives a session from the host side.
pub struct HostDriver {
    mode: DriveMode,
    options: DriverOptions,
    executor: Arc<dyn HostCallExecutor>,
    outbound: Sender<String>,
    ready: bool,
    shutdown_sent: bool,
    external_closed: bool,
    report: DriveReport,
}

enum Step {
    Continue,
    Done,
}

impl HostDriver {
    /// Creates a driver writing to `outbound`.
    #[must_use]
    pub fn new(
        mode: DriveMode,
        options: DriverOptions,
        executor: Arc<dyn HostCallExecutor>,
        outbound: Sender<String>,
    ) -> Self {
        Self {
            mode,
            options,
            executor,
            outbound,
            ready: false,
            shutdown_sent: false,
            external_closed: false,
            report: DriveReport::default(),
        }
    }

    /// Consumes events until the session acknowledges shutdown or goes away.
    ///
    /// In one-shot mode a ping is written every tick; in persistent mode the
    /// driver only reacts to events. A closed event queue counts as the
    /// session closing.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Script`] when the session reports `error` or
    /// `module_error`, and [`DriverError::ChannelClosed`] when the channel
    /// closes before a shutdown was sent.
    pub fn drive(mut self, events: &Receiver<DriverEvent>) -> Result<DriveReport, DriverError> {
        info!(target: DRIVER_TARGET, mode = %self.mode, "host driver started");
        let mut next_tick = Instant::now() + self.options.tick_interval;
        loop {
            let event = if self.ticking() {
                let wait = next_tick.saturating_duration_since(Instant::now());
                match events.recv_timeout(wait) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => {
                        next_tick += self.options.tick_interval;
                        self.tick()?;
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => DriverEvent::ScriptClosed,
                }
            } else {
                events.recv().unwrap_or(DriverEvent::ScriptClosed)
            };

            if matches!(self.handle(event)?, Step::Done) {
                debug!(
                    target: DRIVER_TARGET,
                    pings = self.report.pings_sent,
                    pongs = self.report.pongs_received,
                    host_calls = self.report.host_calls_served,
                    "host driver finished"
                );
                return Ok(self.report);
            }
        }
    }

    fn ticking(&self) -> bool {
        self.mode == DriveMode::OneShot && !self.shutdown_sent
    }

    fn tick(&mut self) -> Result<(), DriverError> {
        self.report.pings_sent += 1;
        let seq = self.report.pings_sent;
        self.send_value(&json!({ "type": "ping", "seq": seq, "from": "rust" }))?;

        if self.ready && self.report.pongs_received >= self.options.pong_target {
            self.request_shutdown(ONESHOT_COMPLETED)
        } else if seq >= self.options.max_pings {
            warn!(target: DRIVER_TARGET, pings = seq, "one-shot drive ran out of pings");
            self.request_shutdown(ONESHOT_TIMEOUT)
        } else {
            Ok(())
        }
    }

    fn handle(&mut self, event: DriverEvent) -> Result<Step, DriverError> {
        match event {
            DriverEvent::Frame(line) => self.on_frame(&line),
            DriverEvent::ScriptClosed => {
                if self.shutdown_sent {
                    debug!(target: DRIVER_TARGET, "session closed after shutdown");
                    Ok(Step::Done)
                } else {
                    Err(DriverError::ChannelClosed)
                }
            }
            DriverEvent::External(line) => {
                self.forward_external(&line)?;
                Ok(Step::Continue)
            }
            DriverEvent::ExternalClosed => {
                self.external_closed = true;
                self.shutdown_if_input_closed()?;
                Ok(Step::Continue)
            }
        }
    }

    fn on_frame(&mut self, line: &str) -> Result<Step, DriverError> {
        match decode(line) {
            Message::Ready { .. } => {
                self.ready = true;
                debug!(target: DRIVER_TARGET, "session ready");
                self.shutdown_if_input_closed()?;
            }
            Message::Pong { .. } => self.report.pongs_received += 1,
            Message::RustCall { id, payload } => self.serve_host_call(id, &payload)?,
            Message::ModuleError { .. } => {
                return Err(DriverError::Script {
                    kind: "module_error",
                    frame: line.to_owned(),
                });
            }
            Message::Error { .. } => {
                return Err(DriverError::Script {
                    kind: "error",
                    frame: line.to_owned(),
                });
            }
            Message::ShutdownAck { reason } => {
                debug!(target: DRIVER_TARGET, reason = %reason, "shutdown acknowledged");
                self.report.acknowledged_reason = Some(reason);
                return Ok(Step::Done);
            }
            other => debug!(target: DRIVER_TARGET, kind = other.kind(), frame = line, "frame from session"),
        }
        Ok(Step::Continue)
    }

    fn serve_host_call(&mut self, id: Value, payload: &Value) -> Result<(), DriverError> {
        self.report.host_calls_served += 1;
        let reply = match self.executor.execute(payload) {
            Ok(result) => Message::RustCallResult { id, result },
            Err(error) => {
                warn!(target: DRIVER_TARGET, id = %id, error = %error, "host call failed");
                Message::RustCallError {
                    id,
                    error: Some(Value::String(error.to_string())),
                }
            }
        };
        self.send_value(&reply)
    }

    fn forward_external(&mut self, line: &str) -> Result<(), DriverError> {
        let outbound = normalize_external_message(line);
        if outbound.get("type").and_then(Value::as_str) == Some("shutdown") {
            self.shutdown_sent = true;
            self.report.shutdown_reason = outbound
                .get("reason")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
        }
        self.send_value(&outbound)
    }

    /// Sends the input-closed shutdown once the session is ready. Input that
    /// closes before `ready` defers the shutdown until `ready` arrives.
    fn shutdown_if_input_closed(&mut self) -> Result<(), DriverError> {
        if self.external_closed && self.ready && !self.shutdown_sent {
            self.request_shutdown(PROCESS_INPUT_CLOSED)
        } else {
            Ok(())
        }
    }

    fn request_shutdown(&mut self, reason: &str) -> Result<(), DriverError> {
        info!(target: DRIVER_TARGET, reason, "requesting session shutdown");
        self.shutdown_sent = true;
        self.report.shutdown_reason = Some(reason.to_owned());
        self.send_value(&Message::shutdown(reason))
    }

    fn send_value<T: serde::Serialize>(&self, value: &T) -> Result<(), DriverError> {
        let line = encode(value).map_err(|error| DriverError::Encode(Arc::new(error)))?;
        match self.outbound.send(line) {
            Ok(()) => Ok(()),
            // The session may stop as soon as it reads the shutdown.
            Err(_) if self.shutdown_sent => {
                debug!(target: DRIVER_TARGET, "session gone after shutdown; frame dropped");
                Ok(())
            }
            Err(_) => Err(DriverError::ChannelClosed),
        }
    }
}

/// Wraps a line of external process input as a frame for the session.
///
/// JSON objects that carry a `type` pass through untouched; any other JSON
/// value becomes the payload of an `external_message`, and text that is not
/// JSON becomes a string payload.
#[must_use]
pub fn normalize_external_message(line: &str) -> Value {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) if map.contains_key("type") => Value::Object(map),
        Ok(value) => json!({ "type": "external_message", "payload": value }),
        Err(_) => json!({ "type": "external_message", "payload": line }),
    }
}
