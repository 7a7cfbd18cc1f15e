//! The session pump loop.
//!
//! [`Session::bootstrap`] prepares the dispatcher and opens the channel;
//! [`Session::run`] writes `ready` and then reads, dispatches and replies
//! one frame at a time until a `shutdown`, a fatal handler error or a
//! channel failure. Nothing is read before the previous frame's replies are
//! written.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::channel::{ChannelHandle, ChannelSlot, ResourceId};
use crate::dispatch::{Clock, Dispatcher, Flow};
use crate::error::SessionError;
use crate::loader::ModuleLoader;
use crate::protocol::{self, Message};
use crate::session::{SessionPhase, SessionSeed, SessionState, StateSnapshot};

const PUMP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pump");
const FRAME_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::frames");

/// Tunables for a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    read_timeout: Option<Duration>,
    trace_frames: bool,
    clock: Option<Clock>,
}

impl SessionOptions {
    /// Blocking reads, no frame tracing, wall-clock timestamps.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_timeout: None,
            trace_frames: false,
            clock: None,
        }
    }

    /// Fails the session when no line arrives within `timeout`.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Logs every frame at debug level.
    #[must_use]
    pub const fn with_trace_frames(mut self, enabled: bool) -> Self {
        self.trace_frames = enabled;
        self
    }

    /// Replaces the timestamp source used for `pong` frames.
    #[must_use]
    pub const fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Configured read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Whether frame tracing is enabled.
    #[must_use]
    pub const fn trace_frames(&self) -> bool {
        self.trace_frames
    }
}

/// Summary of a session that ended with a `shutdown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Reason echoed in `shutdown_ack`.
    pub shutdown_reason: String,
    /// Frames read.
    pub frames_in: usize,
    /// Frames written, including `ready` and `shutdown_ack`.
    pub frames_out: usize,
    /// State when the loop stopped.
    pub state: StateSnapshot,
}

/// A bootstrapped session bound to one channel resource.
#[derive(Debug)]
pub struct Session {
    handle: ChannelHandle,
    dispatcher: Dispatcher,
    options: SessionOptions,
    frames_in: usize,
    frames_out: usize,
}

impl Session {
    /// Bootstraps the dispatcher, then opens the channel from `slot`.
    ///
    /// The channel is opened last so a failed import leaves the slot intact.
    ///
    /// # Errors
    ///
    /// Returns any bootstrap error from [`Dispatcher::bootstrap`] and
    /// [`SessionError::Channel`] when the slot cannot be opened.
    pub fn bootstrap(
        seed: &SessionSeed,
        loader: ModuleLoader,
        slot: &ChannelSlot,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let mut dispatcher = Dispatcher::bootstrap(seed, loader)?;
        if let Some(clock) = options.clock {
            dispatcher = dispatcher.with_clock(clock);
        }
        let handle = slot.open()?;
        info!(target: PUMP_TARGET, rid = handle.rid(), "session channel opened");
        Ok(Self {
            handle,
            dispatcher,
            options,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Resource id of the session channel.
    #[must_use]
    pub const fn rid(&self) -> ResourceId {
        self.handle.rid()
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        self.dispatcher.state()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.dispatcher.phase()
    }

    /// Runs the pump loop to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Channel`] when the channel fails or closes,
    /// [`SessionError::Fatal`] when a handler raises a fatal error and
    /// [`SessionError::Encode`] when a reply cannot be serialised.
    pub fn run(mut self) -> Result<SessionReport, SessionError> {
        let outcome = self.pump();
        self.dispatcher.mark_stopped();
        match &outcome {
            Ok(()) => info!(
                target: PUMP_TARGET,
                frames_in = self.frames_in,
                frames_out = self.frames_out,
                "session stopped"
            ),
            Err(failure) => error!(target: PUMP_TARGET, error = %failure, "session ended"),
        }
        outcome?;

        Ok(SessionReport {
            shutdown_reason: self
                .dispatcher
                .shutdown_reason()
                .unwrap_or(crate::dispatch::DEFAULT_SHUTDOWN_REASON)
                .to_owned(),
            frames_in: self.frames_in,
            frames_out: self.frames_out,
            state: self.dispatcher.state().snapshot(),
        })
    }

    fn pump(&mut self) -> Result<(), SessionError> {
        let ready = self.dispatcher.ready();
        self.write(&ready)?;

        let rid = self.handle.rid();
        let mut outbox = Vec::new();
        loop {
            let line = self.handle.read_line(rid, self.options.read_timeout)?;
            self.frames_in += 1;
            if self.options.trace_frames {
                debug!(target: FRAME_TARGET, direction = "in", %line);
            }

            let message = protocol::decode(&line);
            let result = self.dispatcher.dispatch(message, &mut outbox);
            for frame in outbox.drain(..) {
                self.write(&frame)?;
            }

            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => return Ok(()),
                Err(failure) if failure.is_fatal() => {
                    return Err(SessionError::Fatal {
                        message: failure.message().to_owned(),
                    });
                }
                Err(failure) => {
                    warn!(target: PUMP_TARGET, error = %failure, "handler failed; continuing");
                }
            }
        }
    }

    fn write(&mut self, frame: &Message) -> Result<(), SessionError> {
        let line = protocol::encode(frame).map_err(SessionError::encode)?;
        if self.options.trace_frames {
            debug!(target: FRAME_TARGET, direction = "out", %line);
        }
        let rid = self.handle.rid();
        self.handle.write_line(rid, &line)?;
        self.frames_out += 1;
        Ok(())
    }
}
