//! The duplex channel handle and its transports.
//!
//! A session reaches its peer through exactly one [`ChannelHandle`], opened
//! from a one-shot [`ChannelSlot`] and identified by a [`ResourceId`]. The
//! handle moves whole lines; framing lives in [`crate::protocol`].
//!
//! Two transports are provided. [`memory_pair`] connects two ends inside one
//! process through `std::sync::mpsc` channels. [`StreamTransport`] wraps any
//! buffered reader and writer pair, such as process stdio; a reader thread
//! forwards lines into a channel so that read timeouts behave the same way
//! for both transports.

use std::fmt;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::ChannelError;

const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Opaque identifier of an opened channel resource.
pub type ResourceId = u32;

static NEXT_RESOURCE_ID: AtomicU32 = AtomicU32::new(1);

fn allocate_resource_id() -> ResourceId {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Moves whole lines between the two ends of a duplex channel.
pub trait DuplexTransport: Send {
    /// Blocks until a full line is available, without its terminator.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once the peer is gone and
    /// [`ChannelError::TimedOut`] when `timeout` elapses first.
    fn recv_line(&mut self, timeout: Option<Duration>) -> Result<String, ChannelError>;

    /// Writes `line` followed by a newline and returns the bytes written.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the peer can no longer be reached.
    fn send_line(&mut self, line: &str) -> Result<usize, ChannelError>;
}

fn receive<T>(receiver: &Receiver<T>, timeout: Option<Duration>) -> Result<T, ChannelError> {
    match timeout {
        None => receiver.recv().map_err(|_| ChannelError::Closed),
        Some(limit) => receiver.recv_timeout(limit).map_err(|error| match error {
            RecvTimeoutError::Timeout => ChannelError::TimedOut {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => ChannelError::Closed,
        }),
    }
}

/// One end of an in-process channel pair.
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: Receiver<String>,
    outbound: Sender<String>,
}

impl MemoryTransport {
    /// Separates the outbound and inbound halves.
    ///
    /// Hosts that wait on several inputs at once forward the receiver into
    /// their own event queue and keep the sender for replies.
    #[must_use]
    pub fn split(self) -> (Sender<String>, Receiver<String>) {
        (self.outbound, self.inbound)
    }
}

impl DuplexTransport for MemoryTransport {
    fn recv_line(&mut self, timeout: Option<Duration>) -> Result<String, ChannelError> {
        receive(&self.inbound, timeout)
    }

    fn send_line(&mut self, line: &str) -> Result<usize, ChannelError> {
        self.outbound
            .send(line.to_owned())
            .map_err(|_| ChannelError::Closed)?;
        Ok(line.len() + 1)
    }
}

/// Creates two connected in-process transports.
///
/// Lines sent on one end are received on the other. Dropping either end
/// closes the channel for its peer.
#[must_use]
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let (left_tx, right_rx) = mpsc::channel();
    let (right_tx, left_rx) = mpsc::channel();
    (
        MemoryTransport {
            inbound: left_rx,
            outbound: left_tx,
        },
        MemoryTransport {
            inbound: right_rx,
            outbound: right_tx,
        },
    )
}

/// Transport over a reader and writer pair, typically process stdio.
pub struct StreamTransport {
    lines: Receiver<Result<String, ChannelError>>,
    writer: Box<dyn Write + Send>,
}

impl StreamTransport {
    /// Starts a reader thread over `reader` and wraps `writer`.
    ///
    /// The thread ends at EOF or on the first read error; either way the
    /// transport reports [`ChannelError::Closed`] once buffered lines are
    /// drained, after surfacing the error if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the reader thread cannot be spawned.
    pub fn spawn<R, W>(reader: R, writer: W) -> Result<Self, ChannelError>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let (sender, lines) = mpsc::channel();
        thread::Builder::new()
            .name(String::from("duplex-stream-reader"))
            .spawn(move || pump_lines(reader, &sender))
            .map_err(ChannelError::io)?;
        Ok(Self {
            lines,
            writer: Box::new(writer),
        })
    }
}

fn pump_lines<R: BufRead>(reader: R, sender: &Sender<Result<String, ChannelError>>) {
    for line in reader.lines() {
        let item = line.map_err(ChannelError::io);
        let failed = item.is_err();
        if sender.send(item).is_err() || failed {
            break;
        }
    }
    debug!(target: CHANNEL_TARGET, "stream reader finished");
}

impl fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport").finish_non_exhaustive()
    }
}

impl DuplexTransport for StreamTransport {
    fn recv_line(&mut self, timeout: Option<Duration>) -> Result<String, ChannelError> {
        receive(&self.lines, timeout)?
    }

    fn send_line(&mut self, line: &str) -> Result<usize, ChannelError> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush())
            .map_err(ChannelError::io)?;
        Ok(line.len() + 1)
    }
}

enum SlotState {
    Empty,
    Installed(Box<dyn DuplexTransport>),
    Opened,
}

/// One-shot holder for the transport a session will open.
///
/// The embedding host installs a transport; the session opens it exactly
/// once. A second `open` fails with [`ChannelError::AlreadyOpened`].
pub struct ChannelSlot {
    state: Mutex<SlotState>,
}

impl ChannelSlot {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
        }
    }

    /// Creates a slot holding `transport`.
    #[must_use]
    pub fn with_transport(transport: impl DuplexTransport + 'static) -> Self {
        Self {
            state: Mutex::new(SlotState::Installed(Box::new(transport))),
        }
    }

    /// Installs `transport`, replacing any transport not yet opened.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::AlreadyOpened`] when the slot was consumed.
    pub fn install(&self, transport: impl DuplexTransport + 'static) -> Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SlotState::Opened) {
            return Err(ChannelError::AlreadyOpened);
        }
        *state = SlotState::Installed(Box::new(transport));
        Ok(())
    }

    /// Takes the installed transport and allocates its resource id.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Unavailable`] when nothing was installed and
    /// [`ChannelError::AlreadyOpened`] on every call after the first success.
    pub fn open(&self) -> Result<ChannelHandle, ChannelError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, SlotState::Opened) {
            SlotState::Installed(transport) => {
                let handle = ChannelHandle {
                    rid: allocate_resource_id(),
                    transport,
                };
                debug!(target: CHANNEL_TARGET, rid = handle.rid, "channel opened");
                Ok(handle)
            }
            SlotState::Opened => Err(ChannelError::AlreadyOpened),
            SlotState::Empty => {
                *state = SlotState::Empty;
                Err(ChannelError::unavailable("no transport installed"))
            }
        }
    }
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChannelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let label = match *state {
            SlotState::Empty => "empty",
            SlotState::Installed(_) => "installed",
            SlotState::Opened => "opened",
        };
        f.debug_struct("ChannelSlot").field("state", &label).finish()
    }
}

/// An opened channel resource owned by a single session.
pub struct ChannelHandle {
    rid: ResourceId,
    transport: Box<dyn DuplexTransport>,
}

impl ChannelHandle {
    /// Resource id owned by this handle.
    #[must_use]
    pub const fn rid(&self) -> ResourceId {
        self.rid
    }

    /// Reads the next line from resource `rid`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::BadResource`] for a foreign id, otherwise the
    /// transport's error.
    pub fn read_line(
        &mut self,
        rid: ResourceId,
        timeout: Option<Duration>,
    ) -> Result<String, ChannelError> {
        self.check(rid)?;
        self.transport.recv_line(timeout)
    }

    /// Writes one line to resource `rid` and returns the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::BadResource`] for a foreign id, otherwise the
    /// transport's error.
    pub fn write_line(&mut self, rid: ResourceId, line: &str) -> Result<usize, ChannelError> {
        self.check(rid)?;
        self.transport.send_line(line)
    }

    fn check(&self, rid: ResourceId) -> Result<(), ChannelError> {
        if rid == self.rid {
            Ok(())
        } else {
            Err(ChannelError::BadResource {
                rid,
                owned: self.rid,
            })
        }
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("rid", &self.rid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
