//! The event-multiplexing loop at the heart of a session.
//!
//! Four sources are watched together: the inbound pipe (remote process →
//! console), the outbound pipe (console → remote process), the signal
//! channel, and console input. One iteration polls them with a bounded
//! timeout, dispatches whatever became ready in a fixed order, and finishes
//! by re-attempting the open of any endpoint the remote side has dropped.
//!
//! The loop's state is the product of the two endpoints' open/closed states
//! and the running flag; the `Relay` owns every handle and the buffer, and
//! is the only writer of state transitions.

mod buffer;
mod endpoint;

pub use buffer::InboundBuffer;
pub use endpoint::{Direction, Endpoint};

use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::signals::{SignalChannel, SignalEvent};

/// Bytes queued per direction; also the per-read chunk limit.
pub const BUFFER_CAPACITY: usize = 8192;

/// Upper bound on one multiplexer wait. A pure timeout is only a liveness
/// tick; reopen attempts run at the end of every iteration regardless.
const POLL_TIMEOUT_MS: libc::c_int = 1000;

const INBOUND: usize = 0;
const OUTBOUND: usize = 1;
const SIGNAL: usize = 2;
const CONSOLE: usize = 3;

const HANGUP: libc::c_short = libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;

/// How the loop ended. All three are graceful departures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// Operator interrupt (SIGINT).
    Interrupted,
    /// Console input reached EOF or hung up: the operator detached.
    ConsoleClosed,
    /// The signal channel itself hung up; it is not recoverable.
    SignalChannelClosed,
}

/// Loop-fatal failures. Everything else is handled in place by a state
/// transition on the endpoint it concerns.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("multiplexer wait failed: {0}")]
    Poll(#[source] io::Error),

    /// A signal class the channel never registered for arrived; the
    /// registrations are mis-configured.
    #[error("unexpected signal {0} on the signal channel")]
    UnexpectedSignal(i32),
}

/// The relay between console stdio and the two named pipes.
pub struct Relay<R, W> {
    inbound: Endpoint,
    outbound: Endpoint,
    buffer: InboundBuffer,
    signals: SignalChannel,
    console_in: R,
    console_out: W,
    scratch: [u8; BUFFER_CAPACITY],
}

impl<R, W> Relay<R, W>
where
    R: Read + AsRawFd,
    W: Write,
{
    pub fn new(
        inbound: &Path,
        outbound: &Path,
        signals: SignalChannel,
        console_in: R,
        console_out: W,
    ) -> Self {
        Self {
            inbound: Endpoint::new(inbound, Direction::Read),
            outbound: Endpoint::new(outbound, Direction::Write),
            buffer: InboundBuffer::new(BUFFER_CAPACITY),
            signals,
            console_in,
            console_out,
            scratch: [0u8; BUFFER_CAPACITY],
        }
    }

    /// Run until an interrupt, a console or signal-channel hangup, or a
    /// loop-fatal error.
    ///
    /// Endpoints close when `self` drops; removing the pipes from the
    /// filesystem is the session's job.
    pub fn run(&mut self) -> Result<RelayExit, RelayError> {
        self.repair_endpoints();
        info!("entering relay loop");
        loop {
            let revents = self.poll_sources()?;
            if let Some(exit) = self.handle_inbound(revents[INBOUND]) {
                return Ok(exit);
            }
            self.handle_outbound(revents[OUTBOUND]);
            if let Some(exit) = self.handle_signals(revents[SIGNAL])? {
                return Ok(exit);
            }
            if let Some(exit) = self.handle_console(revents[CONSOLE]) {
                return Ok(exit);
            }
            self.repair_endpoints();
        }
    }

    /// Wait for readiness on whichever sources are currently registered.
    ///
    /// Closed endpoints take the slot `fd = -1`, which poll(2) skips, so the
    /// slot layout stays fixed across iterations.
    fn poll_sources(&self) -> Result<[libc::c_short; 4], RelayError> {
        let mut fds = [libc::pollfd {
            fd: -1,
            events: 0,
            revents: 0,
        }; 4];

        fds[INBOUND].fd = self.inbound.raw_fd().unwrap_or(-1);
        fds[INBOUND].events = libc::POLLIN;

        // Write-interest only while there is something to drain; a hangup on
        // an idle outbound descriptor is still reported without it.
        fds[OUTBOUND].fd = self.outbound.raw_fd().unwrap_or(-1);
        if !self.buffer.is_empty() {
            fds[OUTBOUND].events = libc::POLLOUT;
        }

        fds[SIGNAL].fd = self.signals.fd();
        fds[SIGNAL].events = libc::POLLIN;

        // A full buffer unregisters console input: backpressure, not drops.
        fds[CONSOLE].fd = if self.buffer.is_full() {
            -1
        } else {
            self.console_in.as_raw_fd()
        };
        fds[CONSOLE].events = libc::POLLIN;

        loop {
            // SAFETY: fds is a valid pollfd array for the whole call.
            let ret = unsafe {
                libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, POLL_TIMEOUT_MS)
            };
            if ret >= 0 {
                return Ok([
                    fds[INBOUND].revents,
                    fds[OUTBOUND].revents,
                    fds[SIGNAL].revents,
                    fds[CONSOLE].revents,
                ]);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(RelayError::Poll(err));
            }
            // EINTR: the handler already queued its byte; wait again.
        }
    }

    fn handle_inbound(&mut self, revents: libc::c_short) -> Option<RelayExit> {
        if revents & libc::POLLIN != 0 {
            match self.inbound.read(&mut self.scratch) {
                Ok(0) => {
                    debug!(path = %self.inbound.path().display(), "inbound endpoint reached EOF");
                    self.inbound.close();
                }
                Ok(n) => {
                    trace!(bytes = n, "echoing inbound data");
                    if self.echo(n).is_err() {
                        return Some(RelayExit::ConsoleClosed);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!(error = %err, "inbound read failed, closing endpoint");
                    self.inbound.close();
                }
            }
        }
        if revents & HANGUP != 0 {
            // One last drain read so bytes queued before the hangup still
            // reach the console.
            if let Ok(n) = self.inbound.read(&mut self.scratch) {
                if n > 0 && self.echo(n).is_err() {
                    return Some(RelayExit::ConsoleClosed);
                }
            }
            debug!(path = %self.inbound.path().display(), "inbound endpoint hung up");
            self.inbound.close();
        }
        None
    }

    fn echo(&mut self, len: usize) -> io::Result<()> {
        let result = self
            .console_out
            .write_all(&self.scratch[..len])
            .and_then(|()| self.console_out.flush());
        if let Err(err) = &result {
            debug!(error = %err, "console output closed");
        }
        result
    }

    fn handle_outbound(&mut self, revents: libc::c_short) {
        if revents & libc::POLLOUT != 0 {
            match self.buffer.drain_into(&mut self.outbound) {
                Ok(written) if written > 0 => {
                    trace!(bytes = written, pending = self.buffer.len(), "drained console input");
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    // Not fatal here: the SIGPIPE shows up on the signal
                    // channel and the hangup readiness below closes the
                    // endpoint.
                    debug!("outbound write hit a broken pipe");
                }
                Err(err) => {
                    warn!(error = %err, "outbound write failed, closing endpoint");
                    self.close_outbound();
                }
            }
        }
        if revents & HANGUP != 0 {
            debug!(path = %self.outbound.path().display(), "outbound endpoint hung up");
            self.close_outbound();
        }
    }

    /// Closing the outbound endpoint discards the queue; queued keystrokes
    /// are never replayed to whichever consumer connects next.
    fn close_outbound(&mut self) {
        self.outbound.close();
        if !self.buffer.is_empty() {
            debug!(discarded = self.buffer.len(), "discarding input queued for the old reader");
            self.buffer.clear();
        }
    }

    fn handle_signals(&mut self, revents: libc::c_short) -> Result<Option<RelayExit>, RelayError> {
        if revents & libc::POLLIN != 0 {
            match self.signals.next_event() {
                Ok(Some(SignalEvent::Interrupt)) => {
                    info!("interrupt received, shutting down");
                    return Ok(Some(RelayExit::Interrupted));
                }
                Ok(Some(SignalEvent::BrokenPipe)) => {
                    // Informational only: the outbound endpoint's own hangup
                    // readiness is what closes it.
                    debug!("read end of the outbound pipe closed");
                }
                Ok(Some(SignalEvent::Unexpected(signal))) => {
                    return Err(RelayError::UnexpectedSignal(signal));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "signal channel read failed");
                    return Ok(Some(RelayExit::SignalChannelClosed));
                }
            }
        }
        if revents & HANGUP != 0 {
            return Ok(Some(RelayExit::SignalChannelClosed));
        }
        Ok(None)
    }

    fn handle_console(&mut self, revents: libc::c_short) -> Option<RelayExit> {
        if revents & libc::POLLIN != 0 {
            match self.console_in.read(&mut self.scratch) {
                Ok(0) => {
                    debug!("console input reached EOF");
                    return Some(RelayExit::ConsoleClosed);
                }
                Ok(n) => {
                    let accepted = self.buffer.append(&self.scratch[..n]);
                    if self.outbound.is_open() {
                        trace!(bytes = accepted, pending = self.buffer.len(), "queued console input");
                    } else if accepted > 0 {
                        debug!(discarded = accepted, "outbound endpoint closed, dropping console input");
                        self.buffer.clear();
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    debug!(error = %err, "console read failed, treating as detach");
                    return Some(RelayExit::ConsoleClosed);
                }
            }
        }
        if revents & HANGUP != 0 {
            debug!("console input hung up");
            return Some(RelayExit::ConsoleClosed);
        }
        None
    }

    /// Reopen attempts for whichever endpoints are Closed. Never blocks: no
    /// peer yet just leaves the endpoint Closed for the next iteration.
    fn repair_endpoints(&mut self) {
        for endpoint in [&mut self.inbound, &mut self.outbound] {
            if endpoint.is_open() {
                continue;
            }
            match endpoint.open() {
                Ok(true) => debug!(path = %endpoint.path().display(), "endpoint opened"),
                Ok(false) => trace!(path = %endpoint.path().display(), "no peer yet"),
                Err(err) => {
                    warn!(path = %endpoint.path().display(), error = %err, "endpoint open failed");
                }
            }
        }
    }
}
