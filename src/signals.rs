//! SIGINT and SIGPIPE as a pollable event source.
//!
//! Acting on a signal inside its handler while a read or write is in flight
//! is a reentrancy hazard, so the handlers do exactly one thing: push the
//! signal number as a single byte into a non-blocking self-pipe. The relay
//! polls the read end next to its I/O descriptors and pops events
//! synchronously, one per read.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use signal_hook::consts::{SIGINT, SIGPIPE};
use signal_hook::low_level;
use signal_hook::SigId;

/// A termination-class event popped from the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// The operator asked for shutdown (SIGINT).
    Interrupt,
    /// The far side of a pipe went away mid-write (SIGPIPE).
    BrokenPipe,
    /// A signal class the channel never registered for.
    Unexpected(i32),
}

impl SignalEvent {
    fn from_byte(byte: u8) -> Self {
        match i32::from(byte) {
            SIGINT => SignalEvent::Interrupt,
            SIGPIPE => SignalEvent::BrokenPipe,
            other => SignalEvent::Unexpected(other),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            SignalEvent::Interrupt => SIGINT as u8,
            SignalEvent::BrokenPipe => SIGPIPE as u8,
            SignalEvent::Unexpected(signal) => signal as u8,
        }
    }
}

/// The process-wide termination signal channel.
///
/// Established once at startup, torn down (handlers unhooked) on drop. Only
/// SIGINT and SIGPIPE are ever delivered through it; anything else coming
/// out of [`next_event`](Self::next_event) means the registrations are
/// mis-configured.
pub struct SignalChannel {
    reader: UnixStream,
    writer: UnixStream,
    registrations: Vec<SigId>,
}

impl SignalChannel {
    /// Build the channel and install the SIGINT/SIGPIPE handlers.
    pub fn install() -> io::Result<Self> {
        let mut channel = Self::detached()?;
        for signal in [SIGINT, SIGPIPE] {
            let fd = channel.writer.as_raw_fd();
            let byte = signal as u8;
            let handler = move || {
                // SAFETY: write(2) is async-signal-safe; the descriptor
                // outlives the registration because Drop unhooks the
                // handlers before the stream is closed.
                unsafe { libc::write(fd, std::ptr::addr_of!(byte).cast(), 1) };
            };
            // SAFETY: the handler does nothing beyond the single write above.
            let id = unsafe { low_level::register(signal, handler) }?;
            channel.registrations.push(id);
        }
        Ok(channel)
    }

    /// Build the channel without touching process-wide handler state.
    ///
    /// Nothing arrives on a detached channel unless fed through an
    /// [`injector`](Self::injector); tests substitute this for real signal
    /// delivery.
    pub fn detached() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self {
            reader,
            writer,
            registrations: Vec::new(),
        })
    }

    /// A handle that feeds events into this channel from outside.
    pub fn injector(&self) -> io::Result<SignalInjector> {
        Ok(SignalInjector {
            writer: self.writer.try_clone()?,
        })
    }

    /// Raw descriptor of the read end, for poll registration.
    pub fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Pop exactly one pending event, or `None` when nothing is queued.
    pub fn next_event(&mut self) -> io::Result<Option<SignalEvent>> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(SignalEvent::from_byte(byte[0]))),
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl Drop for SignalChannel {
    fn drop(&mut self) {
        for id in self.registrations.drain(..) {
            low_level::unregister(id);
        }
    }
}

/// Writer half of a [`SignalChannel`], detachable from the relay loop.
pub struct SignalInjector {
    writer: UnixStream,
}

impl SignalInjector {
    /// Queue one event on the channel.
    pub fn send(&mut self, event: SignalEvent) -> io::Result<()> {
        self.writer.write_all(&[event.as_byte()])
    }
}
