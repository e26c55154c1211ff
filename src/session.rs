//! One attach session: pipe creation, the relay loop, and the single
//! cleanup path shared by every way out.

use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use scopeguard::defer;
use thiserror::Error;
use tracing::debug;

use crate::fifo::{self, FifoError};
use crate::relay::{Relay, RelayError, RelayExit};
use crate::signals::SignalChannel;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error(transparent)]
    Fifo(#[from] FifoError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Create both pipes, run the relay until it exits, and remove the pipes.
///
/// Removal runs on every way out, interrupt, hangup, and failure alike, so
/// an aborted session never leaves endpoints behind. The operator's console
/// handles are borrowed, not owned: they are never closed here.
pub fn attach<R, W>(
    inbound: &Path,
    outbound: &Path,
    signals: SignalChannel,
    console_in: R,
    console_out: W,
) -> Result<RelayExit, AttachError>
where
    R: Read + AsRawFd,
    W: Write,
{
    let paths = [inbound, outbound];
    fifo::create_all(&paths)?;
    defer! {
        fifo::remove_all(&paths);
    }

    let mut relay = Relay::new(inbound, outbound, signals, console_in, console_out);
    let exit = relay.run()?;
    debug!(?exit, "relay loop finished");
    Ok(exit)
}
