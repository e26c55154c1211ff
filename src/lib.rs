//! Attach the current terminal to a process over a pair of named pipes.
//!
//! The remote process opens the inbound pipe for writing and the outbound
//! pipe for reading; whatever it writes is echoed to the terminal, and
//! operator keystrokes are forwarded back to it. [`session::attach`] wires
//! the whole thing together; [`relay::Relay`] is the event loop underneath.

pub mod fifo;
pub mod logging;
pub mod relay;
pub mod session;
pub mod signals;

pub use relay::{Relay, RelayError, RelayExit};
pub use session::{attach, AttachError};
pub use signals::{SignalChannel, SignalEvent, SignalInjector};
