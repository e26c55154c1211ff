//! One directional, non-blocking connection to a named pipe.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// Which way bytes flow through an endpoint, from the relay's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The remote process writes, the relay reads.
    Read,
    /// The relay writes, the remote process reads.
    Write,
}

/// A named-pipe handle that is either Open (descriptor present, always in
/// non-blocking mode) or Closed (waiting for the next reopen attempt).
pub struct Endpoint {
    path: PathBuf,
    direction: Direction,
    file: Option<File>,
}

impl Endpoint {
    pub fn new(path: impl Into<PathBuf>, direction: Direction) -> Self {
        Self {
            path: path.into(),
            direction,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Raw descriptor for poll registration, `None` while Closed.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|file| file.as_raw_fd())
    }

    /// Attempt a non-blocking open. Already Open is a no-op.
    ///
    /// `Ok(false)` means no peer is present yet: a write-side open with no
    /// reader fails with `ENXIO`, which is an explicit absence rather than
    /// an error. The handle stays Closed and the caller retries later.
    pub fn open(&mut self) -> io::Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        let mut options = OpenOptions::new();
        match self.direction {
            Direction::Read => options.read(true),
            Direction::Write => options.write(true),
        };
        match options.custom_flags(libc::O_NONBLOCK).open(&self.path) {
            Ok(file) => {
                self.file = Some(file);
                Ok(true)
            }
            Err(err) if err.raw_os_error() == Some(libc::ENXIO) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Drop the descriptor. Closing an already-closed handle is a no-op.
    pub fn close(&mut self) {
        self.file = None;
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.read(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;
    use tempfile::TempDir;

    fn make_fifo(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        mkfifo(&path, Mode::from_bits_truncate(0o600)).expect("mkfifo");
        path
    }

    #[test]
    fn read_side_opens_without_a_peer() {
        let dir = TempDir::new().expect("tempdir");
        let path = make_fifo(&dir, "fifo");

        let mut endpoint = Endpoint::new(&path, Direction::Read);
        assert!(endpoint.open().expect("open"));
        assert!(endpoint.is_open());
        assert!(endpoint.raw_fd().is_some());
    }

    #[test]
    fn write_side_reports_missing_reader_as_absence() {
        let dir = TempDir::new().expect("tempdir");
        let path = make_fifo(&dir, "fifo");

        let mut endpoint = Endpoint::new(&path, Direction::Write);
        assert!(!endpoint.open().expect("open"));
        assert!(!endpoint.is_open());
    }

    #[test]
    fn write_side_opens_once_a_reader_exists() {
        let dir = TempDir::new().expect("tempdir");
        let path = make_fifo(&dir, "fifo");

        let mut reader = Endpoint::new(&path, Direction::Read);
        assert!(reader.open().expect("reader open"));

        let mut writer = Endpoint::new(&path, Direction::Write);
        assert!(writer.open().expect("writer open"));
        assert!(writer.is_open());
    }

    #[test]
    fn open_is_a_no_op_when_open_and_close_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let path = make_fifo(&dir, "fifo");

        let mut endpoint = Endpoint::new(&path, Direction::Read);
        assert!(endpoint.open().expect("open"));
        let fd = endpoint.raw_fd();
        assert!(endpoint.open().expect("second open"));
        assert_eq!(endpoint.raw_fd(), fd);

        endpoint.close();
        endpoint.close();
        assert!(endpoint.raw_fd().is_none());
    }

    #[test]
    fn opening_a_missing_path_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let mut endpoint = Endpoint::new(dir.path().join("nope"), Direction::Read);
        assert!(endpoint.open().is_err());
    }
}
