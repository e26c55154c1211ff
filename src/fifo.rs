//! Creation and removal of the named pipes a session communicates over.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while setting up the named pipes.
#[derive(Debug, Error)]
pub enum FifoError {
    /// The path exists but names something other than a named pipe.
    #[error("'{path}' already exists and is not a named pipe")]
    Conflict { path: PathBuf },

    /// Creating or inspecting the path failed.
    #[error("failed to create named pipe '{path}': {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Ensure every path in `paths` names a pipe (mode 0666, subject to umask).
///
/// Existing pipes are reused as-is; their permissions are not rechecked. On
/// any failure the pipes created by this call are removed again before the
/// error is returned, so partial creation is never left behind.
pub fn create_all<P: AsRef<Path>>(paths: &[P]) -> Result<(), FifoError> {
    for (index, path) in paths.iter().enumerate() {
        if let Err(err) = ensure_fifo(path.as_ref()) {
            remove_all(&paths[..index]);
            return Err(err);
        }
    }
    Ok(())
}

fn ensure_fifo(path: &Path) -> Result<(), FifoError> {
    match fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => {
            debug!(path = %path.display(), "reusing existing named pipe");
            Ok(())
        }
        Ok(_) => Err(FifoError::Conflict {
            path: path.to_path_buf(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            mkfifo(path, Mode::from_bits_truncate(0o666)).map_err(|errno| {
                FifoError::CreateFailed {
                    path: path.to_path_buf(),
                    source: errno.into(),
                }
            })?;
            info!(path = %path.display(), "created named pipe");
            Ok(())
        }
        Err(err) => Err(FifoError::CreateFailed {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

/// Best-effort teardown: each path is deleted iff it still names a pipe.
///
/// Removal failures are reported and never stop the remaining removals or
/// escalate into a failed exit.
pub fn remove_all<P: AsRef<Path>>(paths: &[P]) {
    for path in paths {
        let path = path.as_ref();
        let is_fifo = fs::metadata(path)
            .map(|meta| meta.file_type().is_fifo())
            .unwrap_or(false);
        if !is_fifo {
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed named pipe"),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove named pipe");
            }
        }
    }
}
