//! Error types for twinsync

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for twinsync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// An observed path has no registered counterpart.
    ///
    /// The registry and the live watch set have diverged.
    #[error("Structural mismatch: no symmetric path registered for {path}")]
    StructuralMismatch { path: PathBuf },

    /// Watch source produced an event kind outside Create/Delete/Modify
    #[error("Unsupported event kind: {0}")]
    UnsupportedEventKind(String),

    /// Permission denied for specific path
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Disk full while writing a path
    #[error("Disk full while writing {path}")]
    DiskFull { path: PathBuf },

    /// Watch source failure (setup or registration)
    #[error("Watch error: {0}")]
    Watch(String),

    /// Resync retries ran out
    #[error("Resync gave up on {path} after {attempts} attempt(s): {last_error}")]
    ResyncExhausted {
        path: PathBuf,
        attempts: u32,
        last_error: String,
    },
}

impl SyncError {
    /// Classify an OS error raised while touching `path`.
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        if matches!(error.kind(), ErrorKind::PermissionDenied) {
            SyncError::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else if matches!(error.kind(), ErrorKind::StorageFull)
            || matches!(error.raw_os_error(), Some(28 | 122))
        {
            SyncError::DiskFull {
                path: path.to_path_buf(),
            }
        } else {
            SyncError::Io(error)
        }
    }

    /// Check if retrying this error may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Io(_))
    }

    /// Check if this error will not go away by waiting
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Check if this error signals a registry invariant violation
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, SyncError::StructuralMismatch { .. })
    }
}
