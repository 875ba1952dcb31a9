//! Watch source contract
//!
//! The engine only depends on these traits. `NotifySource` implements them
//! on top of the OS notification API; tests drive the engine with scripted
//! sources.

mod native;

pub use native::NotifySource;

use crate::types::{RawEvent, SyncError};
use std::path::{Path, PathBuf};

/// One item delivered by a watch source
#[derive(Debug)]
pub enum WatchSignal {
    /// An entry inside a watched directory changed
    Event(RawEvent),

    /// Notifications were dropped; `dir` is `None` when the source cannot
    /// tell which directory lost them
    Overflow { dir: Option<PathBuf> },

    /// The watch on this directory is gone for good
    Invalidated(PathBuf),

    /// The source could not translate a notification
    Rejected(SyncError),
}

/// Per-directory watch registration
pub trait DirectoryWatcher {
    fn watch(&mut self, dir: &Path) -> Result<(), SyncError>;

    fn unwatch(&mut self, dir: &Path) -> Result<(), SyncError>;
}

/// Blocking stream of watch signals
pub trait WatchSource: DirectoryWatcher {
    /// Wait for at least one signal and return everything queued.
    ///
    /// `None` means the source is closed.
    fn next_batch(&mut self) -> Option<Vec<WatchSignal>>;
}
