//! Raw change events produced by the watch source

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of change observed on a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Entry appeared
    Create,

    /// Entry disappeared
    Delete,

    /// Entry content changed
    Modify,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "Create",
            EventKind::Delete => "Delete",
            EventKind::Modify => "Modify",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification: `name` inside watched directory `dir` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub dir: PathBuf,
    pub name: OsString,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<OsString>, kind: EventKind) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            kind,
        }
    }

    /// Split a full path into its parent directory and entry name.
    ///
    /// Returns `None` for roots and paths ending in `..`.
    pub fn from_path(path: &Path, kind: EventKind) -> Option<Self> {
        let dir = path.parent()?;
        let name = path.file_name()?;
        Some(Self::new(dir, name, kind))
    }

    /// Full path of the changed entry
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }
}
