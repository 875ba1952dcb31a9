//! Change applier: mirror one observed change onto its symmetric path

use super::compare::contents_equal;
use super::copy::{copy_file_atomic, CopyMode};
use crate::types::{EventKind, SyncError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Why an apply did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Create: target already present
    TargetExists,
    /// Delete: nothing to delete
    TargetMissing,
    /// Create/Modify: source vanished before execution
    SourceMissing,
    /// Delete: source was recreated before execution
    SourceRecreated,
    /// Modify: directories carry no content
    Directory,
    /// Modify: target already holds the same bytes
    Identical,
    /// Create: source is neither file, directory nor symlink
    Unsupported,
}

/// What an apply did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    CreatedDir,
    CreatedFile { bytes: u64 },
    CreatedSymlink,
    /// Entries removed, the target itself included
    Deleted { entries: usize },
    Modified { bytes: u64 },
    Skipped(SkipReason),
}

impl ApplyOutcome {
    pub fn is_skip(&self) -> bool {
        matches!(self, ApplyOutcome::Skipped(_))
    }

    /// Bytes written to the target
    pub fn bytes_copied(&self) -> u64 {
        match self {
            ApplyOutcome::CreatedFile { bytes } | ApplyOutcome::Modified { bytes } => *bytes,
            _ => 0,
        }
    }
}

/// Mirror a `kind` change of `source` onto `target`.
///
/// Filesystem state is read now, not when the event was observed.
pub fn apply_change(
    source: &Path,
    target: &Path,
    kind: EventKind,
) -> Result<ApplyOutcome, SyncError> {
    match kind {
        EventKind::Create => apply_create(source, target),
        EventKind::Delete => apply_delete(source, target),
        EventKind::Modify => apply_modify(source, target),
    }
}

/// Create `target` as a copy of `source`.
///
/// - existing target: no-op
/// - directory: create it with any missing ancestors
/// - file: copy bytes, permissions and mtime
/// - symlink: recreate the link without dereferencing it
pub fn apply_create(source: &Path, target: &Path) -> Result<ApplyOutcome, SyncError> {
    if exists(target)? {
        return Ok(ApplyOutcome::Skipped(SkipReason::TargetExists));
    }

    let metadata = match fs::symlink_metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(ApplyOutcome::Skipped(SkipReason::SourceMissing))
        }
        Err(e) => return Err(SyncError::from_io(source, e)),
    };
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        fs::create_dir_all(target).map_err(|e| SyncError::from_io(target, e))?;
        Ok(ApplyOutcome::CreatedDir)
    } else if file_type.is_file() {
        let bytes = copy_file_atomic(source, target, CopyMode::WithAttributes)?;
        Ok(ApplyOutcome::CreatedFile { bytes })
    } else if file_type.is_symlink() {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::from_io(parent, e))?;
        }
        let link = fs::read_link(source).map_err(|e| SyncError::from_io(source, e))?;
        create_symlink(&link, target)?;
        Ok(ApplyOutcome::CreatedSymlink)
    } else {
        Ok(ApplyOutcome::Skipped(SkipReason::Unsupported))
    }
}

/// Remove `target` after `source` disappeared.
///
/// Directories are removed deepest-first. A file is only removed while
/// `source` is still absent, so a concurrent recreate is not lost.
pub fn apply_delete(source: &Path, target: &Path) -> Result<ApplyOutcome, SyncError> {
    let metadata = match fs::symlink_metadata(target) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(ApplyOutcome::Skipped(SkipReason::TargetMissing))
        }
        Err(e) => return Err(SyncError::from_io(target, e)),
    };

    if metadata.is_dir() {
        let order = deletion_order(target)?;
        for path in &order {
            remove_entry(path)?;
        }
        return Ok(ApplyOutcome::Deleted {
            entries: order.len(),
        });
    }

    if exists(source)? {
        return Ok(ApplyOutcome::Skipped(SkipReason::SourceRecreated));
    }
    remove_entry(target)?;
    Ok(ApplyOutcome::Deleted { entries: 1 })
}

/// Overwrite `target`'s bytes from `source` when they differ.
///
/// A missing target is created as by [`apply_create`].
///
/// The equality short-circuit is what stops a change from bouncing back
/// and forth between the two trees.
pub fn apply_modify(source: &Path, target: &Path) -> Result<ApplyOutcome, SyncError> {
    let metadata = match fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(ApplyOutcome::Skipped(SkipReason::SourceMissing))
        }
        Err(e) => return Err(SyncError::from_io(source, e)),
    };
    if metadata.is_dir() {
        return Ok(ApplyOutcome::Skipped(SkipReason::Directory));
    }

    if contents_equal(source, target)? {
        return Ok(ApplyOutcome::Skipped(SkipReason::Identical));
    }

    // A file renamed into place arrives as Modify; the target may not
    // exist yet, or its parent may not
    if !exists(target)? {
        return apply_create(source, target);
    }

    let bytes = copy_file_atomic(source, target, CopyMode::ContentOnly)?;
    Ok(ApplyOutcome::Modified { bytes })
}

/// Every entry below and including `root`, deepest first.
///
/// Children always precede their parent directory, since a directory can
/// only be removed once empty. Symlinked directories are not descended.
pub fn deletion_order(root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut found: Vec<(usize, PathBuf)> = Vec::new();
    let mut worklist = vec![(0usize, root.to_path_buf())];

    while let Some((depth, path)) = worklist.pop() {
        let is_dir = fs::symlink_metadata(&path)
            .map(|m| m.is_dir())
            .map_err(|e| SyncError::from_io(&path, e))?;
        if is_dir {
            for entry in fs::read_dir(&path).map_err(|e| SyncError::from_io(&path, e))? {
                let entry = entry.map_err(|e| SyncError::from_io(&path, e))?;
                worklist.push((depth + 1, entry.path()));
            }
        }
        found.push((depth, path));
    }

    found.sort_by(|(a, _), (b, _)| b.cmp(a));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

fn remove_entry(path: &Path) -> Result<(), SyncError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SyncError::from_io(path, e)),
    };
    let result = if metadata.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::from_io(path, e)),
    }
}

/// Existence check that does not follow symlinks
fn exists(path: &Path) -> Result<bool, SyncError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::from_io(path, e)),
    }
}

#[cfg(unix)]
fn create_symlink(link: &Path, target: &Path) -> Result<(), SyncError> {
    std::os::unix::fs::symlink(link, target).map_err(|e| SyncError::from_io(target, e))
}

#[cfg(windows)]
fn create_symlink(link: &Path, target: &Path) -> Result<(), SyncError> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    match symlink_file(link, target) {
        Ok(()) => Ok(()),
        Err(file_err) => match symlink_dir(link, target) {
            Ok(()) => Ok(()),
            Err(_) => Err(SyncError::from_io(target, file_err)),
        },
    }
}
