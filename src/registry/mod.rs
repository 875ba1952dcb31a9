//! Path mapping registry
//!
//! Keeps the symmetric association between every directory of one tree and
//! its counterpart in the paired tree. The relation is stored as two maps
//! kept as exact inverses:
//! - `forward`: left-side directory -> right-side directory
//! - `backward`: right-side directory -> left-side directory
//!
//! All mutation goes through one mutex so a directory-create registration
//! never tears against concurrent lookups.

mod walk;

pub use walk::{collect_pairs, merge_join, subdir_names};

use crate::types::SyncError;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Mapping {
    forward: HashMap<PathBuf, PathBuf>,
    backward: HashMap<PathBuf, PathBuf>,
}

/// Which index a path was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Mapping {
    fn insert(&mut self, left: PathBuf, right: PathBuf) {
        if let Some(stale) = self.forward.insert(left.clone(), right.clone()) {
            if stale != right {
                self.backward.remove(&stale);
            }
        }
        if let Some(stale) = self.backward.insert(right, left.clone()) {
            if stale != left {
                self.forward.remove(&stale);
            }
        }
    }

    fn lookup(&self, path: &Path) -> Option<(Side, &PathBuf)> {
        if let Some(right) = self.forward.get(path) {
            Some((Side::Left, right))
        } else {
            self.backward.get(path).map(|left| (Side::Right, left))
        }
    }

    /// Remove `dir` and every descendant on the side it belongs to.
    ///
    /// Returns the removed pairings as `(own side, counterpart)`.
    fn remove_subtree(&mut self, dir: &Path) -> Vec<(PathBuf, PathBuf)> {
        let Some((side, _)) = self.lookup(dir) else {
            return Vec::new();
        };
        let (own, other) = match side {
            Side::Left => (&mut self.forward, &mut self.backward),
            Side::Right => (&mut self.backward, &mut self.forward),
        };

        let doomed: Vec<PathBuf> = own
            .keys()
            .filter(|path| path.starts_with(dir))
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(doomed.len());
        for path in doomed {
            if let Some(counterpart) = own.remove(&path) {
                other.remove(&counterpart);
                removed.push((path, counterpart));
            }
        }
        removed
    }
}

/// Bidirectional directory mapping shared by the engine and the scheduler
#[derive(Debug, Default)]
pub struct PathRegistry {
    mapping: Mutex<Mapping>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn mapping(&self) -> MutexGuard<'_, Mapping> {
        self.mapping.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a root pair and pair every existing subdirectory below it.
    ///
    /// Returns the registered directories that exist on disk, on both
    /// sides, so the caller can bind watches to them.
    pub fn register(&self, left: &Path, right: &Path) -> Vec<PathBuf> {
        let pairs = collect_pairs(left, right);
        info!(
            "Registered {} <-> {} ({} directory pair(s))",
            left.display(),
            right.display(),
            pairs.len()
        );
        self.store(pairs)
    }

    /// Pair a directory just created under a registered tree.
    ///
    /// The counterpart of `dir`'s parent is looked up on either side and
    /// `dir` is paired with the same name below it, then its own subtree is
    /// walked. Returns the existing directories that were registered.
    pub fn register_subtree(&self, dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
        let (parent, name) = split(dir)?;
        let (side, parent_symmetric) = {
            let mapping = self.mapping();
            let (side, symmetric) =
                mapping
                    .lookup(parent)
                    .ok_or_else(|| SyncError::StructuralMismatch {
                        path: parent.to_path_buf(),
                    })?;
            (side, symmetric.clone())
        };

        let counterpart = parent_symmetric.join(name);
        debug!("Register subtree {} <-> {}", dir.display(), counterpart.display());
        let pairs = match side {
            Side::Left => collect_pairs(dir, &counterpart),
            Side::Right => collect_pairs(&counterpart, dir),
        };
        Ok(self.store(pairs))
    }

    /// Walk an already-registered pairing again, picking up directories that
    /// appeared without being observed.
    pub fn refresh(&self, dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
        let (side, symmetric) = {
            let mapping = self.mapping();
            let (side, symmetric) =
                mapping
                    .lookup(dir)
                    .ok_or_else(|| SyncError::StructuralMismatch {
                        path: dir.to_path_buf(),
                    })?;
            (side, symmetric.clone())
        };

        let pairs = match side {
            Side::Left => collect_pairs(dir, &symmetric),
            Side::Right => collect_pairs(&symmetric, dir),
        };
        Ok(self.store(pairs))
    }

    /// Drop `dir`, its counterpart and all their descendants.
    ///
    /// Returns the removed pairings as `(path on dir's side, counterpart)`,
    /// so the caller can release watches on both sides.
    pub fn unregister(&self, dir: &Path) -> Vec<(PathBuf, PathBuf)> {
        let removed = self.mapping().remove_subtree(dir);
        if !removed.is_empty() {
            debug!("Unregistered {} ({} pairing(s))", dir.display(), removed.len());
        }
        removed
    }

    /// Counterpart of a registered directory
    pub fn symmetric_of(&self, path: &Path) -> Result<PathBuf, SyncError> {
        self.mapping()
            .lookup(path)
            .map(|(_, symmetric)| symmetric.clone())
            .ok_or_else(|| SyncError::StructuralMismatch {
                path: path.to_path_buf(),
            })
    }

    /// Mirror target of entry `name` inside registered directory `dir`
    pub fn resolve(&self, dir: &Path, name: &OsStr) -> Result<PathBuf, SyncError> {
        Ok(self.symmetric_of(dir)?.join(name))
    }

    /// Mirror target of an arbitrary entry below a registered directory
    pub fn resolve_path(&self, path: &Path) -> Result<PathBuf, SyncError> {
        let (dir, name) = split(path)?;
        self.resolve(dir, name)
    }

    /// Left-side directories of every pairing
    pub fn left_directories(&self) -> Vec<PathBuf> {
        self.mapping().forward.keys().cloned().collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.mapping().lookup(path).is_some()
    }

    /// Number of pairings
    pub fn len(&self) -> usize {
        self.mapping().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, pairs: Vec<(PathBuf, PathBuf)>) -> Vec<PathBuf> {
        let mut existing = Vec::new();
        for (left, right) in &pairs {
            if left.is_dir() {
                existing.push(left.clone());
            }
            if right.is_dir() {
                existing.push(right.clone());
            }
        }

        let mut mapping = self.mapping();
        for (left, right) in pairs {
            mapping.insert(left, right);
        }
        existing
    }
}

fn split(path: &Path) -> Result<(&Path, &OsStr), SyncError> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(SyncError::StructuralMismatch {
            path: path.to_path_buf(),
        }),
    }
}
