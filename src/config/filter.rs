//! Exclude patterns

use crate::executor::PART_SUFFIX;
use crate::types::{RootPair, SyncError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// Decides which paths are never mirrored.
///
/// Patterns are matched against each path component below the root the
/// path belongs to, so `.git` excludes every `.git` directory and all of
/// its contents. Temporary files written by the applier are always
/// excluded.
#[derive(Debug, Clone)]
pub struct PathFilter {
    set: GlobSet,
    roots: Vec<PathBuf>,
}

impl PathFilter {
    pub fn new(patterns: &[String], pairs: &[RootPair]) -> Result<Self, SyncError> {
        let mut builder = GlobSetBuilder::new();
        let builtin = format!("*.{}", PART_SUFFIX);
        for pattern in patterns.iter().map(String::as_str).chain([builtin.as_str()]) {
            let glob = Glob::new(pattern).map_err(|e| {
                SyncError::Config(format!("Invalid exclude pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build exclude set: {}", e)))?;

        let roots = pairs
            .iter()
            .flat_map(|pair| [pair.left.clone(), pair.right.clone()])
            .collect();
        Ok(Self { set, roots })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let relative = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        relative
            .components()
            .any(|component| self.set.is_match(component.as_os_str()))
    }
}
