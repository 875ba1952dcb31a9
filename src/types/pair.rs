//! RootPair - Two directory trees declared as mirrors

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Two root directories kept identical.
///
/// The pair is unordered in meaning; `left`/`right` only fix which side the
/// registry stores as the forward key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootPair {
    pub left: PathBuf,
    pub right: PathBuf,
}

impl RootPair {
    pub fn new(left: impl Into<PathBuf>, right: impl Into<PathBuf>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Both roots, left first
    pub fn roots(&self) -> [&Path; 2] {
        [&self.left, &self.right]
    }
}
