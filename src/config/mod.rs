//! Configuration management

mod cli;
mod filter;

pub use cli::{parse_pair, Cli};
pub use filter::PathFilter;

use crate::resolver::RetryPolicy;
use crate::scheduler::SchedulerOptions;
use crate::types::{RootPair, SyncError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration for twinsync
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root pairs to keep mirrored
    #[serde(rename = "pair")]
    pub pairs: Vec<RootPair>,

    /// Watch directories created after startup
    pub recursive: bool,

    /// Quiet interval before a change is applied (milliseconds)
    pub debounce_ms: u64,

    /// Number of worker threads
    pub workers: usize,

    /// Upper bound on applies executing at once
    pub max_concurrent_applies: usize,

    /// Exclude patterns (globs, matched per path component)
    pub exclude: Vec<String>,

    /// Resync retry policy
    pub retry: RetryConfig,
}

/// Resync retry settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            recursive: true,
            debounce_ms: 2_000,
            workers: 4,
            max_concurrent_applies: 64,
            exclude: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        toml::from_str(text).map_err(|e| SyncError::Config(format!("Invalid config: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let text = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration and canonicalize every root.
    pub fn validate(&mut self) -> Result<(), SyncError> {
        if self.pairs.is_empty() {
            return Err(SyncError::Config(
                "At least one root pair is required".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        for pair in &mut self.pairs {
            pair.left = canonical_dir(&pair.left)?;
            pair.right = canonical_dir(&pair.right)?;
        }

        let roots: Vec<&PathBuf> = self
            .pairs
            .iter()
            .flat_map(|pair| [&pair.left, &pair.right])
            .collect();
        for (i, a) in roots.iter().enumerate() {
            for b in &roots[i + 1..] {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(SyncError::Config(format!(
                        "Roots must not overlap: {:?} and {:?}",
                        a, b
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            quiet: Duration::from_millis(self.debounce_ms),
            recursive: self.recursive,
            workers: self.workers,
            max_concurrent: self.max_concurrent_applies,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn path_filter(&self) -> Result<PathFilter, SyncError> {
        PathFilter::new(&self.exclude, &self.pairs)
    }
}

fn canonical_dir(path: &Path) -> Result<PathBuf, SyncError> {
    if !path.is_dir() {
        return Err(SyncError::Config(format!(
            "Root is not an existing directory: {:?}",
            path
        )));
    }
    path.canonicalize()
        .map_err(|e| SyncError::Config(format!("Cannot resolve root {:?}: {}", path, e)))
}
