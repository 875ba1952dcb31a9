//! Conflict resolver (resync)
//!
//! Runs after an apply failed. Looks at both sides as they are now, picks
//! the authoritative one by recency and mirrors it onto the other, retrying
//! transient failures with exponential backoff up to a fixed attempt cap.

use crate::executor::{apply_create, apply_modify, ApplyOutcome};
use crate::types::SyncError;
use std::cmp::Ordering;
use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up, the first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Which way a resync copies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncDecision {
    /// Only `from` exists
    Create { from: PathBuf, to: PathBuf },
    /// Both exist and `from` is newer
    Modify { from: PathBuf, to: PathBuf },
    /// Both exist with identical timestamps
    InSync,
    /// Neither exists
    Absent,
}

/// Decide the authoritative side of `path` and `symmetric`.
///
/// The side with the later mtime wins; equal mtimes fall back to creation
/// time with the same rule. If creation time is equal or unavailable the
/// pair is taken as already consistent.
pub fn decide(path: &Path, symmetric: &Path) -> Result<ResyncDecision, SyncError> {
    let (meta, sym_meta) = (metadata(path)?, metadata(symmetric)?);

    let newer = match (meta, sym_meta) {
        (None, None) => return Ok(ResyncDecision::Absent),
        (Some(_), None) => {
            return Ok(ResyncDecision::Create {
                from: path.to_path_buf(),
                to: symmetric.to_path_buf(),
            })
        }
        (None, Some(_)) => {
            return Ok(ResyncDecision::Create {
                from: symmetric.to_path_buf(),
                to: path.to_path_buf(),
            })
        }
        (Some(meta), Some(sym_meta)) => compare_recency(Recency::of(&meta), Recency::of(&sym_meta)),
    };

    Ok(match newer {
        Ordering::Greater => ResyncDecision::Modify {
            from: path.to_path_buf(),
            to: symmetric.to_path_buf(),
        },
        Ordering::Less => ResyncDecision::Modify {
            from: symmetric.to_path_buf(),
            to: path.to_path_buf(),
        },
        Ordering::Equal => ResyncDecision::InSync,
    })
}

/// Timestamps that order two versions of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Recency {
    modified: Option<SystemTime>,
    created: Option<SystemTime>,
}

impl Recency {
    fn of(meta: &Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            created: meta.created().ok(),
        }
    }
}

/// `Greater` when `a` is the newer side
fn compare_recency(a: Recency, b: Recency) -> Ordering {
    match timestamp_cmp(a.modified, b.modified) {
        Ordering::Equal => timestamp_cmp(a.created, b.created),
        other => other,
    }
}

fn timestamp_cmp(a: Option<SystemTime>, b: Option<SystemTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => Ordering::Equal,
    }
}

fn metadata(path: &Path) -> Result<Option<Metadata>, SyncError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::from_io(path, e)),
    }
}

/// Result of a successful resync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncOutcome {
    pub decision: ResyncDecision,
    pub applied: Option<ApplyOutcome>,
    pub attempts: u32,
}

/// Applies resync decisions under a retry policy
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    policy: RetryPolicy,
}

impl ConflictResolver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Reconcile `path` and `symmetric`, retrying transient failures.
    ///
    /// Permanent failures stop immediately. Running out of attempts yields
    /// `SyncError::ResyncExhausted`, to be escalated by the caller.
    pub fn resync(&self, path: &Path, symmetric: &Path) -> Result<ResyncOutcome, SyncError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match resync_once(path, symmetric) {
                Ok((decision, applied)) => {
                    debug!("Resync {} settled: {:?}", path.display(), decision);
                    return Ok(ResyncOutcome {
                        decision,
                        applied,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(SyncError::ResyncExhausted {
                        path: path.to_path_buf(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    })
                }
                Err(e) => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "Resync of {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        path.display(),
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

fn resync_once(
    path: &Path,
    symmetric: &Path,
) -> Result<(ResyncDecision, Option<ApplyOutcome>), SyncError> {
    let decision = decide(path, symmetric)?;
    let applied = match &decision {
        ResyncDecision::Create { from, to } => Some(apply_create(from, to)?),
        ResyncDecision::Modify { from, to } => Some(apply_modify(from, to)?),
        ResyncDecision::InSync | ResyncDecision::Absent => None,
    };
    Ok((decision, applied))
}
