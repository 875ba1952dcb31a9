//! Executor module for file operations

mod apply;
mod compare;
pub mod copy;
pub mod pool;

pub use apply::{
    apply_change, apply_create, apply_delete, apply_modify, deletion_order, ApplyOutcome,
    SkipReason,
};
pub use compare::contents_equal;
pub use copy::{copy_file_atomic, part_path, CopyMode, PART_SUFFIX};

use crate::resolver::ConflictResolver;
use crate::scheduler::ApplyHandler;
use crate::types::{EventKind, SyncError};
use indicatif::HumanBytes;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Apply/resync statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Applies that changed the target
    pub applied: usize,
    /// Applies that found nothing to do
    pub skipped: usize,
    /// Applies that failed and were handed to resync
    pub failed: usize,
    /// Resyncs that settled
    pub resynced: usize,
    /// Resyncs that gave up or hit a permanent error
    pub escalated: usize,
    /// Aggregate bytes written to targets
    pub bytes_copied: u64,
}

/// Production apply handler: run the change, fall back to resync on failure.
#[derive(Debug, Default)]
pub struct Mirror {
    resolver: ConflictResolver,
    stats: Mutex<ExecutionStats>,
}

impl Mirror {
    pub fn new(resolver: ConflictResolver) -> Self {
        Self {
            resolver,
            stats: Mutex::new(ExecutionStats::default()),
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, f: impl FnOnce(&mut ExecutionStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn record_outcome(&self, outcome: &ApplyOutcome) {
        self.record(|stats| {
            if outcome.is_skip() {
                stats.skipped += 1;
            } else {
                stats.applied += 1;
                stats.bytes_copied += outcome.bytes_copied();
            }
        });
    }
}

impl ApplyHandler for Mirror {
    fn apply(&self, source: &Path, target: &Path, kind: EventKind) {
        match apply_change(source, target, kind) {
            Ok(outcome) => {
                log_outcome(kind, target, &outcome);
                self.record_outcome(&outcome);
            }
            Err(e) => {
                warn!(
                    "{} {} -> {} failed: {}. Resyncing",
                    kind,
                    source.display(),
                    target.display(),
                    e
                );
                self.record(|stats| stats.failed += 1);
                self.resync(source, target);
            }
        }
    }

    fn resync(&self, path: &Path, symmetric: &Path) {
        match self.resolver.resync(path, symmetric) {
            Ok(outcome) => {
                if let Some(applied) = &outcome.applied {
                    self.record_outcome(applied);
                }
                self.record(|stats| stats.resynced += 1);
                debug!(
                    "Resynced {} after {} attempt(s)",
                    path.display(),
                    outcome.attempts
                );
            }
            Err(e) => {
                self.record(|stats| stats.escalated += 1);
                escalate(path, &e);
            }
        }
    }
}

fn log_outcome(kind: EventKind, target: &Path, outcome: &ApplyOutcome) {
    match outcome {
        ApplyOutcome::Skipped(reason) => {
            debug!("{} {}: skipped ({:?})", kind, target.display(), reason)
        }
        ApplyOutcome::CreatedFile { bytes } | ApplyOutcome::Modified { bytes } => {
            info!("{} {} ({})", kind, target.display(), HumanBytes(*bytes))
        }
        ApplyOutcome::Deleted { entries } => {
            info!("{} {} ({} entries)", kind, target.display(), entries)
        }
        ApplyOutcome::CreatedDir | ApplyOutcome::CreatedSymlink => {
            info!("{} {}", kind, target.display())
        }
    }
}

fn escalate(path: &Path, e: &SyncError) {
    error!("Giving up on {}: {}", path.display(), e);
}
