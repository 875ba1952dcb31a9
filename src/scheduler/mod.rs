//! Debounce scheduler
//!
//! Turns raw watch events into delayed applies keyed by target path. Every
//! new event for a target cancels the task pending for it, so a burst of
//! events (an editor's multi-step save, say) collapses into one apply that
//! runs after the quiet interval and reads the filesystem as it is then.

mod ledger;

pub use ledger::PendingLedger;

use crate::executor::pool::{PoolStats, WorkerPool};
use crate::registry::PathRegistry;
use crate::types::{EventKind, RawEvent, SyncError};
use crate::watch::DirectoryWatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Receiver of the applies the scheduler decides to run.
///
/// Called on a worker thread; implementations do their own error handling.
pub trait ApplyHandler: Send + Sync + 'static {
    /// Mirror a `kind` change of `source` onto `target`
    fn apply(&self, source: &Path, target: &Path, kind: EventKind);

    /// Reconcile `path` with its counterpart `symmetric` by recency
    fn resync(&self, path: &Path, symmetric: &Path);
}

#[derive(Debug, Clone)]
enum Task {
    Apply { source: PathBuf, kind: EventKind },
    Resync { path: PathBuf },
}

/// Scheduler tunables
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Quiet interval a target must see before its apply runs
    pub quiet: Duration,
    /// Register and watch directories created under a watched tree
    pub recursive: bool,
    pub workers: usize,
    pub max_concurrent: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            quiet: Duration::from_secs(2),
            recursive: true,
            workers: 4,
            max_concurrent: 64,
        }
    }
}

/// Work-coalescing scheduler keyed by target path
pub struct DebounceScheduler<H: ApplyHandler> {
    registry: Arc<PathRegistry>,
    handler: Arc<H>,
    ledger: Arc<PendingLedger>,
    pool: WorkerPool,
    options: SchedulerOptions,
}

impl<H: ApplyHandler> DebounceScheduler<H> {
    pub fn new(
        registry: Arc<PathRegistry>,
        handler: Arc<H>,
        options: SchedulerOptions,
    ) -> Result<Self, SyncError> {
        let pool = WorkerPool::new(options.workers, options.max_concurrent)?;
        Ok(Self {
            registry,
            handler,
            ledger: Arc::new(PendingLedger::new()),
            pool,
            options,
        })
    }

    /// Accept one raw event and (re)schedule the apply for its target.
    ///
    /// A created directory under a recursive watch is registered and bound
    /// to `watches` before this returns, so changes made inside it right
    /// after creation are not missed.
    ///
    /// Returns the target path the apply was scheduled for.
    pub fn on_event(
        &self,
        event: &RawEvent,
        watches: &mut dyn DirectoryWatcher,
    ) -> Result<PathBuf, SyncError> {
        let source = event.path();
        let target = self.registry.resolve(&event.dir, &event.name)?;

        if event.kind == EventKind::Create && self.options.recursive && is_real_dir(&source) {
            for dir in self.registry.register_subtree(&source)? {
                if let Err(e) = watches.watch(&dir) {
                    warn!("Failed to watch {}: {}", dir.display(), e);
                }
            }
        }

        debug!("{}: {} -> {}", event.kind, source.display(), target.display());
        self.schedule(
            target.clone(),
            Task::Apply {
                source,
                kind: event.kind,
            },
        );
        Ok(target)
    }

    /// Schedule a recency-based reconcile of `path` with its counterpart.
    pub fn schedule_resync(&self, path: &Path) -> Result<PathBuf, SyncError> {
        let target = self.registry.resolve_path(path)?;
        self.schedule(
            target.clone(),
            Task::Resync {
                path: path.to_path_buf(),
            },
        );
        Ok(target)
    }

    fn schedule(&self, target: PathBuf, task: Task) {
        let replaced = self.ledger.replace(target.clone(), |generation| {
            let ledger = Arc::clone(&self.ledger);
            let handler = Arc::clone(&self.handler);
            let key = target.clone();
            self.pool.spawn_delayed(
                self.options.quiet,
                move || ledger.claim(&key, generation),
                move || run_task(handler.as_ref(), &target, task),
            )
        });
        if replaced {
            debug!("Coalesced pending apply");
        }
    }

    /// Number of targets waiting out their quiet interval
    pub fn pending(&self) -> usize {
        self.ledger.len()
    }

    /// Block until nothing is pending or running, or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Let in-flight applies finish within `grace`, then stop the workers.
    pub fn shutdown(self, grace: Duration) -> PoolStats {
        self.pool.close_and_wait(grace)
    }
}

fn run_task<H: ApplyHandler>(handler: &H, target: &Path, task: Task) {
    match task {
        Task::Apply { source, kind } => handler.apply(&source, target, kind),
        Task::Resync { path } => handler.resync(&path, target),
    }
}

fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
