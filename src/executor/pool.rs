//! Bounded worker pool for delayed apply tasks.
//!
//! - one multi-thread tokio runtime with a fixed number of worker threads
//! - a semaphore capping how many applies execute at once
//! - apply bodies run on the blocking pool, since they are plain file I/O
//!
//! A task is spawned with a `claim` closure that is checked after the delay
//! and after a permit is acquired; a task whose claim fails was superseded
//! and exits without running its job.

use crate::types::SyncError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::error;

/// Runtime stats for the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub max_concurrent: usize,
    pub scheduled: usize,
    pub superseded: usize,
    pub executed: usize,
    pub panicked: usize,
}

/// Decrements the in-flight counter however the task ends, abort included.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Worker pool executing delayed, claimable jobs.
pub struct WorkerPool {
    runtime: Runtime,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    stats: Arc<Mutex<PoolStats>>,
}

impl WorkerPool {
    /// Create a pool with `worker_count` runtime threads and at most
    /// `max_concurrent` jobs executing at once.
    pub fn new(worker_count: usize, max_concurrent: usize) -> Result<Self, SyncError> {
        let workers = worker_count.max(1);
        let max_concurrent = max_concurrent.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(max_concurrent)
            .thread_name("twinsync-worker")
            .enable_all()
            .build()
            .map_err(SyncError::Io)?;

        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(Mutex::new(PoolStats {
                workers,
                max_concurrent,
                ..Default::default()
            })),
        })
    }

    /// Run `job` after `delay`, provided `claim` still returns true then.
    ///
    /// The returned handle aborts the task while it is waiting; once the
    /// job has started it runs to completion.
    pub fn spawn_delayed<C, F>(&self, delay: Duration, claim: C, job: F) -> AbortHandle
    where
        C: FnOnce() -> bool + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.in_flight));
        let permits = Arc::clone(&self.permits);
        let stats = Arc::clone(&self.stats);
        self.update_stats(|s| s.scheduled += 1);

        self.runtime
            .spawn(async move {
                let _guard = guard;
                tokio::time::sleep(delay).await;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };

                if !claim() {
                    lock_stats(&stats).superseded += 1;
                    return;
                }

                match tokio::task::spawn_blocking(job).await {
                    Ok(()) => lock_stats(&stats).executed += 1,
                    Err(e) => {
                        error!("Apply task failed: {}", e);
                        lock_stats(&stats).panicked += 1;
                    }
                }
            })
            .abort_handle()
    }

    /// Tasks scheduled and not yet finished, waiting ones included
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Block until no task is in flight or `timeout` elapses.
    ///
    /// Returns true when the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn stats(&self) -> PoolStats {
        lock_stats(&self.stats).clone()
    }

    /// Let running jobs finish within `grace`, then stop the runtime.
    pub fn close_and_wait(self, grace: Duration) -> PoolStats {
        self.wait_idle(grace);
        let stats = self.stats();
        self.runtime.shutdown_timeout(grace);
        stats
    }

    fn update_stats(&self, f: impl FnOnce(&mut PoolStats)) {
        f(&mut lock_stats(&self.stats));
    }
}

fn lock_stats(stats: &Mutex<PoolStats>) -> std::sync::MutexGuard<'_, PoolStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}
