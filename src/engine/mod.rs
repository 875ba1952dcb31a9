//! Sync engine: startup registration and the event-draining loop
//!
//! The loop owns the watch source. It only resolves, filters and hands
//! events to the scheduler; every filesystem mutation happens on the
//! scheduler's workers.

use crate::config::{Config, PathFilter};
use crate::executor::pool::PoolStats;
use crate::registry::{merge_join, PathRegistry};
use crate::scheduler::{ApplyHandler, DebounceScheduler};
use crate::types::{RawEvent, RootPair, SyncError};
use crate::watch::{WatchSignal, WatchSource};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counters collected by the drain loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSummary {
    /// Events handed to the scheduler
    pub events: usize,
    /// Events dropped by exclude patterns
    pub excluded: usize,
    /// Overflow signals handled by a re-walk
    pub overflows: usize,
    /// Directories whose watch became invalid
    pub invalidated: usize,
    /// Registry invariant violations
    pub mismatches: usize,
    /// Notifications the source could not translate
    pub rejected: usize,
}

pub struct Engine<S: WatchSource, H: ApplyHandler> {
    pairs: Vec<RootPair>,
    recursive: bool,
    registry: Arc<PathRegistry>,
    scheduler: DebounceScheduler<H>,
    source: S,
    filter: PathFilter,
    live_roots: HashSet<PathBuf>,
    summary: EngineSummary,
}

impl<S: WatchSource, H: ApplyHandler> Engine<S, H> {
    /// Register every root pair and bind its watches.
    ///
    /// Completes before any event is consumed, so nothing that happens
    /// after `start` returns can be missed. Failing to watch a root aborts
    /// startup; failing to watch a subdirectory is logged.
    pub fn start(config: &Config, mut source: S, handler: Arc<H>) -> Result<Self, SyncError> {
        let registry = Arc::new(PathRegistry::new());
        let filter = config.path_filter()?;
        let mut live_roots = HashSet::new();

        for pair in &config.pairs {
            let existing = registry.register(&pair.left, &pair.right);
            for root in pair.roots() {
                source.watch(root)?;
                live_roots.insert(root.to_path_buf());
            }
            if config.recursive {
                for dir in existing.iter().filter(|dir| !filter.is_excluded(dir)) {
                    if let Err(e) = source.watch(dir) {
                        warn!("Failed to watch {}: {}", dir.display(), e);
                    }
                }
            }
        }
        info!(
            "Registered {} root pair(s), {} directory pairing(s)",
            config.pairs.len(),
            registry.len()
        );

        let scheduler =
            DebounceScheduler::new(Arc::clone(&registry), handler, config.scheduler_options())?;

        Ok(Self {
            pairs: config.pairs.clone(),
            recursive: config.recursive,
            registry,
            scheduler,
            source,
            filter,
            live_roots,
            summary: EngineSummary::default(),
        })
    }

    /// Drain the watch source until every root's watch is invalid or the
    /// source closes.
    pub fn run(&mut self) -> EngineSummary {
        while !self.live_roots.is_empty() {
            let Some(batch) = self.source.next_batch() else {
                info!("Watch source closed");
                break;
            };
            for signal in batch {
                self.handle(signal);
            }
        }
        if self.live_roots.is_empty() {
            info!("No root is watchable any more; stopping");
        }
        self.summary.clone()
    }

    /// Process one signal from the watch source.
    pub fn handle(&mut self, signal: WatchSignal) {
        match signal {
            WatchSignal::Event(event) => self.dispatch(event),
            WatchSignal::Overflow { dir } => self.rescan(dir.as_deref()),
            WatchSignal::Invalidated(dir) => self.invalidate(&dir),
            WatchSignal::Rejected(e) => {
                self.summary.rejected += 1;
                warn!("Rejected notification: {}", e);
            }
        }
    }

    fn dispatch(&mut self, event: RawEvent) {
        let path = event.path();
        if self.live_roots.contains(&path) {
            // A root reported by its own watch; never mirrored
            debug!("{} on root {}", event.kind, path.display());
            return;
        }
        if self.filter.is_excluded(&path) {
            self.summary.excluded += 1;
            return;
        }
        self.summary.events += 1;
        if let Err(e) = self.scheduler.on_event(&event, &mut self.source) {
            self.report(e);
        }
    }

    /// Recover from dropped notifications.
    ///
    /// The affected pairing is walked again (every pair when the directory
    /// is unknown) and every entry on either side of the affected
    /// directories gets a resync.
    fn rescan(&mut self, dir: Option<&Path>) {
        self.summary.overflows += 1;
        let dirs = match dir {
            Some(dir) => {
                self.rewalk(dir);
                vec![dir.to_path_buf()]
            }
            None => {
                let roots: Vec<PathBuf> = self.pairs.iter().map(|p| p.left.clone()).collect();
                for root in &roots {
                    self.rewalk(root);
                }
                self.registry.left_directories()
            }
        };
        warn!(
            "Notifications were dropped; resyncing {} director(ies)",
            dirs.len()
        );

        for dir in dirs {
            self.resync_entries(&dir);
        }
    }

    fn rewalk(&mut self, dir: &Path) {
        let existing = match self.registry.refresh(dir) {
            Ok(existing) => existing,
            Err(e) => return self.report(e),
        };
        if !self.recursive {
            return;
        }
        for dir in &existing {
            if self.filter.is_excluded(dir) {
                continue;
            }
            if let Err(e) = self.source.watch(dir) {
                warn!("Failed to watch {}: {}", dir.display(), e);
            }
        }
    }

    fn resync_entries(&mut self, dir: &Path) {
        let symmetric = match self.registry.symmetric_of(dir) {
            Ok(symmetric) => symmetric,
            Err(e) => return self.report(e),
        };
        for name in merge_join(&entry_names(dir), &entry_names(&symmetric)) {
            let path = dir.join(&name);
            if self.filter.is_excluded(&path) {
                continue;
            }
            if let Err(e) = self.scheduler.schedule_resync(&path) {
                self.report(e);
            }
        }
    }

    fn invalidate(&mut self, dir: &Path) {
        self.summary.invalidated += 1;
        let removed = self.registry.unregister(dir);
        self.release_watch(dir);
        // Counterparts lose their pairing too; a watch left on them would
        // report the mirrored delete against an unknown directory
        for (own, counterpart) in &removed {
            for path in [own, counterpart] {
                if !self.live_roots.contains(path.as_path()) {
                    self.release_watch(path);
                }
            }
        }

        if self.live_roots.remove(dir) {
            warn!("Root {} is no longer watchable", dir.display());
        } else {
            debug!(
                "Watch on {} invalid, {} pairing(s) dropped",
                dir.display(),
                removed.len()
            );
        }
    }

    fn release_watch(&mut self, dir: &Path) {
        if let Err(e) = self.source.unwatch(dir) {
            debug!("Unwatch {} failed: {}", dir.display(), e);
        }
    }

    fn report(&mut self, e: SyncError) {
        if e.is_invariant_violation() {
            self.summary.mismatches += 1;
            error!("Registry out of step with watches: {}", e);
        } else {
            warn!("Event dropped: {}", e);
        }
    }

    /// Block until no apply is pending or running, or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.scheduler.wait_idle(timeout)
    }

    pub fn registry(&self) -> &Arc<PathRegistry> {
        &self.registry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn summary(&self) -> &EngineSummary {
        &self.summary
    }

    /// Stop the workers, letting in-flight applies finish within `grace`.
    pub fn shutdown(self, grace: Duration) -> PoolStats {
        self.scheduler.shutdown(grace)
    }
}

/// Sorted names of every entry in `dir`; a missing directory has none.
fn entry_names(dir: &Path) -> Vec<OsString> {
    let mut names: Vec<OsString> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.file_name()))
            .collect(),
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            Vec::new()
        }
    };
    names.sort();
    names
}
