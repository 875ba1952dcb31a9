//! `notify`-backed watch source with one non-recursive watch per directory

use super::{DirectoryWatcher, WatchSignal, WatchSource};
use crate::types::{EventKind, RawEvent, SyncError};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tracing::{debug, info};

/// Watch source over the platform's recommended `notify` backend
pub struct NotifySource {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    watched: HashSet<PathBuf>,
}

impl NotifySource {
    /// Open the OS notification handle.
    pub fn new() -> Result<Self, SyncError> {
        let (tx, rx) = mpsc::channel();
        let watcher = notify::recommended_watcher(tx)
            .map_err(|e| SyncError::Watch(format!("Failed to create watcher: {}", e)))?;
        Ok(Self {
            watcher,
            rx,
            watched: HashSet::new(),
        })
    }

    /// Directories currently bound to a watch
    pub fn watched(&self) -> &HashSet<PathBuf> {
        &self.watched
    }

    fn translate_result(&self, result: notify::Result<Event>) -> Vec<WatchSignal> {
        match result {
            Ok(event) => translate(event, &self.watched),
            Err(e) => vec![WatchSignal::Rejected(SyncError::Watch(e.to_string()))],
        }
    }
}

impl DirectoryWatcher for NotifySource {
    fn watch(&mut self, dir: &Path) -> Result<(), SyncError> {
        if self.watched.contains(dir) {
            return Ok(());
        }
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| SyncError::Watch(format!("{}: {}", dir.display(), e)))?;
        self.watched.insert(dir.to_path_buf());
        info!("Watching {}", dir.display());
        Ok(())
    }

    fn unwatch(&mut self, dir: &Path) -> Result<(), SyncError> {
        if !self.watched.remove(dir) {
            return Ok(());
        }
        debug!("Unwatch {}", dir.display());
        // The OS usually dropped the watch already
        let _ = self.watcher.unwatch(dir);
        Ok(())
    }
}

impl WatchSource for NotifySource {
    fn next_batch(&mut self) -> Option<Vec<WatchSignal>> {
        let first = self.rx.recv().ok()?;
        let mut batch = self.translate_result(first);

        loop {
            match self.rx.try_recv() {
                Ok(result) => batch.extend(self.translate_result(result)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        Some(batch)
    }
}

/// Translate one `notify` event into watch signals.
///
/// Renames are split into Delete (old name) and an arrival at the new name.
/// A regular file that arrives by rename is a Modify, since it may have
/// replaced an existing file. Removal of a watched directory that is
/// really gone also yields `Invalidated`.
/// Access events other than close-after-write carry no change and are
/// dropped.
pub fn translate(event: Event, watched: &HashSet<PathBuf>) -> Vec<WatchSignal> {
    if event.need_rescan() {
        return vec![WatchSignal::Overflow {
            dir: event.paths.first().cloned(),
        }];
    }

    let kinds: Vec<(PathBuf, EventKind)> = match event.kind {
        notify::EventKind::Create(_) => with_kind(&event.paths, EventKind::Create),
        notify::EventKind::Remove(_) => with_kind(&event.paths, EventKind::Delete),
        notify::EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => with_kind(&event.paths, EventKind::Delete),
            RenameMode::To => event
                .paths
                .iter()
                .map(|p| (p.clone(), arrival_kind(p)))
                .collect(),
            RenameMode::Both => match event.paths.as_slice() {
                [from, to] => vec![
                    (from.clone(), EventKind::Delete),
                    (to.clone(), arrival_kind(to)),
                ],
                _ => by_existence(&event.paths),
            },
            RenameMode::Any | RenameMode::Other => by_existence(&event.paths),
        },
        notify::EventKind::Modify(_) => with_kind(&event.paths, EventKind::Modify),
        notify::EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            with_kind(&event.paths, EventKind::Modify)
        }
        notify::EventKind::Access(_) => Vec::new(),
        other => {
            return vec![WatchSignal::Rejected(SyncError::UnsupportedEventKind(format!(
                "{:?} on {:?}",
                other, event.paths
            )))]
        }
    };

    let mut signals = Vec::with_capacity(kinds.len());
    for (path, kind) in kinds {
        let gone_dir = kind == EventKind::Delete && watched.contains(&path) && !path.exists();
        if let Some(raw) = RawEvent::from_path(&path, kind) {
            signals.push(WatchSignal::Event(raw));
        }
        if gone_dir {
            signals.push(WatchSignal::Invalidated(path));
        }
    }
    signals
}

fn with_kind(paths: &[PathBuf], kind: EventKind) -> Vec<(PathBuf, EventKind)> {
    paths.iter().map(|p| (p.clone(), kind)).collect()
}

fn by_existence(paths: &[PathBuf]) -> Vec<(PathBuf, EventKind)> {
    paths
        .iter()
        .map(|p| {
            let kind = if p.exists() {
                arrival_kind(p)
            } else {
                EventKind::Delete
            };
            (p.clone(), kind)
        })
        .collect()
}

/// Kind for an entry that appeared under a new name
fn arrival_kind(path: &Path) -> EventKind {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_file() => EventKind::Modify,
        _ => EventKind::Create,
    }
}
