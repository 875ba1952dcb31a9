//! Pending-apply ledger: at most one scheduled task per target path

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

#[derive(Debug)]
struct Slot {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
struct Slots {
    by_target: HashMap<PathBuf, Slot>,
    next_generation: u64,
}

/// Target path -> currently scheduled task.
///
/// Each entry carries a generation number. A task may only execute if it
/// still holds the current generation for its key when it claims the entry,
/// so a superseded task never runs even if its abort arrived too late.
#[derive(Debug, Default)]
pub struct PendingLedger {
    slots: Mutex<Slots>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule a new task for `target`, cancelling any prior one.
    ///
    /// `spawn` receives the new generation and must return the task's abort
    /// handle. It runs under the ledger lock, so bump, spawn, insert and
    /// cancel form one step per key. Returns true if a prior task was
    /// replaced.
    pub fn replace<F>(&self, target: PathBuf, spawn: F) -> bool
    where
        F: FnOnce(u64) -> AbortHandle,
    {
        let mut slots = self.slots();
        slots.next_generation += 1;
        let generation = slots.next_generation;
        let handle = spawn(generation);

        match slots.by_target.insert(target, Slot { generation, handle }) {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Take the entry for `target` if `generation` is still current.
    pub fn claim(&self, target: &Path, generation: u64) -> bool {
        let mut slots = self.slots();
        match slots.by_target.get(target) {
            Some(slot) if slot.generation == generation => {
                slots.by_target.remove(target);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, target: &Path) -> bool {
        self.slots().by_target.contains_key(target)
    }

    /// Number of targets with a pending task
    pub fn len(&self) -> usize {
        self.slots().by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
