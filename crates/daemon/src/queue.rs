//! Ingest queue shared by the watcher and the processor.
//!
//! Holds the set of every path ever discovered together with the FIFO of
//! paths still waiting to be processed. Both live behind a single mutex so a
//! path enters `seen` and `pending` in one step, exactly once.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct QueueState {
    /// Every path ever enqueued; never shrinks
    seen: HashSet<PathBuf>,
    /// Paths waiting for the processor, oldest first
    pending: VecDeque<PathBuf>,
}

/// Deduplicating FIFO of discovered input files
#[derive(Debug, Default)]
pub struct IngestQueue {
    state: Mutex<QueueState>,
}

/// Shared queue handle for concurrent access across daemon components
pub type SharedQueue = Arc<IngestQueue>;

impl IngestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave seen/pending out of step
    // (each mutation is a single insert/push), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue `path` unless it has been seen before.
    ///
    /// Returns `true` if the path was new and is now pending.
    pub fn enqueue(&self, path: PathBuf) -> bool {
        let mut state = self.lock();
        if !state.seen.insert(path.clone()) {
            return false;
        }
        state.pending.push_back(path);
        true
    }

    /// Remove and return the oldest pending path
    pub fn dequeue(&self) -> Option<PathBuf> {
        self.lock().pending.pop_front()
    }

    /// Whether `path` has ever been enqueued
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().seen.contains(path)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn seen_len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }
}
