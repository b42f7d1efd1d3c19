//! Report module for the frame average daemon
//!
//! Append-only record of successfully processed files, readable by external
//! observers while the pipeline runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// One successfully processed input file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportItem {
    /// Base name of the input file (e.g. `earth.mp4`)
    pub filename: String,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

/// Thread-safe append-only collection of report items.
///
/// Items are kept in insertion order, which is processing completion order.
#[derive(Debug)]
pub struct ReportStore {
    items: RwLock<Vec<ReportItem>>,
    count_tx: watch::Sender<usize>,
}

/// Shared report handle for concurrent access across daemon components
pub type SharedReport = Arc<ReportStore>;

pub fn new_shared_report() -> SharedReport {
    Arc::new(ReportStore::new())
}

impl ReportStore {
    pub fn new() -> Self {
        let (count_tx, _rx) = watch::channel(0);
        Self {
            items: RwLock::new(Vec::new()),
            count_tx,
        }
    }

    /// Append an item and wake anyone waiting on the count
    pub fn add(&self, item: ReportItem) {
        let mut items = self.items.write().unwrap_or_else(|p| p.into_inner());
        items.push(item);
        // Published under the write lock so counts are seen in append order
        self.count_tx.send_replace(items.len());
    }

    pub fn count(&self) -> usize {
        self.items.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Copy of all items in insertion order
    pub fn snapshot(&self) -> Vec<ReportItem> {
        self.items.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Wait until at least `n` items have been added.
    ///
    /// Returns the snapshot at that point, or `None` if `timeout` elapses first.
    pub async fn wait_for_count(&self, n: usize, timeout: Duration) -> Option<Vec<ReportItem>> {
        let mut rx = self.count_tx.subscribe();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|count| *count >= n))
            .await
            .map_or(false, |r| r.is_ok());
        // The watch guard is released above; `add` takes the locks in the other order
        reached.then(|| self.snapshot())
    }

    /// Write the current snapshot as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<(), io::Error> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}

impl Default for ReportStore {
    fn default() -> Self {
        Self::new()
    }
}
