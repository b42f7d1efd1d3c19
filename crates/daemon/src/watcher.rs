//! Watcher module for discovering video files in the input directory.
//!
//! Each tick lists the input directory, sorted by file name, and enqueues
//! every file not seen before. Listing is read-only; a failed listing skips
//! the tick and is retried on the next one.

use crate::queue::SharedQueue;
use crate::stats::SharedStats;
use crate::stop::StopSignal;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Lists the files directly inside `dir`, sorted by name.
///
/// Symlinks count when they resolve to a file; dangling links and
/// directories are skipped.
pub fn scan_input_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() || !entry.path().is_file() {
            continue;
        }
        files.push(entry.into_path());
    }

    Ok(files)
}

/// Polls the input directory and feeds the ingest queue
#[derive(Debug, Clone)]
pub struct Watcher {
    in_dir: PathBuf,
    queue: SharedQueue,
    stats: SharedStats,
    interval: Duration,
}

impl Watcher {
    pub fn new(in_dir: PathBuf, queue: SharedQueue, stats: SharedStats, interval: Duration) -> Self {
        Self {
            in_dir,
            queue,
            stats,
            interval,
        }
    }

    /// Scan once and enqueue new files in name order.
    ///
    /// Returns how many files were newly enqueued.
    pub fn tick(&self) -> io::Result<usize> {
        let mut added = 0;
        for path in scan_input_dir(&self.in_dir)? {
            if self.queue.enqueue(path.clone()) {
                debug!(path = %path.display(), "Discovered file");
                added += 1;
            }
        }
        Ok(added)
    }

    /// Run until `stop` is set
    pub async fn run(self, stop: StopSignal) {
        info!(dir = %self.in_dir.display(), interval_ms = self.interval.as_millis() as u64, "Watcher started");

        while !stop.is_set() {
            debug!("Scanning...");
            match self.tick() {
                Ok(added) => {
                    let mut stats = self.stats.write().await;
                    stats.discovered += added as u64;
                    stats.queue_len = self.queue.pending_len();
                    if added > 0 {
                        info!(added, queued = stats.queue_len, "Queued new files");
                    }
                }
                Err(e) => {
                    warn!(dir = %self.in_dir.display(), error = %e, "Failed to list input directory; retrying next tick");
                    self.stats.write().await.listing_errors += 1;
                }
            }

            if stop.sleep(self.interval).await {
                break;
            }
        }

        info!("Watcher stopped");
    }
}
