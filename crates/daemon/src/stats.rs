//! Pipeline counters for the frame average daemon
//!
//! Updated by the watcher and processor, logged by the CLI at shutdown.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Snapshot of pipeline activity since startup
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Files enqueued by the watcher
    pub discovered: u64,
    /// Files averaged and reported
    pub processed: u64,
    /// Files skipped as undecodable
    pub invalid: u64,
    /// Files decoded but whose image could not be written
    pub output_failures: u64,
    /// Watcher ticks skipped because the input directory could not be listed
    pub listing_errors: u64,
    /// Files waiting in the queue at last update
    pub queue_len: usize,
}

/// Shared stats state for concurrent access across daemon components
pub type SharedStats = Arc<RwLock<StatsSnapshot>>;

pub fn new_shared_stats() -> SharedStats {
    Arc::new(RwLock::new(StatsSnapshot::default()))
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "discovered={} processed={} invalid={} output_failures={} listing_errors={} queued={}",
            self.discovered,
            self.processed,
            self.invalid,
            self.output_failures,
            self.listing_errors,
            self.queue_len
        )
    }
}
