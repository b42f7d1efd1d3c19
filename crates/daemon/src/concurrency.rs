//! Concurrency planning module for the frame average daemon
//!
//! Derives how many files the processor handles at once.

use crate::config::Config;

/// Upper bound for auto-derived workers; each one runs its own ffmpeg
const MAX_AUTO_WORKERS: u32 = 8;

/// Processing plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Files processed concurrently (1 = serial)
    pub workers: u32,
}

impl ProcessingPlan {
    /// Derive a plan from configuration
    ///
    /// An explicit non-zero `processor.workers` is used unchanged; zero
    /// derives one worker per four logical cores, between 1 and 8.
    pub fn derive(cfg: &Config) -> Self {
        Self::for_cores(num_cpus::get() as u32, cfg.processor.workers)
    }

    /// Plan for a known core count
    pub fn for_cores(total_cores: u32, configured_workers: u32) -> Self {
        let workers = if configured_workers > 0 {
            configured_workers
        } else {
            derive_workers(total_cores)
        };

        Self {
            total_cores,
            workers,
        }
    }

    pub fn is_serial(&self) -> bool {
        self.workers <= 1
    }
}

fn derive_workers(cores: u32) -> u32 {
    (cores / 4).clamp(1, MAX_AUTO_WORKERS)
}

/// Public function to derive a processing plan from configuration
pub fn derive_plan(cfg: &Config) -> ProcessingPlan {
    ProcessingPlan::derive(cfg)
}
