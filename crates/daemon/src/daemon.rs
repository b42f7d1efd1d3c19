//! Daemon startup and lifecycle for the frame average daemon
//!
//! The daemon owns the stop signal, starts the watcher and processor as
//! independent tasks, and on shutdown waits for both to finish their current
//! unit of work.

use crate::concurrency::{derive_plan, ProcessingPlan};
use crate::config::Config;
use crate::decoder::{FfmpegDecoder, VideoDecoder};
use crate::processor::Processor;
use crate::queue::{IngestQueue, SharedQueue};
use crate::report::{new_shared_report, SharedReport};
use crate::startup::{run_startup_checks, StartupError};
use crate::stats::{new_shared_stats, SharedStats};
use crate::stop::StopSignal;
use crate::watcher::Watcher;
use crate::workdir::{setup_workdir, Workdir, WorkdirError};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Working directories could not be prepared
    #[error("Workdir setup failed: {0}")]
    Workdir(#[from] WorkdirError),

    /// `start` called on a daemon that is not idle
    #[error("Daemon was already started")]
    AlreadyStarted,

    /// `join` called on a daemon that was never started
    #[error("Daemon is not running")]
    NotRunning,

    /// A worker task panicked
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Lifecycle of a daemon. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Input and output directories
    pub workdir: Workdir,
    /// Derived processing plan
    pub plan: ProcessingPlan,
    decoder: Arc<dyn VideoDecoder>,
    queue: SharedQueue,
    report: SharedReport,
    stats: SharedStats,
    stop: StopSignal,
    state: DaemonState,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Daemon {
    /// Initialize the daemon with the ffmpeg decoder
    ///
    /// This performs the full startup sequence:
    /// 1. Run startup checks (ffmpeg, ffprobe)
    /// 2. Create the working directories
    /// 3. Derive the processing plan
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks()?;
        Self::new_without_checks(config)
    }

    /// Initialize the daemon without running startup checks
    ///
    /// Useful for testing when ffmpeg is not available.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        let workdir = setup_workdir(&config.workdir.root, config.workdir.clean)?;
        Ok(Self::with_decoder(config, workdir, Arc::new(FfmpegDecoder::new())))
    }

    /// Assemble a daemon from prepared parts
    pub fn with_decoder(config: Config, workdir: Workdir, decoder: Arc<dyn VideoDecoder>) -> Self {
        let plan = derive_plan(&config);
        Self {
            config,
            workdir,
            plan,
            decoder,
            queue: Arc::new(IngestQueue::new()),
            report: new_shared_report(),
            stats: new_shared_stats(),
            stop: StopSignal::new(),
            state: DaemonState::Idle,
            workers: Vec::new(),
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Report of processed files, readable while the daemon runs
    pub fn report(&self) -> SharedReport {
        self.report.clone()
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    pub fn queue(&self) -> SharedQueue {
        self.queue.clone()
    }

    /// Handle that can request shutdown from anywhere
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Spawn the watcher and processor tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), DaemonError> {
        if self.state != DaemonState::Idle {
            return Err(DaemonError::AlreadyStarted);
        }

        let watcher = Watcher::new(
            self.workdir.in_dir.clone(),
            self.queue.clone(),
            self.stats.clone(),
            self.config.watcher.interval(),
        );
        let processor = Processor::new(
            self.decoder.clone(),
            self.queue.clone(),
            self.report.clone(),
            self.stats.clone(),
            self.workdir.out_dir.clone(),
            self.config.processor.image_format,
            self.config.processor.interval(),
            self.plan.clone(),
        );

        self.workers.push(("watcher", tokio::spawn(watcher.run(self.stop.clone()))));
        self.workers.push(("processor", tokio::spawn(processor.run(self.stop.clone()))));
        self.state = DaemonState::Running;

        info!(
            in_dir = %self.workdir.in_dir.display(),
            out_dir = %self.workdir.out_dir.display(),
            "Daemon started"
        );
        Ok(())
    }

    /// Request shutdown. Workers stop at their next item boundary.
    pub fn stop(&self) {
        self.stop.set();
    }

    /// Wait for the stop signal, then for both workers to finish
    pub async fn join(&mut self) -> Result<(), DaemonError> {
        match self.state {
            DaemonState::Idle => return Err(DaemonError::NotRunning),
            DaemonState::Stopped => return Ok(()),
            DaemonState::Running | DaemonState::Draining => {}
        }

        self.stop.wait().await;
        self.state = DaemonState::Draining;
        info!("Draining workers");

        let mut failure = None;
        for (name, handle) in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(worker = name, error = %e, "Worker task failed");
                failure.get_or_insert_with(|| format!("{}: {}", name, e));
            }
        }

        self.state = DaemonState::Stopped;
        let stats = self.stats.read().await.clone();
        info!(%stats, "Daemon stopped");

        match failure {
            Some(msg) => Err(DaemonError::Worker(msg)),
            None => Ok(()),
        }
    }

    /// Stop and wait for full shutdown
    pub async fn shutdown(&mut self) -> Result<(), DaemonError> {
        self.stop();
        self.join().await
    }

    /// Run until Ctrl-C or until the stop signal is set elsewhere
    pub async fn run_until_ctrl_c(&mut self) -> Result<(), DaemonError> {
        if self.state == DaemonState::Idle {
            self.start()?;
        }

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Interrupt received, shutting down");
            }
            _ = self.stop.wait() => {}
        }

        self.shutdown().await
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        // Detached workers must not outlive their owner
        self.stop.set();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProcessorConfig, WatcherConfig, WorkdirConfig};
    use crate::decoder::{DecodeError, VideoStream};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NeverOpens;

    impl VideoDecoder for NeverOpens {
        fn open(&self, _path: &Path) -> Result<Box<dyn VideoStream>, DecodeError> {
            Err(DecodeError::Open("unsupported".to_string()))
        }
    }

    fn create_test_config(root: &Path) -> Config {
        Config {
            workdir: WorkdirConfig {
                root: root.to_path_buf(),
                clean: false,
            },
            watcher: WatcherConfig { interval_ms: 10 },
            processor: ProcessorConfig {
                interval_ms: 10,
                ..ProcessorConfig::default()
            },
        }
    }

    fn test_daemon(temp_dir: &TempDir) -> Daemon {
        let config = create_test_config(temp_dir.path());
        let workdir = setup_workdir(temp_dir.path(), false).unwrap();
        Daemon::with_decoder(config, workdir, Arc::new(NeverOpens))
    }

    #[test]
    fn test_daemon_initialization_without_checks() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir.path().join("wrk"));

        let daemon = Daemon::new_without_checks(config.clone()).unwrap();

        assert_eq!(daemon.config, config);
        assert_eq!(daemon.plan.workers, 1);
        assert!(daemon.plan.total_cores >= 1);
        assert_eq!(daemon.state(), DaemonState::Idle);
        assert!(daemon.workdir.in_dir.is_dir());
        assert!(daemon.workdir.out_dir.is_dir());
    }

    #[test]
    fn test_daemon_workdir_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("wrk");
        std::fs::write(&root, b"not a directory").unwrap();

        let result = Daemon::new_without_checks(create_test_config(&root));
        assert!(matches!(result, Err(DaemonError::Workdir(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let temp_dir = TempDir::new().unwrap();
        let mut daemon = test_daemon(&temp_dir);

        assert!(matches!(daemon.join().await, Err(DaemonError::NotRunning)));

        daemon.start().unwrap();
        assert_eq!(daemon.state(), DaemonState::Running);
        assert!(matches!(daemon.start(), Err(DaemonError::AlreadyStarted)));

        tokio::time::timeout(Duration::from_secs(5), daemon.shutdown())
            .await
            .expect("shutdown should be bounded")
            .unwrap();
        assert_eq!(daemon.state(), DaemonState::Stopped);

        // Terminal: no restart
        assert!(matches!(daemon.start(), Err(DaemonError::AlreadyStarted)));
        assert!(daemon.join().await.is_ok());
    }

    #[tokio::test]
    async fn test_join_waits_for_external_stop() {
        let temp_dir = TempDir::new().unwrap();
        let mut daemon = test_daemon(&temp_dir);
        daemon.start().unwrap();

        let stop = daemon.stop_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stop.set();
        });

        tokio::time::timeout(Duration::from_secs(5), daemon.join())
            .await
            .expect("join should return after stop")
            .unwrap();
        assert_eq!(daemon.state(), DaemonState::Stopped);
    }

    #[tokio::test]
    async fn test_run_until_ctrl_c_returns_on_stop_signal() {
        let temp_dir = TempDir::new().unwrap();
        let mut daemon = test_daemon(&temp_dir);
        let stop = daemon.stop_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stop.set();
        });

        tokio::time::timeout(Duration::from_secs(5), daemon.run_until_ctrl_c())
            .await
            .expect("run should end on stop")
            .unwrap();
        assert_eq!(daemon.state(), DaemonState::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_files_are_counted_not_reported() {
        let temp_dir = TempDir::new().unwrap();
        let mut daemon = test_daemon(&temp_dir);
        std::fs::write(daemon.workdir.in_dir.join("bad.mp4"), b"garbage").unwrap();

        daemon.start().unwrap();
        for _ in 0..200 {
            if daemon.stats().read().await.invalid == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        daemon.shutdown().await.unwrap();

        assert_eq!(daemon.stats().read().await.invalid, 1);
        assert_eq!(daemon.report().count(), 0);
    }
}
