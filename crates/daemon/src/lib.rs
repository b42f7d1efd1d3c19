//! Frame Average Daemon
//!
//! Background service that watches an input directory for videos, averages
//! every frame of each one into a single image, and records a report entry per
//! processed file.

pub mod average;
pub mod concurrency;
pub mod daemon;
pub mod decoder;
pub mod output;
pub mod processor;
pub mod queue;
pub mod report;
pub mod startup;
pub mod stats;
pub mod stop;
pub mod watcher;
pub mod workdir;

pub use avgframe_config as config;
pub use avgframe_config::Config;
pub use average::{average_frames, AverageError, FrameAverager};
pub use concurrency::{derive_plan, ProcessingPlan};
pub use daemon::{Daemon, DaemonError, DaemonState};
pub use decoder::{DecodeError, FfmpegDecoder, Frame, VideoDecoder, VideoInfo, VideoStream};
pub use output::{output_path_for, write_image, OutputError};
pub use processor::{average_video, process_file, ProcessError, Processor};
pub use queue::{IngestQueue, SharedQueue};
pub use report::{new_shared_report, ReportItem, ReportStore, SharedReport};
pub use startup::{run_startup_checks, StartupError};
pub use stats::{new_shared_stats, SharedStats, StatsSnapshot};
pub use stop::StopSignal;
pub use watcher::{scan_input_dir, Watcher};
pub use workdir::{rm_rf, setup_workdir, Workdir, WorkdirError};
