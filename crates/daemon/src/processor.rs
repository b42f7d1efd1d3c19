//! Processor module for the frame average daemon
//!
//! Takes files off the ingest queue, averages their frames, writes the image
//! to the output directory and appends a report item. Undecodable files are
//! logged and skipped; nothing that happens to one file stops the loop.

use crate::average::{AverageError, FrameAverager};
use crate::concurrency::ProcessingPlan;
use crate::config::OutputFormat;
use crate::decoder::{DecodeError, VideoDecoder, VideoInfo};
use crate::output::{output_path_for, write_image, OutputError};
use crate::queue::SharedQueue;
use crate::report::{ReportItem, SharedReport};
use crate::stats::SharedStats;
use crate::stop::StopSignal;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Error type for processing one input file
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Decoder could not open or read the file
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Container reports no frames
    #[error("Video has no frames")]
    NoFrames,

    /// Container reports a zero-sized picture
    #[error("Video has empty dimensions {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },

    /// Stream ended before the reported frame count
    #[error("Stream ended after {got} of {expected} frames")]
    MissingFrames { expected: u64, got: u64 },

    /// A decoded frame did not fit the stream dimensions
    #[error("Averaging failed: {0}")]
    Average(#[from] AverageError),

    /// The decode task panicked
    #[error("Decode task aborted: {0}")]
    Aborted(String),

    /// Averaged image could not be written
    #[error("Output failed: {0}")]
    Output(#[from] OutputError),
}

impl ProcessError {
    /// Whether the failure means the input itself is unusable
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, ProcessError::Output(_))
    }
}

/// Decode every frame of `input` and average them.
///
/// Reads exactly the reported number of frames. The stream is dropped, and
/// its decoder released, on every return path.
pub fn average_video(
    decoder: &dyn VideoDecoder,
    input: &Path,
) -> Result<(VideoInfo, RgbImage), ProcessError> {
    let mut stream = decoder.open(input)?;
    let info = VideoInfo {
        frame_count: stream.frame_count(),
        width: stream.width(),
        height: stream.height(),
    };

    if info.frame_count == 0 {
        return Err(ProcessError::NoFrames);
    }
    if info.width == 0 || info.height == 0 {
        return Err(ProcessError::EmptyDimensions {
            width: info.width,
            height: info.height,
        });
    }

    let mut averager = FrameAverager::new(info.width, info.height);
    while averager.frames() < info.frame_count {
        match stream.next_frame()? {
            Some(frame) => averager.add_frame(&frame)?,
            None => {
                return Err(ProcessError::MissingFrames {
                    expected: info.frame_count,
                    got: averager.frames(),
                })
            }
        }
    }

    Ok((info, averager.finish()?))
}

/// Average `input` and write the image into `out_dir`.
///
/// The image is in place before the report item is returned.
pub fn process_file(
    decoder: &dyn VideoDecoder,
    input: &Path,
    out_dir: &Path,
    format: OutputFormat,
) -> Result<ReportItem, ProcessError> {
    let dest = output_path_for(input, out_dir, format)?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| OutputError::NoFileName(input.to_path_buf()))?;

    let (info, image) = average_video(decoder, input)?;
    info!(
        file = %filename,
        frame_count = info.frame_count,
        width = info.width,
        height = info.height,
        "Averaged video"
    );

    if dest.exists() {
        warn!(
            file = %filename,
            output = %dest.display(),
            "Output already exists; replacing it"
        );
    }
    write_image(&image, &dest, format)?;
    debug!(output = %dest.display(), "Wrote averaged image");

    Ok(ReportItem {
        filename,
        frame_count: info.frame_count,
        width: info.width,
        height: info.height,
    })
}

/// Queue consumer that turns videos into averaged images
#[derive(Clone)]
pub struct Processor {
    decoder: Arc<dyn VideoDecoder>,
    queue: SharedQueue,
    report: SharedReport,
    stats: SharedStats,
    out_dir: PathBuf,
    format: OutputFormat,
    interval: Duration,
    plan: ProcessingPlan,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        decoder: Arc<dyn VideoDecoder>,
        queue: SharedQueue,
        report: SharedReport,
        stats: SharedStats,
        out_dir: PathBuf,
        format: OutputFormat,
        interval: Duration,
        plan: ProcessingPlan,
    ) -> Self {
        Self {
            decoder,
            queue,
            report,
            stats,
            out_dir,
            format,
            interval,
            plan,
        }
    }

    /// Process one file on a blocking thread.
    ///
    /// A panic inside the decoder is caught here and reported as invalid input.
    pub async fn process(&self, input: PathBuf) -> Result<ReportItem, ProcessError> {
        let decoder = self.decoder.clone();
        let out_dir = self.out_dir.clone();
        let format = self.format;

        tokio::task::spawn_blocking(move || process_file(decoder.as_ref(), &input, &out_dir, format))
            .await
            .map_err(|e| ProcessError::Aborted(e.to_string()))?
    }

    /// Process one file and record the outcome in the report and stats.
    ///
    /// Returns the report item if the file was processed.
    pub async fn process_and_record(&self, input: PathBuf) -> Option<ReportItem> {
        let file_label = input.display().to_string();
        info!(file = %file_label, "Processing");

        let result = self.process(input).await;

        let mut stats = self.stats.write().await;
        stats.queue_len = self.queue.pending_len();
        match result {
            Ok(item) => {
                self.report.add(item.clone());
                stats.processed += 1;
                Some(item)
            }
            Err(e) if e.is_invalid_input() => {
                warn!(file = %file_label, error = %e, "Skipping invalid video");
                stats.invalid += 1;
                None
            }
            Err(e) => {
                error!(file = %file_label, error = %e, "Failed to write output");
                stats.output_failures += 1;
                None
            }
        }
    }

    /// Run until `stop` is set, then finish any in-flight files
    pub async fn run(self, stop: StopSignal) {
        info!(
            out_dir = %self.out_dir.display(),
            workers = self.plan.workers,
            cores = self.plan.total_cores,
            interval_ms = self.interval.as_millis() as u64,
            "Processor started"
        );

        if self.plan.is_serial() {
            self.run_serial(&stop).await;
        } else {
            self.run_pool(&stop).await;
        }

        info!("Processor stopped");
    }

    async fn run_serial(&self, stop: &StopSignal) {
        while !stop.is_set() {
            match self.queue.dequeue() {
                Some(input) => {
                    self.process_and_record(input).await;
                }
                None => {
                    if stop.sleep(self.interval).await {
                        break;
                    }
                }
            }
        }
    }

    /// Up to `plan.workers` files at once. Each file's output and report
    /// entry are still written together by its own task.
    async fn run_pool(&self, stop: &StopSignal) {
        let workers = self.plan.workers as usize;
        let permits = Arc::new(Semaphore::new(workers));

        while !stop.is_set() {
            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = stop.wait() => break,
            };

            match self.queue.dequeue() {
                Some(input) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.process_and_record(input).await;
                        drop(permit);
                    });
                }
                None => {
                    drop(permit);
                    if stop.sleep(self.interval).await {
                        break;
                    }
                }
            }
        }

        // Draining: every in-flight task returns its permit when done
        let _ = permits.acquire_many(workers as u32).await;
    }
}
