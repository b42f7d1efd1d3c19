//! Video decoding capability used by the processor.
//!
//! [`VideoDecoder`] opens a file and hands back a [`VideoStream`] that reports
//! frame count and dimensions and yields RGB frames in order. The production
//! implementation, [`FfmpegDecoder`], probes metadata with `ffprobe` and pipes
//! raw `rgb24` frames out of `ffmpeg`.

use serde::Deserialize;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use thiserror::Error;

/// Bytes per pixel of a decoded frame (packed RGB)
pub const CHANNELS: usize = 3;

/// Error type for decode operations
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file could not be opened or probed
    #[error("Failed to open video: {0}")]
    Open(String),

    /// Probe output could not be understood
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// The file has no video stream
    #[error("No video stream found")]
    NoVideoStream,

    /// The decoder stopped in the middle of a frame
    #[error("Truncated frame: expected {expected} bytes, got {got}")]
    TruncatedFrame { expected: usize, got: usize },

    /// The decoder process reported a failure
    #[error("Decoder failed: {0}")]
    DecoderFailed(String),

    /// IO error while reading frames
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One decoded raster image, packed RGB, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Size in bytes of a frame with the given dimensions
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }
}

/// An opened video, exclusively owned by one processing call.
///
/// Implementations release their underlying resources on drop.
pub trait VideoStream: Send {
    /// Frame count reported by the container
    fn frame_count(&self) -> u64;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Next frame in sequence, `Ok(None)` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError>;
}

/// Capability to open video files
pub trait VideoDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoStream>, DecodeError>;
}

/// Metadata of the first video stream of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use super::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub nb_frames: Option<String>,
        pub nb_read_packets: Option<String>,
    }
}

/// Parses ffprobe JSON output for the first video stream.
///
/// `nb_frames` comes from the container header and is missing for formats such
/// as Matroska, in which case the counted packets are used instead.
pub fn parse_probe_output(json_str: &str) -> Result<VideoInfo, DecodeError> {
    let probe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| DecodeError::ParseError(e.to_string()))?;

    let stream = probe
        .streams
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or(DecodeError::NoVideoStream)?;

    let parse_count = |s: &Option<String>| s.as_deref().and_then(|v| v.trim().parse::<u64>().ok());
    let frame_count = parse_count(&stream.nb_frames)
        .filter(|&n| n > 0)
        .or_else(|| parse_count(&stream.nb_read_packets))
        .unwrap_or(0);

    Ok(VideoInfo {
        frame_count,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

/// Probes the first video stream of a file with ffprobe.
pub fn probe_video(path: &Path) -> Result<VideoInfo, DecodeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=width,height,nb_frames,nb_read_packets",
            "-print_format",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| DecodeError::Open(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DecodeError::Open(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout)
}

/// Builds the ffmpeg command that writes raw rgb24 frames to stdout.
///
/// Autorotation is disabled so frames keep the probed dimensions, and
/// timestamps are passed through so no frames are duplicated or dropped.
pub fn build_decode_command(path: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-noautorotate"]);
    cmd.arg("-i").arg(path);
    cmd.args([
        "-map",
        "0:v:0",
        "-fps_mode",
        "passthrough",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "pipe:1",
    ]);
    cmd
}

/// Decoder backed by the `ffprobe` and `ffmpeg` executables
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder;

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoStream>, DecodeError> {
        let info = probe_video(path)?;

        let mut child = build_decode_command(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DecodeError::Open(format!("failed to spawn ffmpeg: {}", e)))?;

        let stderr = child.stderr.take().map(spawn_stderr_collector);
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DecodeError::Open("ffmpeg stdout missing".to_string()));
            }
        };

        Ok(Box::new(FfmpegStream {
            info,
            child,
            stdout,
            stderr,
            finished: false,
        }))
    }
}

/// Frames streamed from a running ffmpeg process
struct FfmpegStream {
    info: VideoInfo,
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<Vec<String>>>,
    finished: bool,
}

impl FfmpegStream {
    /// Reap the process once stdout is exhausted and report its exit status
    fn finish(&mut self) -> Result<(), DecodeError> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr_lines = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        let tail = if stderr_lines.is_empty() {
            "<no ffmpeg stderr>".to_string()
        } else {
            stderr_lines.join(" | ")
        };
        Err(DecodeError::DecoderFailed(format!(
            "status={} stderr_tail={}",
            status, tail
        )))
    }
}

impl VideoStream for FfmpegStream {
    fn frame_count(&self) -> u64 {
        self.info.frame_count
    }

    fn width(&self) -> u32 {
        self.info.width
    }

    fn height(&self) -> u32 {
        self.info.height
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        let expected = Frame::byte_len(self.info.width, self.info.height);
        let mut buf = vec![0u8; expected];
        let got = read_exact_or_eof(&mut self.stdout, &mut buf)?;

        if got == 0 {
            self.finish()?;
            return Ok(None);
        }
        if got < expected {
            return Err(DecodeError::TruncatedFrame { expected, got });
        }

        Ok(Some(Frame::new(self.info.width, self.info.height, buf)))
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Fill `buf` from `r`, stopping early only at end of stream.
///
/// Returns the number of bytes read.
pub fn read_exact_or_eof(r: &mut dyn Read, buf: &mut [u8]) -> Result<usize, std::io::Error> {
    let mut got = 0usize;
    while got < buf.len() {
        let n = r.read(&mut buf[got..])?;
        if n == 0 {
            return Ok(got);
        }
        got += n;
    }
    Ok(got)
}

/// Keep the last lines of ffmpeg's stderr for error messages
fn spawn_stderr_collector(stderr: impl Read + Send + 'static) -> JoinHandle<Vec<String>> {
    std::thread::spawn(move || {
        let mut lines = VecDeque::new();
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line).unwrap_or(0);
            if read == 0 {
                break;
            }
            let cleaned = line.trim().to_string();
            if cleaned.is_empty() {
                continue;
            }
            lines.push_back(cleaned);
            if lines.len() > 20 {
                lines.pop_front();
            }
        }

        lines.into_iter().collect::<Vec<_>>()
    })
}
