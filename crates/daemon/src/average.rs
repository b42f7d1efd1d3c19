//! Temporal frame averaging.
//!
//! Keeps a running per-channel sum so memory stays at one frame's worth of
//! accumulators no matter how long the video is.

use crate::decoder::{Frame, CHANNELS};
use image::RgbImage;
use thiserror::Error;

/// Error type for averaging operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AverageError {
    /// Frame dimensions differ from the averager's
    #[error("Frame is {got_width}x{got_height}, expected {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    /// Frame buffer length does not match its dimensions
    #[error("Frame has {got} bytes, expected {expected}")]
    BufferSize { expected: usize, got: usize },

    /// No frames were added
    #[error("No frames to average")]
    NoFrames,
}

/// Running mean over equal-sized RGB frames
#[derive(Debug, Clone)]
pub struct FrameAverager {
    width: u32,
    height: u32,
    // u64 holds 255 * u32::MAX frames without overflow
    sums: Vec<u64>,
    frames: u64,
}

impl FrameAverager {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sums: vec![0; Frame::byte_len(width, height)],
            frames: 0,
        }
    }

    /// Frames accumulated so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn add_frame(&mut self, frame: &Frame) -> Result<(), AverageError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(AverageError::DimensionMismatch {
                width: self.width,
                height: self.height,
                got_width: frame.width,
                got_height: frame.height,
            });
        }
        if frame.data.len() != self.sums.len() {
            return Err(AverageError::BufferSize {
                expected: self.sums.len(),
                got: frame.data.len(),
            });
        }

        for (sum, &value) in self.sums.iter_mut().zip(&frame.data) {
            *sum += u64::from(value);
        }
        self.frames += 1;
        Ok(())
    }

    /// Divide the sums, rounding to nearest, into the averaged image
    pub fn finish(self) -> Result<RgbImage, AverageError> {
        if self.frames == 0 {
            return Err(AverageError::NoFrames);
        }

        let n = self.frames;
        let pixels: Vec<u8> = self
            .sums
            .into_iter()
            .map(|sum| ((sum + n / 2) / n) as u8)
            .collect();

        let got = pixels.len();
        RgbImage::from_raw(self.width, self.height, pixels).ok_or(AverageError::BufferSize {
            expected: self.width as usize * self.height as usize * CHANNELS,
            got,
        })
    }
}

/// Average a whole sequence of frames with the dimensions of the first one
pub fn average_frames<'a, I>(frames: I) -> Result<RgbImage, AverageError>
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut frames = frames.into_iter();
    let first = frames.next().ok_or(AverageError::NoFrames)?;
    let mut averager = FrameAverager::new(first.width, first.height);
    averager.add_frame(first)?;
    for frame in frames {
        averager.add_frame(frame)?;
    }
    averager.finish()
}
