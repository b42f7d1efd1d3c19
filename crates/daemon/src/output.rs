//! Output naming and writing for averaged images.
//!
//! Images are encoded into a hidden temporary file next to the destination and
//! then renamed into place, so the output directory never shows a partially
//! written image.

use crate::config::OutputFormat;
use image::{ImageFormat, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while writing an output image.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Input path has no usable file stem
    #[error("Input path has no file name: {0}")]
    NoFileName(PathBuf),

    /// Image encoding failed
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    /// Failed to move the encoded file into place
    #[error("Failed to move output into place: {0}")]
    Rename(std::io::Error),
}

fn image_format(format: OutputFormat) -> ImageFormat {
    match format {
        OutputFormat::Jpeg => ImageFormat::Jpeg,
        OutputFormat::Png => ImageFormat::Png,
    }
}

/// Output path for an input file: same stem, image extension, in `out_dir`.
///
/// For example: `/wrk/in/earth.mp4` -> `/wrk/out/earth.jpeg`
pub fn output_path_for(
    input: &Path,
    out_dir: &Path,
    format: OutputFormat,
) -> Result<PathBuf, OutputError> {
    let stem = input
        .file_stem()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OutputError::NoFileName(input.to_path_buf()))?;

    let mut name = stem.to_owned();
    name.push(".");
    name.push(format.extension());
    Ok(out_dir.join(name))
}

/// Temporary sibling path used while encoding.
///
/// The leading dot keeps it out of directory listings that skip hidden files.
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
}

/// Encode `image` and atomically place it at `dest`.
///
/// Any existing file at `dest` is replaced. On failure the temporary file is
/// removed and `dest` is left untouched.
pub fn write_image(image: &RgbImage, dest: &Path, format: OutputFormat) -> Result<(), OutputError> {
    let temp = temp_path_for(dest);

    if let Err(e) = image.save_with_format(&temp, image_format(format)) {
        let _ = fs::remove_file(&temp);
        return Err(OutputError::Encode(e));
    }

    if let Err(e) = fs::rename(&temp, dest) {
        let _ = fs::remove_file(&temp);
        return Err(OutputError::Rename(e));
    }

    Ok(())
}
