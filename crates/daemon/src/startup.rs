//! Startup checks module for the frame average daemon
//!
//! Verifies that the external decoding tools are usable before the pipeline
//! starts:
//! - `ffprobe` is runnable
//! - `ffmpeg` is runnable and new enough for `-fps_mode`

use std::process::Command;
use thiserror::Error;

/// Oldest ffmpeg major version supporting every flag the decoder passes
pub const MIN_FFMPEG_MAJOR: u32 = 5;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available: {reason}")]
    ToolUnavailable { tool: &'static str, reason: String },

    #[error("{tool} version requirement not met: {reason}")]
    ToolVersion { tool: &'static str, reason: String },
}

/// Parse a `-version` banner and extract the major version number
///
/// Handles various version formats:
/// - Standard: "ffmpeg version 6.1 ..."
/// - N-prefixed: "ffprobe version n7.0-... ..."
///
/// Returns `None` for git snapshot builds ("N-113000-g...") and unknown output.
pub fn parse_tool_version(version_output: &str, tool: &str) -> Option<u32> {
    let marker = format!("{} version", tool.to_lowercase());

    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains(&marker))?;

    let version_part = version_line
        .to_lowercase()
        .split(marker.as_str())
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');

    let major_str = version_str.split(['.', '-']).next()?;

    major_str.parse().ok()
}

/// Run `<tool> -version` and return its major version, if parseable
fn tool_major_version(tool: &'static str) -> Result<Option<u32>, StartupError> {
    let output = Command::new(tool)
        .arg("-version")
        .output()
        .map_err(|e| StartupError::ToolUnavailable {
            tool,
            reason: format!("failed to run {} -version; is it in PATH? Error: {}", tool, e),
        })?;

    if !output.status.success() {
        return Err(StartupError::ToolUnavailable {
            tool,
            reason: format!("{} -version exited with {}", tool, output.status),
        });
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    Ok(parse_tool_version(&version_output, tool))
}

/// Check that a tool's major version is acceptable
///
/// Unparseable versions (git snapshots) are accepted.
pub fn check_minimum_version(
    tool: &'static str,
    major: Option<u32>,
    minimum: u32,
) -> Result<(), StartupError> {
    match major {
        Some(found) if found < minimum => Err(StartupError::ToolVersion {
            tool,
            reason: format!("{}.x or newer required, got: {}", minimum, found),
        }),
        _ => Ok(()),
    }
}

/// Check that ffprobe is available
pub fn check_ffprobe_available() -> Result<(), StartupError> {
    tool_major_version("ffprobe").map(|_| ())
}

/// Check that ffmpeg is available and new enough
pub fn check_ffmpeg_version() -> Result<(), StartupError> {
    let major = tool_major_version("ffmpeg")?;
    check_minimum_version("ffmpeg", major, MIN_FFMPEG_MAJOR)
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. ffprobe availability
/// 2. ffmpeg availability and version
pub fn run_startup_checks() -> Result<(), StartupError> {
    check_ffprobe_available()?;
    check_ffmpeg_version()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_version_parsing_standard(
            major in 1u32..20,
            minor in 0u32..10,
            patch in 0u32..10,
            probe in proptest::bool::ANY,
        ) {
            let tool = if probe { "ffprobe" } else { "ffmpeg" };
            let version_output = format!(
                "{} version {}.{}.{} Copyright (c) 2007-2024 the FFmpeg developers",
                tool, major, minor, patch
            );

            prop_assert_eq!(parse_tool_version(&version_output, tool), Some(major));
        }

        #[test]
        fn prop_version_parsing_n_prefixed(
            major in 1u32..20,
            minor in 0u32..10,
            git_hash in "[a-f0-9]{7}",
        ) {
            let version_output = format!(
                "ffmpeg version n{}.{}-123-g{} Copyright (c) 2000-2024",
                major, minor, git_hash
            );

            prop_assert_eq!(parse_tool_version(&version_output, "ffmpeg"), Some(major));
        }

        #[test]
        fn prop_minimum_version_gate(major in 1u32..20) {
            let result = check_minimum_version("ffmpeg", Some(major), MIN_FFMPEG_MAJOR);
            prop_assert_eq!(result.is_ok(), major >= MIN_FFMPEG_MAJOR);
        }
    }

    #[test]
    fn test_parse_version_multiline() {
        let output = r#"ffprobe version 6.1.1-3ubuntu5 Copyright (c) 2007-2023 the FFmpeg developers
built with gcc 13 (Ubuntu 13.2.0-23ubuntu3)
configuration: --prefix=/usr"#;
        assert_eq!(parse_tool_version(output, "ffprobe"), Some(6));
    }

    #[test]
    fn test_parse_version_wrong_tool() {
        let output = "ffmpeg version 6.1 Copyright (c) 2000-2024";
        assert_eq!(parse_tool_version(output, "ffprobe"), None);
    }

    #[test]
    fn test_parse_version_invalid() {
        assert_eq!(parse_tool_version("not ffmpeg output", "ffmpeg"), None);
        assert_eq!(parse_tool_version("", "ffmpeg"), None);
        // Git snapshot builds have no release number
        assert_eq!(
            parse_tool_version("ffmpeg version N-113000-g1234567 Copyright", "ffmpeg"),
            None
        );
    }

    #[test]
    fn test_unparseable_version_is_accepted() {
        assert!(check_minimum_version("ffmpeg", None, MIN_FFMPEG_MAJOR).is_ok());
    }

    #[test]
    fn test_old_version_error_message() {
        let err = check_minimum_version("ffmpeg", Some(4), MIN_FFMPEG_MAJOR).unwrap_err();
        assert!(err.to_string().contains("5.x or newer required, got: 4"));
    }
}
