//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Working directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkdirConfig {
    /// Root directory holding `in/` and `out/`
    #[serde(default = "default_workdir_root")]
    pub root: PathBuf,
    /// Remove `in/` and `out/` before starting (default false)
    #[serde(default)]
    pub clean: bool,
}

fn default_workdir_root() -> PathBuf {
    PathBuf::from("wrk")
}

impl Default for WorkdirConfig {
    fn default() -> Self {
        Self {
            root: default_workdir_root(),
            clean: false,
        }
    }
}

/// Watcher polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherConfig {
    /// Delay between directory scans in milliseconds (default 2000)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    2000
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

/// Image format of the averaged output
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    /// File extension written for this format, without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        }
    }

    /// Parse a format name (case-insensitive, `jpg` accepted)
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }
}

/// Processor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessorConfig {
    /// Delay between queue polls when idle, in milliseconds (default 2000)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Files processed concurrently (1 = serial, 0 = auto-derive)
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Output image format (default jpeg)
    #[serde(default)]
    pub image_format: OutputFormat,
}

fn default_workers() -> u32 {
    1
}

impl ProcessorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            workers: default_workers(),
            image_format: OutputFormat::default(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub workdir: WorkdirConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - AVGFRAME_WORKDIR -> workdir.root
    /// - AVGFRAME_WATCH_INTERVAL_MS -> watcher.interval_ms
    /// - AVGFRAME_PROCESS_INTERVAL_MS -> processor.interval_ms
    /// - AVGFRAME_WORKERS -> processor.workers
    /// - AVGFRAME_IMAGE_FORMAT -> processor.image_format
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("AVGFRAME_WORKDIR") {
            if !val.is_empty() {
                self.workdir.root = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("AVGFRAME_WATCH_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.watcher.interval_ms = ms;
            }
        }

        if let Ok(val) = env::var("AVGFRAME_PROCESS_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.processor.interval_ms = ms;
            }
        }

        if let Ok(val) = env::var("AVGFRAME_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                self.processor.workers = workers;
            }
        }

        // Unknown format names keep the existing value
        if let Ok(val) = env::var("AVGFRAME_IMAGE_FORMAT") {
            if let Some(format) = OutputFormat::parse(&val) {
                self.processor.image_format = format;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Env var tests must not interleave
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        env::remove_var("AVGFRAME_WORKDIR");
        env::remove_var("AVGFRAME_WATCH_INTERVAL_MS");
        env::remove_var("AVGFRAME_PROCESS_INTERVAL_MS");
        env::remove_var("AVGFRAME_WORKERS");
        env::remove_var("AVGFRAME_IMAGE_FORMAT");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            root in "[a-z][a-z0-9_]{0,12}",
            clean in proptest::bool::ANY,
            watch_ms in 1u64..60_000,
            process_ms in 1u64..60_000,
            workers in 0u32..32,
            png in proptest::bool::ANY,
        ) {
            let toml_str = format!(
                r#"
[workdir]
root = "{}"
clean = {}

[watcher]
interval_ms = {}

[processor]
interval_ms = {}
workers = {}
image_format = "{}"
"#,
                root,
                clean,
                watch_ms,
                process_ms,
                workers,
                if png { "png" } else { "jpeg" }
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.workdir.root, PathBuf::from(&root));
            prop_assert_eq!(config.workdir.clean, clean);
            prop_assert_eq!(config.watcher.interval_ms, watch_ms);
            prop_assert_eq!(config.processor.interval_ms, process_ms);
            prop_assert_eq!(config.processor.workers, workers);
            let expected = if png { OutputFormat::Png } else { OutputFormat::Jpeg };
            prop_assert_eq!(config.processor.image_format, expected);
        }

        #[test]
        fn prop_env_overrides_intervals(
            initial_ms in 1u64..10_000,
            override_watch in 1u64..10_000,
            override_process in 1u64..10_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[watcher]
interval_ms = {0}

[processor]
interval_ms = {0}
"#,
                initial_ms
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("AVGFRAME_WATCH_INTERVAL_MS", override_watch.to_string());
            env::set_var("AVGFRAME_PROCESS_INTERVAL_MS", override_process.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.watcher.interval_ms, override_watch);
            prop_assert_eq!(config.processor.interval_ms, override_process);
        }

        #[test]
        fn prop_env_overrides_workers(
            initial_workers in 0u32..16,
            override_workers in 0u32..64,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[processor]
workers = {}
"#,
                initial_workers
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("AVGFRAME_WORKERS", override_workers.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.processor.workers, override_workers);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.workdir.root, PathBuf::from("wrk"));
        assert!(!config.workdir.clean);
        assert_eq!(config.watcher.interval(), Duration::from_secs(2));
        assert_eq!(config.processor.interval(), Duration::from_secs(2));
        assert_eq!(config.processor.workers, 1);
        assert_eq!(config.processor.image_format, OutputFormat::Jpeg);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[processor]
image_format = "png"
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.processor.image_format, OutputFormat::Png);
        assert_eq!(config.processor.workers, 1); // default
        assert_eq!(config.watcher.interval_ms, 2000); // default
    }

    #[test]
    fn test_unknown_image_format_is_rejected() {
        let toml_str = r#"
[processor]
image_format = "gif"
"#;
        assert!(matches!(
            Config::parse_toml(toml_str),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_image_format_override() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("AVGFRAME_IMAGE_FORMAT", "PNG");
        config.apply_env_overrides();
        assert_eq!(config.processor.image_format, OutputFormat::Png);

        // Unknown names keep the current value
        env::set_var("AVGFRAME_IMAGE_FORMAT", "bmp");
        config.apply_env_overrides();
        clear_env_vars();
        assert_eq!(config.processor.image_format, OutputFormat::Png);
    }

    #[test]
    fn test_env_workdir_override() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("AVGFRAME_WORKDIR", "/srv/frames");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.workdir.root, PathBuf::from("/srv/frames"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let config = Config::load_or_default("/nonexistent/avgframe.toml")
            .expect("missing file falls back to defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpeg");
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::parse("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::parse("tiff"), None);
    }
}
