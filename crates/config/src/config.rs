//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

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

/// External encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Encoder executable, looked up on PATH when not absolute (default "ffmpeg")
    #[serde(default = "default_encoder_program")]
    pub program: PathBuf,
    /// FLAC compression level passed to the encoder (0-12, default 6)
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,
}

fn default_encoder_program() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_compression_level() -> u8 {
    6
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: default_encoder_program(),
            compression_level: default_compression_level(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PoolConfig {
    /// Number of concurrent workers (0 = one per logical core)
    #[serde(default)]
    pub workers: u32,
    /// Run each conversion in its own worker process instead of a thread
    #[serde(default)]
    pub use_process: bool,
}

/// Archive directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    /// Name of the archive directory created under the scan root (default "WAV_Raw")
    #[serde(default = "default_archive_dir_name")]
    pub dir_name: String,
    /// Absolute archive directory; takes precedence over `dir_name`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_archive_dir_name() -> String {
    "WAV_Raw".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir_name: default_archive_dir_name(),
            path: None,
        }
    }
}

impl ArchiveConfig {
    /// Resolve the archive directory for a given scan root
    pub fn resolve(&self, scan_root: &Path) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => scan_root.join(&self.dir_name),
        }
    }
}

/// Run log configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Directory holding the temporary run log and the dated master logs
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and handles missing optional fields with defaults.
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
    /// - WAV2FLAC_ENCODER -> encoder.program
    /// - WAV2FLAC_COMPRESSION -> encoder.compression_level
    /// - WAV2FLAC_WORKERS -> pool.workers
    /// - WAV2FLAC_USE_PROCESS -> pool.use_process
    /// - WAV2FLAC_ARCHIVE_DIR -> archive.path
    /// - WAV2FLAC_LOG_DIR -> logging.dir
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = non_empty_var("WAV2FLAC_ENCODER") {
            self.encoder.program = PathBuf::from(val);
        }

        if let Some(val) = non_empty_var("WAV2FLAC_COMPRESSION") {
            if let Ok(level) = val.parse::<u8>() {
                self.encoder.compression_level = level;
            }
        }

        if let Some(val) = non_empty_var("WAV2FLAC_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                self.pool.workers = workers;
            }
        }

        if let Some(val) = non_empty_var("WAV2FLAC_USE_PROCESS") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.pool.use_process = true,
                "false" | "0" | "no" => self.pool.use_process = false,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Some(val) = non_empty_var("WAV2FLAC_ARCHIVE_DIR") {
            self.archive.path = Some(PathBuf::from(val));
        }

        if let Some(val) = non_empty_var("WAV2FLAC_LOG_DIR") {
            self.logging.dir = PathBuf::from(val);
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
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|val| !val.trim().is_empty())
}
