//! Configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$PECMBOX_CONFIG` (environment variable)
//! 2. `~/.config/pecmbox/config.toml` (Linux),
//!    `~/Library/Application Support/pecmbox/config.toml` (macOS),
//!    `%APPDATA%\pecmbox\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! ```toml
//! [general]
//! log_level = "info"
//! date_format = "%d/%m/%Y %H:%M"
//!
//! [grouping]
//! similarity_threshold = 0.9
//!
//! [extract]
//! body_selection = "first"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::parser::extract::BodySelection;
use crate::parser::header::DEFAULT_DATE_FORMAT;
use crate::parser::mbox::MAX_MESSAGE_SIZE;
use crate::threading::DEFAULT_SIMILARITY_THRESHOLD;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    /// Subject grouping.
    pub grouping: GroupingConfig,
    /// Body and attachment extraction.
    pub extract: ExtractConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// `strftime` format for message display dates.
    pub date_format: String,
    /// `strftime` format for the archive upload timestamp.
    pub uploaded_at_format: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Subjects at or above this similarity (0.0–1.0) share a group.
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// `"longest"` or `"first"` text part wins.
    pub body_selection: BodySelection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    /// Larger messages are truncated.
    pub max_message_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            uploaded_at_format: DEFAULT_DATE_FORMAT.to_string(),
            cache_dir: None,
        }
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => match parse_config(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Invalid config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Parse and validate a TOML configuration document.
pub fn parse_config(contents: &str) -> crate::error::Result<Config> {
    let cfg: Config =
        toml::from_str(contents).map_err(|e| crate::error::PecError::Config(e.to_string()))?;
    let threshold = cfg.grouping.similarity_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(crate::error::PecError::Config(format!(
            "grouping.similarity_threshold must be between 0.0 and 1.0, got {threshold}"
        )));
    }
    if cfg.performance.max_message_size == 0 {
        return Err(crate::error::PecError::Config(
            "performance.max_message_size must be greater than zero".to_string(),
        ));
    }
    Ok(cfg)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("PECMBOX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("pecmbox").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pecmbox")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("pecmbox.log")
}
