//! Configuration loading and typed config structures for the diagnostics
//! binary.
//!
//! The canonical configuration lives in `fieldguide.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure and provides a loader that reads the file and applies
//! environment-variable overrides for the storage paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldguide_store::CommitLatency;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level diagnostics configuration.
///
/// Mirrors the structure of `fieldguide.yaml`. All fields have defaults, so
/// an absent or empty file yields a runnable configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DiagConfig {
    /// Storage backend and paths.
    #[serde(default)]
    pub store: StoreConfig,

    /// Simulated commit latency.
    #[serde(default)]
    pub latency: LatencyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DiagConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for storage paths:
    /// - `FIELDGUIDE_DB_PATH` overrides `store.db_path`
    /// - `FIELDGUIDE_LOG_PATH` overrides `store.event_log_path`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.store.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.store.apply_env_overrides();
        Ok(config)
    }
}

/// Storage backend and path configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Which snapshot store backend to use: `memory` or `sqlite`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// `SQLite` database path (used by the `sqlite` backend).
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Toggle event log path (audit trail).
    #[serde(default = "default_event_log_path")]
    pub event_log_path: PathBuf,

    /// Compact the event log once it exceeds this many lines (0 disables).
    #[serde(default = "default_compact_every")]
    pub compact_every: u64,
}

impl StoreConfig {
    /// Override storage paths with environment variables when set.
    ///
    /// This lets a deployment relocate the data directory without touching
    /// the YAML config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FIELDGUIDE_DB_PATH") {
            self.db_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FIELDGUIDE_LOG_PATH") {
            self.event_log_path = PathBuf::from(val);
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            event_log_path: default_event_log_path(),
            compact_every: default_compact_every(),
        }
    }
}

/// Simulated commit latency configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LatencyConfig {
    /// Chance that a delayed commit actually sleeps (0.0 to 1.0).
    #[serde(default = "default_probability")]
    pub probability: f64,

    /// Lower bound of the sleep interval in milliseconds.
    #[serde(default = "default_floor_ms")]
    pub floor_ms: u64,

    /// Upper bound of the sleep interval in milliseconds.
    #[serde(default = "default_ceiling_ms")]
    pub ceiling_ms: u64,
}

impl LatencyConfig {
    /// Convert into the store-layer latency profile.
    pub fn to_commit_latency(&self) -> CommitLatency {
        CommitLatency::new(
            self.probability,
            Duration::from_millis(self.floor_ms),
            Duration::from_millis(self.ceiling_ms),
        )
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            probability: default_probability(),
            floor_ms: default_floor_ms(),
            ceiling_ms: default_ceiling_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_backend() -> String {
    "memory".to_owned()
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".fieldguide/caught.db")
}

fn default_event_log_path() -> PathBuf {
    PathBuf::from(".fieldguide/caught.log")
}

const fn default_compact_every() -> u64 {
    100
}

const fn default_probability() -> f64 {
    0.5
}

const fn default_floor_ms() -> u64 {
    50
}

const fn default_ceiling_ms() -> u64 {
    800
}

fn default_log_level() -> String {
    "info".to_owned()
}
