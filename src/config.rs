//! # Configuration Management Module
//!
//! Persistent settings stored in the platform config directory.
//! Handles loading, saving, and providing defaults.
//!
//! ## Settings
//! - `base_url`: sensor backend, endpoints are resolved against it
//! - poll cadences for `/data` and the legacy `/energy` endpoint
//! - per-series retention caps
//! - `chart_window`: optional visible window for the raw chart
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/pulse-meter/config.toml
//! - Linux: ~/.config/pulse-meter/config.toml
//! - Windows: %APPDATA%\pulse-meter\config.toml

use crate::error::ConfigError;
use crate::peaks::DEFAULT_SEED_PAIRS;
use crate::timeseries::{StoreLimits, DEFAULT_ENERGY_CAPACITY, DEFAULT_PEAK_CAPACITY, DEFAULT_RAW_CAPACITY};
use crate::visualization::ChartWindow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub stream_retry_ms: u64,
    pub raw_capacity: usize,
    pub peak_capacity: usize,
    pub seed_pairs: usize,
    /// Unset keeps the whole derived history
    pub derived_capacity: Option<usize>,
    pub energy_capacity: usize,
    pub enable_energy_poll: bool,
    pub energy_poll_interval_ms: u64,
    pub chart_window: Option<ChartWindow>,
    pub status_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            poll_interval_ms: 5000,
            request_timeout_ms: 10_000,
            stream_retry_ms: 3000,
            raw_capacity: DEFAULT_RAW_CAPACITY,
            peak_capacity: DEFAULT_PEAK_CAPACITY,
            seed_pairs: DEFAULT_SEED_PAIRS,
            derived_capacity: None,
            energy_capacity: DEFAULT_ENERGY_CAPACITY,
            enable_energy_poll: false,
            energy_poll_interval_ms: 30_000,
            chart_window: None,
            status_interval_ms: 5000,
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse-meter")
            .join("config.toml")
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or write and return the defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(ConfigError::Serialize)?;
        fs::write(path, toml_string).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Endpoint URL for a path such as `/data`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            raw: self.raw_capacity,
            peaks: self.peak_capacity,
            derived: self.derived_capacity,
            energy: self.energy_capacity,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn energy_poll_interval(&self) -> Duration {
        Duration::from_millis(self.energy_poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stream_retry(&self) -> Duration {
        Duration::from_millis(self.stream_retry_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }
}
