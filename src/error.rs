//! # Error Types Module
//!
//! Centralized error handling for pulse-meter.
//! Each acquisition path has its own error type so the loop that owns it can
//! log the failure and carry on with the next tick.
//!
//! ## Error Types
//! - `FetchError`: request/response failures on `/data` and `/energy`
//! - `StreamError`: event-stream connection and payload failures
//! - `ConfigError`: configuration file I/O and parsing errors
//!
//! None of these are fatal once the dashboard is running. A failed cycle is
//! skipped and the next poll or event corrects the display.

use std::fmt;
use std::path::PathBuf;

/// Errors from a single request/response exchange with the backend
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Network error, timeout, or unreadable body
    Transport(String),
    /// Backend answered with a non-success status
    Status { status: u16, url: String },
    /// Body did not match the expected contract
    Malformed { url: String, reason: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(msg) => {
                write!(f, "Request failed: {}", msg)
            }
            FetchError::Status { status, url } => {
                write!(f, "Backend returned status {} for {}", status, url)
            }
            FetchError::Malformed { url, reason } => {
                write!(f, "Malformed payload from {}: {}", url, reason)
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Errors on the push (event stream) path
#[derive(Debug)]
pub enum StreamError {
    /// Could not open the event stream
    Connect(String),
    /// Stream broke while reading
    Read(std::io::Error),
    /// A `peak` event carried a payload we could not parse
    MalformedPeak(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Connect(msg) => {
                write!(f, "Failed to open event stream: {}", msg)
            }
            StreamError::Read(e) => {
                write!(f, "Event stream read failed: {}", e)
            }
            StreamError::MalformedPeak(msg) => {
                write!(f, "Malformed peak event: {}", msg)
            }
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Read(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FetchError> for StreamError {
    fn from(e: FetchError) -> Self {
        StreamError::Connect(e.to_string())
    }
}

/// Settings file failures, each naming the file involved
#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Write { path: PathBuf, source: std::io::Error },
    /// Settings file exists but is not valid pulse-meter TOML
    Parse { path: PathBuf, source: toml::de::Error },
    Serialize(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Cannot read settings from {}: {}", path.display(), source)
            }
            ConfigError::Write { path, source } => {
                write!(f, "Cannot write settings to {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Invalid settings in {}: {}", path.display(), source)
            }
            ConfigError::Serialize(e) => {
                write!(f, "Cannot encode settings as TOML: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } | ConfigError::Write { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(e) => Some(e),
        }
    }
}
