//! # Backend Payload Module
//!
//! Data contracts carried by the sensor backend's endpoints. Parsing lives
//! here so the transport only moves bytes and the dashboard only sees typed
//! values.
//!
//! ## Endpoints
//! - `GET /data`: `{"data": [[ts, value], ...], "peaks": [[ts, magnitude], ...]}`
//! - `GET /energy`: plain-text number, stamped with receipt time
//! - `peak` event on `/events`: `{"timestamp": ms, "ipi": ms}`

use crate::error::{FetchError, StreamError};
use crate::timeseries::{Peak, Sample};
use serde::Deserialize;

pub const DATA_PATH: &str = "/data";
pub const ENERGY_PATH: &str = "/energy";
pub const EVENTS_PATH: &str = "/events";

/// One poll response: the latest raw samples and the peaks detected in them
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PollBatch {
    pub data: Vec<Sample>,
    pub peaks: Vec<Peak>,
}

impl PollBatch {
    pub fn parse(body: &str, url: &str) -> Result<Self, FetchError> {
        serde_json::from_str(body).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Payload of a pushed `peak` event
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PeakEvent {
    pub timestamp: i64,
    /// Interval to the previous peak as computed by the backend, in ms.
    /// When absent the interval is taken from the last peak we saw.
    #[serde(default)]
    pub ipi: Option<f64>,
}

impl PeakEvent {
    pub fn parse(data: &str) -> Result<Self, StreamError> {
        serde_json::from_str(data)
            .map_err(|e| StreamError::MalformedPeak(format!("{} in {:?}", e, data)))
    }

    /// Interval rounded to whole milliseconds. A positive interval stays
    /// positive, at least 1 ms.
    pub fn ipi_ms(&self) -> Option<i64> {
        self.ipi.map(|ipi| {
            let ms = ipi.round() as i64;
            if ipi > 0.0 {
                ms.max(1)
            } else {
                ms
            }
        })
    }
}

/// Parse the legacy `/energy` body into a reading taken at `received_at`.
pub fn parse_energy(body: &str, received_at: i64, url: &str) -> Result<Sample, FetchError> {
    let value: f64 = body.trim().parse().map_err(|e: std::num::ParseFloatError| {
        FetchError::Malformed {
            url: url.to_string(),
            reason: format!("{} in {:?}", e, body.trim()),
        }
    })?;

    if !value.is_finite() {
        return Err(FetchError::Malformed {
            url: url.to_string(),
            reason: format!("non-finite energy value {}", value),
        });
    }

    Ok(Sample {
        timestamp: received_at,
        value,
    })
}
