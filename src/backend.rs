//! # Backend Transport Module
//!
//! Blocking HTTP access to the sensor backend. The `Backend` trait is the seam
//! between acquisition and the network: the acquisition loops only see parsed
//! payloads or a `FetchError`, and tests swap in a scripted backend.
//!
//! Calls block, so the acquisition runtime runs them on `spawn_blocking`.

use crate::config::Config;
use crate::error::FetchError;
use crate::pulse_data::{self, PollBatch, DATA_PATH, ENERGY_PATH, EVENTS_PATH};
use crate::timeseries::Sample;
use std::io::{BufRead, BufReader};

pub trait Backend: Send + Sync + 'static {
    /// `GET /data`
    fn fetch_batch(&self) -> Result<PollBatch, FetchError>;

    /// `GET /energy`, stamped with the time the response arrived
    fn fetch_energy(&self) -> Result<Sample, FetchError>;

    /// Open `/events` and hand back the body for line-by-line reading.
    /// `last_event_id` resumes a stream after a reconnect.
    fn open_events(&self, last_event_id: Option<&str>) -> Result<Box<dyn BufRead + Send>, FetchError>;
}

/// `Backend` over a `ureq` agent
pub struct HttpBackend {
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
    data_url: String,
    energy_url: String,
    events_url: String,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout())
            .build();

        // The event stream stays open indefinitely, so only the connect step is bounded
        let stream_agent = ureq::AgentBuilder::new()
            .timeout_connect(config.request_timeout())
            .build();

        Self {
            agent,
            stream_agent,
            data_url: config.endpoint(DATA_PATH),
            energy_url: config.endpoint(ENERGY_PATH),
            events_url: config.endpoint(EVENTS_PATH),
        }
    }

    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| Self::map_error(e, url))?;

        response
            .into_string()
            .map_err(|e| FetchError::Transport(e.to_string()))
    }

    fn map_error(error: ureq::Error, url: &str) -> FetchError {
        match error {
            ureq::Error::Status(status, _) => FetchError::Status {
                status,
                url: url.to_string(),
            },
            ureq::Error::Transport(t) => FetchError::Transport(t.to_string()),
        }
    }
}

impl Backend for HttpBackend {
    fn fetch_batch(&self) -> Result<PollBatch, FetchError> {
        let body = self.get_text(&self.data_url)?;
        PollBatch::parse(&body, &self.data_url)
    }

    fn fetch_energy(&self) -> Result<Sample, FetchError> {
        let body = self.get_text(&self.energy_url)?;
        let received_at = chrono::Utc::now().timestamp_millis();
        pulse_data::parse_energy(&body, received_at, &self.energy_url)
    }

    fn open_events(&self, last_event_id: Option<&str>) -> Result<Box<dyn BufRead + Send>, FetchError> {
        let mut request = self
            .stream_agent
            .get(&self.events_url)
            .set("Accept", "text/event-stream")
            .set("Cache-Control", "no-cache");
        if let Some(id) = last_event_id {
            request = request.set("Last-Event-ID", id);
        }

        let response = request
            .call()
            .map_err(|e| Self::map_error(e, &self.events_url))?;

        Ok(Box::new(BufReader::new(response.into_reader())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_from_config() {
        let config = Config {
            base_url: "http://meter.local:8080/".to_string(),
            ..Config::default()
        };
        let backend = HttpBackend::new(&config);

        assert_eq!(backend.data_url, "http://meter.local:8080/data");
        assert_eq!(backend.energy_url, "http://meter.local:8080/energy");
        assert_eq!(backend.events_url, "http://meter.local:8080/events");
    }

    #[test]
    fn test_unreachable_backend_is_transport_error() {
        // Port 9 on loopback is almost never served; connection is refused immediately
        let config = Config {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 500,
            ..Config::default()
        };
        let backend = HttpBackend::new(&config);

        assert!(matches!(backend.fetch_batch(), Err(FetchError::Transport(_))));
    }
}
