//! # Push Strategy Module
//!
//! Subscribes to the backend's `/events` stream and turns each server-sent
//! event into a `StreamEvent` for the dashboard loop.
//!
//! The transport reconnects on its own: when the stream ends or cannot be
//! opened, an `Error` event is emitted, the loop sleeps for the retry delay
//! (server `retry:` field, or the configured default) and opens it again.

use crate::acquisition::PulseUpdate;
use crate::backend::Backend;
use crate::error::StreamError;
use crate::pulse_data::PeakEvent;
use crate::sse::{EventReader, SseEvent};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Connection state of the event stream, as seen when an event is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Open,
    Error(ReadyState),
    Message(String),
    Peak(PeakEvent),
}

impl StreamEvent {
    /// Interpret one server-sent event. Unknown event names yield `Ok(None)`.
    pub fn from_sse(event: &SseEvent) -> Result<Option<Self>, StreamError> {
        match event.event.as_str() {
            "peak" => PeakEvent::parse(&event.data).map(|p| Some(StreamEvent::Peak(p))),
            "message" => Ok(Some(StreamEvent::Message(event.data.clone()))),
            // Server-named events arrive on a connection we are still reading
            "open" => Ok(Some(StreamEvent::Open)),
            "error" => Ok(Some(StreamEvent::Error(ReadyState::Open))),
            other => {
                log::debug!("Ignoring unknown event type {:?}", other);
                Ok(None)
            }
        }
    }
}

/// Keep the event stream subscribed until `should_stop` is set or the dashboard goes away.
pub fn run_event_stream(
    backend: &dyn Backend,
    sender: &Sender<PulseUpdate>,
    default_retry: Duration,
    should_stop: &Arc<AtomicBool>,
) {
    let mut retry = default_retry;
    let mut last_event_id: Option<String> = None;

    while !should_stop.load(Ordering::Relaxed) {
        match backend.open_events(last_event_id.as_deref()) {
            Ok(body) => {
                if !send(sender, StreamEvent::Open) {
                    return;
                }

                let mut reader = EventReader::new(body);
                let ended = pump_events(&mut reader, sender, should_stop, &mut last_event_id);
                if let Some(server_retry) = reader.retry() {
                    retry = server_retry;
                }
                match ended {
                    StreamEnd::Receiver => return,
                    StreamEnd::Stopped => break,
                    StreamEnd::Closed => log::debug!("Event stream closed by server"),
                    StreamEnd::Failed(e) => log::debug!("{}", e),
                }
            }
            Err(e) => {
                log::debug!("{}", StreamError::from(e));
            }
        }

        if !send(sender, StreamEvent::Error(ReadyState::Connecting)) {
            return;
        }
        if !sleep_unless_stopped(retry, should_stop) {
            break;
        }
    }

    let _ = sender.send(PulseUpdate::Stream(StreamEvent::Error(ReadyState::Closed)));
    log::info!("Event stream: stopped");
}

enum StreamEnd {
    Closed,
    Failed(StreamError),
    Stopped,
    Receiver,
}

fn pump_events<R: std::io::BufRead>(
    reader: &mut EventReader<R>,
    sender: &Sender<PulseUpdate>,
    should_stop: &Arc<AtomicBool>,
    last_event_id: &mut Option<String>,
) -> StreamEnd {
    while let Some(next) = reader.next() {
        if should_stop.load(Ordering::Relaxed) {
            return StreamEnd::Stopped;
        }

        let raw = match next {
            Ok(raw) => raw,
            Err(e) => return StreamEnd::Failed(StreamError::Read(e)),
        };
        if raw.id.is_some() {
            last_event_id.clone_from(&raw.id);
        }

        match StreamEvent::from_sse(&raw) {
            Ok(Some(event)) => {
                if !send(sender, event) {
                    return StreamEnd::Receiver;
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("{}", e),
        }
    }
    StreamEnd::Closed
}

fn send(sender: &Sender<PulseUpdate>, event: StreamEvent) -> bool {
    sender.send(PulseUpdate::Stream(event)).is_ok()
}

/// Returns `false` if the stop flag was raised while waiting
fn sleep_unless_stopped(total: Duration, should_stop: &Arc<AtomicBool>) -> bool {
    let mut waited = Duration::ZERO;
    while waited < total {
        if should_stop.load(Ordering::Relaxed) {
            return false;
        }
        let step = STOP_POLL_INTERVAL.min(total - waited);
        std::thread::sleep(step);
        waited += step;
    }
    !should_stop.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::pulse_data::PollBatch;
    use crate::timeseries::Sample;
    use std::io::{BufRead, Cursor};
    use std::sync::Mutex;

    /// Serves each scripted body once, then raises the stop flag on the next connect
    struct ScriptedStream {
        bodies: Mutex<Vec<Result<&'static str, FetchError>>>,
        resumed_from: Mutex<Vec<Option<String>>>,
        stop: Arc<AtomicBool>,
    }

    impl Backend for ScriptedStream {
        fn fetch_batch(&self) -> Result<PollBatch, FetchError> {
            Err(FetchError::Transport("not scripted".into()))
        }

        fn fetch_energy(&self) -> Result<Sample, FetchError> {
            Err(FetchError::Transport("not scripted".into()))
        }

        fn open_events(&self, last_event_id: Option<&str>) -> Result<Box<dyn BufRead + Send>, FetchError> {
            self.resumed_from
                .lock()
                .unwrap()
                .push(last_event_id.map(str::to_string));
            let mut bodies = self.bodies.lock().unwrap();
            if bodies.is_empty() {
                self.stop.store(true, Ordering::Relaxed);
                return Err(FetchError::Transport("script finished".into()));
            }
            match bodies.remove(0) {
                Ok(body) => Ok(Box::new(Cursor::new(body.as_bytes().to_vec()))),
                Err(e) => Err(e),
            }
        }
    }

    fn events(rx: &crossbeam_channel::Receiver<PulseUpdate>) -> Vec<StreamEvent> {
        rx.try_iter()
            .filter_map(|u| match u {
                PulseUpdate::Stream(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_from_sse_mapping() {
        let peak = SseEvent {
            event: "peak".into(),
            data: r#"{"timestamp": 5, "ipi": 700}"#.into(),
            id: None,
        };
        assert!(matches!(StreamEvent::from_sse(&peak), Ok(Some(StreamEvent::Peak(_)))));

        let msg = SseEvent { event: "message".into(), data: "hi".into(), id: None };
        assert_eq!(
            StreamEvent::from_sse(&msg).unwrap(),
            Some(StreamEvent::Message("hi".into()))
        );

        let other = SseEvent { event: "heartbeat".into(), data: "".into(), id: None };
        assert_eq!(StreamEvent::from_sse(&other).unwrap(), None);

        let err = SseEvent { event: "error".into(), data: "overloaded".into(), id: None };
        assert_eq!(
            StreamEvent::from_sse(&err).unwrap(),
            Some(StreamEvent::Error(ReadyState::Open))
        );

        let bad = SseEvent { event: "peak".into(), data: "{".into(), id: None };
        assert!(StreamEvent::from_sse(&bad).is_err());
    }

    #[test]
    fn test_stream_emits_open_events_and_reconnects() {
        let stop = Arc::new(AtomicBool::new(false));
        let backend = ScriptedStream {
            bodies: Mutex::new(vec![
                Err(FetchError::Transport("refused".into())),
                Ok("id: 41\nevent: peak\ndata: {\"timestamp\": 2000, \"ipi\": 1000}\n\nevent: peak\ndata: garbage\n\n"),
            ]),
            resumed_from: Mutex::new(Vec::new()),
            stop: stop.clone(),
        };
        let (tx, rx) = crossbeam_channel::unbounded();

        run_event_stream(&backend, &tx, Duration::from_millis(1), &stop);

        let got = events(&rx);
        assert_eq!(got[0], StreamEvent::Error(ReadyState::Connecting));
        assert_eq!(got[1], StreamEvent::Open);
        assert_eq!(
            got[2],
            StreamEvent::Peak(PeakEvent { timestamp: 2000, ipi: Some(1000.0) })
        );
        // Malformed peak is skipped; stream then closes and the loop stops
        assert_eq!(got.last(), Some(&StreamEvent::Error(ReadyState::Closed)));
        assert_eq!(got.iter().filter(|e| matches!(e, StreamEvent::Peak(_))).count(), 1);

        // Reconnect after the second body resumes from the last seen id
        let resumed = backend.resumed_from.lock().unwrap();
        assert_eq!(resumed[0], None);
        assert_eq!(resumed[1], None);
        assert_eq!(resumed[2].as_deref(), Some("41"));
    }

    #[test]
    fn test_stream_exits_when_receiver_dropped() {
        let stop = Arc::new(AtomicBool::new(false));
        let backend = ScriptedStream {
            bodies: Mutex::new(vec![Ok("data: x\n\n"), Ok("data: y\n\n")]),
            resumed_from: Mutex::new(Vec::new()),
            stop: Arc::new(AtomicBool::new(false)),
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);

        // Returns instead of looping forever
        run_event_stream(&backend, &tx, Duration::from_millis(1), &stop);
    }

    #[test]
    fn test_sleep_unless_stopped() {
        let stop = Arc::new(AtomicBool::new(true));
        assert!(!sleep_unless_stopped(Duration::from_secs(60), &stop));

        let stop = Arc::new(AtomicBool::new(false));
        assert!(sleep_unless_stopped(Duration::from_millis(5), &stop));
    }
}
