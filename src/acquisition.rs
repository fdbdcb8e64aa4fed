//! # Acquisition Module
//!
//! Runs both data-acquisition strategies against the backend and forwards
//! their results to the dashboard loop as `PulseUpdate`s.
//!
//! ## Key Components
//! - `AcquisitionManager`: owns the Tokio runtime and command processing
//! - `AcquisitionCommand`: requests from the dashboard (seed, shutdown)
//! - `PulseUpdate`: everything the dashboard loop consumes
//!
//! ## Strategies
//! - Poll: `/data` on a fixed interval. Every tick spawns its own request, so a
//!   slow response never delays the next tick and nothing in flight is cancelled.
//! - Push: `/events` on a blocking task, see `stream`.
//! - Legacy: `/energy` on its own interval when enabled.
//!
//! Failures are logged and the next tick tries again. There is no backoff.

use crate::backend::Backend;
use crate::config::Config;
use crate::pulse_data::PollBatch;
use crate::stream::{run_event_stream, StreamEvent};
use crate::timeseries::Sample;
use crate::visibility::Visibility;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Everything the dashboard loop reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum PulseUpdate {
    /// Periodic `/data` response
    Batch(PollBatch),
    /// `/data` response requested for (re)initialization
    Seed(PollBatch),
    /// Legacy `/energy` reading
    Energy(Sample),
    Stream(StreamEvent),
    /// Host reported a visibility change
    Visibility(Visibility),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionCommand {
    /// Fetch `/data` once and reply with `PulseUpdate::Seed`
    Seed,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Poll,
    Seed,
    Energy,
}

/// Perform one blocking fetch and forward the result.
///
/// Errors are logged and dropped; the caller's schedule decides when to try again.
pub fn fetch_once(backend: &dyn Backend, kind: FetchKind, sender: &Sender<PulseUpdate>) {
    let update = match kind {
        FetchKind::Poll | FetchKind::Seed => match backend.fetch_batch() {
            Ok(batch) if kind == FetchKind::Seed => PulseUpdate::Seed(batch),
            Ok(batch) => PulseUpdate::Batch(batch),
            Err(e) => {
                log::warn!("{:?} fetch skipped: {}", kind, e);
                return;
            }
        },
        FetchKind::Energy => match backend.fetch_energy() {
            Ok(reading) => PulseUpdate::Energy(reading),
            Err(e) => {
                log::warn!("Energy fetch skipped: {}", e);
                return;
            }
        },
    };

    if sender.send(update).is_err() {
        log::debug!("Dashboard gone, dropping {:?} result", kind);
    }
}

/// Runs acquisition on a dedicated thread with its own Tokio runtime.
pub struct AcquisitionManager {
    config: Config,
    backend: Arc<dyn Backend>,
    command_receiver: mpsc::UnboundedReceiver<AcquisitionCommand>,
    update_sender: Sender<PulseUpdate>,
}

impl AcquisitionManager {
    /// Returns the manager and a sender for issuing commands from the dashboard.
    pub fn new(
        config: Config,
        backend: Arc<dyn Backend>,
        update_sender: Sender<PulseUpdate>,
    ) -> (Self, mpsc::UnboundedSender<AcquisitionCommand>) {
        let (command_sender, command_receiver) = mpsc::unbounded_channel();

        let manager = AcquisitionManager {
            config,
            backend,
            command_receiver,
            update_sender,
        };

        (manager, command_sender)
    }

    /// Blocks until a shutdown command arrives or the command channel closes.
    pub fn run(self) {
        let rt = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("Failed to create async runtime: {}", e);
                return;
            }
        };

        rt.block_on(self.serve());

        // The stream reader may be parked in a blocking read; don't wait for it
        rt.shutdown_background();
        log::info!("Acquisition: shut down");
    }

    async fn serve(mut self) {
        let should_stop = Arc::new(AtomicBool::new(false));

        {
            let backend = self.backend.clone();
            let sender = self.update_sender.clone();
            let retry = self.config.stream_retry();
            let stop = should_stop.clone();
            tokio::task::spawn_blocking(move || {
                run_event_stream(backend.as_ref(), &sender, retry, &stop);
            });
        }

        // The startup seed covers the first fetch, so polling starts one period later
        let mut poll = delayed_interval(self.config.poll_interval());
        let mut energy = self
            .config
            .enable_energy_poll
            .then(|| delayed_interval(self.config.energy_poll_interval()));

        log::info!(
            "Acquisition: polling {} every {:?}",
            self.config.endpoint(crate::pulse_data::DATA_PATH),
            self.config.poll_interval()
        );

        loop {
            tokio::select! {
                _ = poll.tick() => self.spawn_fetch(FetchKind::Poll),
                _ = next_tick(&mut energy) => self.spawn_fetch(FetchKind::Energy),
                command = self.command_receiver.recv() => match command {
                    Some(AcquisitionCommand::Seed) => {
                        log::debug!("Acquisition: seed requested");
                        self.spawn_fetch(FetchKind::Seed);
                    }
                    Some(AcquisitionCommand::Shutdown) | None => {
                        log::info!("Acquisition: shutdown requested");
                        break;
                    }
                },
            }
        }

        should_stop.store(true, Ordering::Relaxed);
    }

    fn spawn_fetch(&self, kind: FetchKind) {
        let backend = self.backend.clone();
        let sender = self.update_sender.clone();
        tokio::task::spawn_blocking(move || fetch_once(backend.as_ref(), kind, &sender));
    }
}

fn delayed_interval(period: std::time::Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::timeseries::Peak;
    use std::io::{BufRead, Cursor};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeBackend {
        batch: Result<PollBatch, FetchError>,
        energy: Result<Sample, FetchError>,
        batch_calls: Mutex<usize>,
    }

    impl FakeBackend {
        fn ok() -> Self {
            Self {
                batch: Ok(PollBatch {
                    data: vec![Sample { timestamp: 1000, value: 0.5 }],
                    peaks: vec![Peak { timestamp: 1000, magnitude: 0.5 }],
                }),
                energy: Ok(Sample { timestamp: 7, value: 42.0 }),
                batch_calls: Mutex::new(0),
            }
        }
    }

    impl Backend for FakeBackend {
        fn fetch_batch(&self) -> Result<PollBatch, FetchError> {
            *self.batch_calls.lock().unwrap() += 1;
            self.batch.clone()
        }

        fn fetch_energy(&self) -> Result<Sample, FetchError> {
            self.energy.clone()
        }

        fn open_events(&self, _last_event_id: Option<&str>) -> Result<Box<dyn BufRead + Send>, FetchError> {
            // Empty stream: opens, closes immediately, then reconnects after the retry delay
            Ok(Box::new(Cursor::new(Vec::new())))
        }
    }

    #[test]
    fn test_fetch_once_routes_by_kind() {
        let backend = FakeBackend::ok();
        let (tx, rx) = crossbeam_channel::unbounded();

        fetch_once(&backend, FetchKind::Poll, &tx);
        fetch_once(&backend, FetchKind::Seed, &tx);
        fetch_once(&backend, FetchKind::Energy, &tx);

        assert!(matches!(rx.try_recv(), Ok(PulseUpdate::Batch(_))));
        assert!(matches!(rx.try_recv(), Ok(PulseUpdate::Seed(_))));
        assert_eq!(
            rx.try_recv().ok(),
            Some(PulseUpdate::Energy(Sample { timestamp: 7, value: 42.0 }))
        );
    }

    #[test]
    fn test_fetch_failure_sends_nothing() {
        let backend = FakeBackend {
            batch: Err(FetchError::Status { status: 500, url: "/data".into() }),
            energy: Err(FetchError::Transport("timeout".into())),
            batch_calls: Mutex::new(0),
        };
        let (tx, rx) = crossbeam_channel::unbounded();

        fetch_once(&backend, FetchKind::Poll, &tx);
        fetch_once(&backend, FetchKind::Energy, &tx);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_manager_seeds_on_command_and_shuts_down() {
        let backend = Arc::new(FakeBackend::ok());
        let config = Config {
            // Long enough that no poll tick fires during the test
            poll_interval_ms: 60_000,
            stream_retry_ms: 60_000,
            ..Config::default()
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        let (manager, commands) = AcquisitionManager::new(config, backend.clone(), tx);

        let handle = std::thread::spawn(move || manager.run());
        commands.send(AcquisitionCommand::Seed).expect("manager running");

        let seed = loop {
            match rx.recv_timeout(Duration::from_secs(5)).expect("update within 5s") {
                PulseUpdate::Seed(batch) => break batch,
                _ => continue,
            }
        };
        assert_eq!(seed.data.len(), 1);

        commands.send(AcquisitionCommand::Shutdown).expect("manager running");
        handle.join().expect("manager thread");
        assert_eq!(*backend.batch_calls.lock().unwrap(), 1);
    }
}
