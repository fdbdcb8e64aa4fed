//! # Dashboard Event Loop
//!
//! The single-threaded consumer that owns the `SeriesStore`. Every acquisition
//! result, pushed event and visibility change arrives as one `PulseUpdate` and
//! is applied to completion before the next one is read, so the reducer's
//! last-peak state never sees two events interleaved.
//!
//! Charts are external subscribers: they read whatever the store holds. The
//! binary's stand-in renderer is `status_line`, logged on a fixed interval.

use crate::acquisition::{AcquisitionCommand, PulseUpdate};
use crate::config::Config;
use crate::peaks::PeakReducer;
use crate::pulse_data::PollBatch;
use crate::stream::{ReadyState, StreamEvent};
use crate::timeseries::{PowerPoint, SeriesStore};
use crate::visibility::{Visibility, VisibilityController};
use crate::visualization::ChartWindow;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

/// Number of recent power points averaged in the status line
const STATUS_POWER_POINTS: usize = 5;

pub struct Dashboard {
    pub store: SeriesStore,
    reducer: PeakReducer,
    visibility: VisibilityController,
    stream_state: ReadyState,
    chart_window: Option<ChartWindow>,
    status_interval: Duration,
    receiver: Receiver<PulseUpdate>,
    commands: UnboundedSender<AcquisitionCommand>,
}

impl Dashboard {
    pub fn new(
        config: &Config,
        receiver: Receiver<PulseUpdate>,
        commands: UnboundedSender<AcquisitionCommand>,
        initial_visibility: Visibility,
    ) -> Self {
        Self {
            store: SeriesStore::new(config.store_limits()),
            reducer: PeakReducer::new(config.seed_pairs),
            visibility: VisibilityController::new(initial_visibility),
            stream_state: ReadyState::Connecting,
            chart_window: config.chart_window,
            status_interval: config.status_interval(),
            receiver,
            commands,
        }
    }

    /// Startup always seeds once, whatever the initial visibility.
    pub fn start(&mut self) {
        log::info!("Dashboard: starting ({})", self.visibility.state());
        self.request_seed();
    }

    /// Process updates until shutdown or until every sender is gone.
    pub fn run(mut self) {
        self.start();
        let mut next_status = Instant::now() + self.status_interval;

        loop {
            if Instant::now() >= next_status {
                log::info!(
                    "[{}, stream {:?}] {}",
                    self.visibility(),
                    self.stream_state(),
                    status_line(&self.store)
                );
                next_status = Instant::now() + self.status_interval;
            }

            let timeout = next_status.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(timeout) {
                Ok(PulseUpdate::Shutdown) => {
                    let _ = self.commands.send(AcquisitionCommand::Shutdown);
                    break;
                }
                Ok(update) => self.update(update),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        log::info!("Dashboard: stopped");
    }

    pub fn update(&mut self, update: PulseUpdate) {
        match update {
            PulseUpdate::Batch(batch) => self.apply_batch(&batch),
            PulseUpdate::Seed(batch) => self.apply_seed(&batch),
            PulseUpdate::Energy(reading) => {
                log::debug!("Energy reading: {}", reading.value);
                self.store.append_energy(reading);
            }
            PulseUpdate::Stream(event) => self.handle_stream_event(event),
            PulseUpdate::Visibility(next) => {
                if self.visibility.observe(next) {
                    log::info!("Dashboard: visible again, re-seeding");
                    self.store.reset();
                    self.request_seed();
                }
            }
            PulseUpdate::Shutdown => {
                let _ = self.commands.send(AcquisitionCommand::Shutdown);
            }
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility.state()
    }

    pub fn stream_state(&self) -> ReadyState {
        self.stream_state
    }

    fn request_seed(&self) {
        if self.commands.send(AcquisitionCommand::Seed).is_err() {
            log::warn!("Dashboard: acquisition not running, seed request dropped");
        }
    }

    /// Append the raw samples, then redraw peak markers inside the visible range.
    fn apply_batch(&mut self, batch: &PollBatch) {
        for sample in &batch.data {
            self.store.append_raw(*sample);
        }

        match self.store.visible_range_start(self.chart_window) {
            Some(start) => self.store.replace_peaks(&batch.peaks, start),
            // No raw data to anchor a visible range; every peak is in view
            None => self.store.replace_peaks(&batch.peaks, i64::MIN),
        }
    }

    fn apply_seed(&mut self, batch: &PollBatch) {
        self.apply_batch(batch);

        let ipi = self.reducer.seed(&batch.peaks);
        let power = ipi.iter().filter_map(PowerPoint::from_ipi).collect();
        log::info!(
            "Dashboard: seeded {} samples, {} interval points (last peak {:?})",
            batch.data.len(),
            ipi.len(),
            self.reducer.last_peak()
        );
        self.store.seed(ipi, power);
    }

    fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Open => {
                if self.stream_state != ReadyState::Open {
                    log::info!("Event stream: connected");
                }
                self.stream_state = ReadyState::Open;
            }
            StreamEvent::Error(state) => {
                if state != ReadyState::Open && self.stream_state == ReadyState::Open {
                    log::info!("Event stream: disconnected");
                }
                self.stream_state = state;
            }
            StreamEvent::Message(text) => log::debug!("Event stream message: {}", text),
            StreamEvent::Peak(peak) => {
                if let Some(point) = self.reducer.accept(peak.timestamp, peak.ipi_ms()) {
                    if !self.store.append_derived(point) {
                        log::debug!("Dropping stale interval point at {}", point.timestamp);
                    }
                }
            }
        }
    }
}

/// One-line summary of what the charts would currently show
pub fn status_line(store: &SeriesStore) -> String {
    let span = match store.raw().min_max_time() {
        Some((min, max)) => format!("{:.1}s", (max - min) as f64 / 1000.0),
        None => "-".to_string(),
    };
    let range = match store.raw().min_max_value() {
        Some((min, max)) => format!("[{:.3}, {:.3}]", min, max),
        None => "-".to_string(),
    };

    let recent: Vec<f64> = store
        .power()
        .last_points(STATUS_POWER_POINTS)
        .map(|p| p.watts)
        .collect();
    let power = if recent.is_empty() {
        "-".to_string()
    } else {
        format!("{:.0} W", recent.iter().sum::<f64>() / recent.len() as f64)
    };

    let mut line = format!(
        "raw {} pts over {} {} | peaks {} | ipi {} | power {}",
        store.raw().len(),
        span,
        range,
        store.peaks().len(),
        store.ipi().len(),
        power,
    );
    if let Some(energy) = store.energy().last() {
        line.push_str(&format!(" | energy {:.1}", energy.value));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse_data::PeakEvent;
    use crate::sse::SseEvent;
    use crate::timeseries::{Peak, Sample};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn dashboard() -> (Dashboard, UnboundedReceiver<AcquisitionCommand>) {
        let (_tx, rx) = crossbeam_channel::unbounded();
        let (cmd_tx, cmd_rx) = unbounded_channel();
        let dash = Dashboard::new(&Config::default(), rx, cmd_tx, Visibility::Visible);
        (dash, cmd_rx)
    }

    fn batch(samples: &[i64], peaks: &[i64]) -> PollBatch {
        PollBatch {
            data: samples
                .iter()
                .map(|&t| Sample { timestamp: t, value: 0.1 })
                .collect(),
            peaks: peaks
                .iter()
                .map(|&t| Peak { timestamp: t, magnitude: 0.9 })
                .collect(),
        }
    }

    fn peak_event(timestamp: i64, ipi: f64) -> PulseUpdate {
        PulseUpdate::Stream(StreamEvent::Peak(PeakEvent {
            timestamp,
            ipi: Some(ipi),
        }))
    }

    #[test]
    fn test_start_requests_seed() {
        let (mut dash, mut cmds) = dashboard();
        dash.start();
        assert_eq!(cmds.try_recv().ok(), Some(AcquisitionCommand::Seed));
        assert!(cmds.try_recv().is_err());
    }

    #[test]
    fn test_batch_filters_peaks_to_visible_range() {
        let (mut dash, _cmds) = dashboard();
        dash.update(PulseUpdate::Batch(batch(&[200, 300, 400], &[100, 250, 300])));

        assert_eq!(dash.store.raw().len(), 3);
        let peaks: Vec<i64> = dash.store.peaks().iter().map(|p| p.timestamp).collect();
        assert_eq!(peaks, vec![250, 300]);
        assert!(dash.store.ipi().is_empty());
    }

    #[test]
    fn test_seed_then_stream() {
        let (mut dash, _cmds) = dashboard();
        dash.update(PulseUpdate::Seed(batch(&[1000, 2000, 3500], &[1000, 2000, 3500])));
        assert_eq!(dash.store.ipi().len(), 2);

        dash.update(peak_event(4500, 1000.0));

        let times: Vec<i64> = dash.store.ipi().iter().map(|p| p.timestamp).collect();
        assert_eq!(times, vec![2000, 3500, 4500]);
        assert_eq!(dash.store.power().last().map(|p| p.watts), Some(3600.0));
    }

    #[test]
    fn test_stream_then_late_seed() {
        let (mut dash, _cmds) = dashboard();
        for t in [1000, 2000, 3000] {
            dash.update(PulseUpdate::Stream(StreamEvent::Peak(PeakEvent {
                timestamp: t,
                ipi: None,
            })));
        }
        dash.update(PulseUpdate::Seed(batch(&[1000, 2000], &[1000, 2000])));
        dash.update(PulseUpdate::Stream(StreamEvent::Peak(PeakEvent {
            timestamp: 4000,
            ipi: None,
        })));

        assert_eq!(
            dash.store.ipi().last().map(|p| (p.timestamp, p.interval)),
            Some((4000, 1000))
        );
        assert_eq!(dash.store.power().last().map(|p| p.watts), Some(3600.0));
    }

    #[test]
    fn test_stream_skips_invalid_and_duplicate_peaks() {
        let (mut dash, _cmds) = dashboard();
        dash.update(peak_event(1000, 0.0));
        dash.update(peak_event(2000, -5.0));
        dash.update(peak_event(3000, 1000.0));
        dash.update(peak_event(3000, 1000.0));

        assert_eq!(dash.store.ipi().len(), 1);
        assert_eq!(dash.store.power().len(), 1);
    }

    #[test]
    fn test_regain_visibility_resets_and_reseeds() {
        let (mut dash, mut cmds) = dashboard();
        dash.update(PulseUpdate::Seed(batch(&[1000, 2000], &[1000, 2000])));
        assert_eq!(dash.store.ipi().len(), 1);

        dash.update(PulseUpdate::Visibility(Visibility::Hidden));
        assert!(cmds.try_recv().is_err());
        assert_eq!(dash.store.raw().len(), 2);

        dash.update(PulseUpdate::Visibility(Visibility::Visible));
        assert_eq!(cmds.try_recv().ok(), Some(AcquisitionCommand::Seed));
        assert!(dash.store.raw().is_empty());
        assert!(dash.store.peaks().is_empty());
        assert_eq!(dash.store.ipi().len(), 1);
        assert_eq!(dash.visibility(), Visibility::Visible);
    }

    #[test]
    fn test_stream_state_tracking() {
        let (mut dash, _cmds) = dashboard();
        dash.update(PulseUpdate::Stream(StreamEvent::Open));
        assert_eq!(dash.stream_state(), ReadyState::Open);
        dash.update(PulseUpdate::Stream(StreamEvent::Message("diag".into())));
        assert_eq!(dash.stream_state(), ReadyState::Open);
        // Server-named error on a live connection
        let named = SseEvent { event: "error".into(), data: "busy".into(), id: None };
        if let Ok(Some(event)) = StreamEvent::from_sse(&named) {
            dash.update(PulseUpdate::Stream(event));
        }
        assert_eq!(dash.stream_state(), ReadyState::Open);
        dash.update(PulseUpdate::Stream(StreamEvent::Error(ReadyState::Connecting)));
        assert_eq!(dash.stream_state(), ReadyState::Connecting);
    }

    #[test]
    fn test_energy_and_status_line() {
        let (mut dash, _cmds) = dashboard();
        assert!(status_line(&dash.store).contains("raw 0 pts"));

        dash.update(PulseUpdate::Seed(batch(&[0, 1000], &[0, 1000])));
        dash.update(PulseUpdate::Energy(Sample { timestamp: 5, value: 12.5 }));

        let line = status_line(&dash.store);
        assert!(line.contains("raw 2 pts over 1.0s"));
        assert!(line.contains("power 3600 W"));
        assert!(line.contains("energy 12.5"));
    }

    #[test]
    fn test_run_exits_on_shutdown() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (cmd_tx, mut cmd_rx) = unbounded_channel();
        let dash = Dashboard::new(&Config::default(), rx, cmd_tx, Visibility::Hidden);

        tx.send(PulseUpdate::Batch(batch(&[1], &[]))).expect("open channel");
        tx.send(PulseUpdate::Shutdown).expect("open channel");
        dash.run();

        assert_eq!(cmd_rx.try_recv().ok(), Some(AcquisitionCommand::Seed));
        assert_eq!(cmd_rx.try_recv().ok(), Some(AcquisitionCommand::Shutdown));
    }
}
