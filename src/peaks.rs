//! # Peak Stream Reducer
//!
//! Turns peak timestamps into inter-peak intervals. Works in two modes:
//!
//! 1. Snapshot: a full peak list from a poll response, reduced pair by pair.
//!    Only the most recent pairs seed the derived series.
//! 2. Streaming: one peak at a time, paired with the last peak seen.
//!
//! Zero or negative intervals come from duplicate detections and overlapping
//! batches. They are skipped, never reported as errors.

use crate::timeseries::{IpiPoint, Peak};

/// Default number of peak pairs used to backfill the derived series
pub const DEFAULT_SEED_PAIRS: usize = 10;

/// Reduce consecutive peak pairs to IPI points, skipping non-positive intervals.
pub fn intervals(peaks: &[Peak]) -> Vec<IpiPoint> {
    peaks
        .windows(2)
        .filter_map(|pair| {
            let interval = pair[1].timestamp.checked_sub(pair[0].timestamp)?;
            (interval > 0).then_some(IpiPoint {
                timestamp: pair[1].timestamp,
                interval,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PeakReducer {
    last_peak: Option<i64>,
    seed_pairs: usize,
}

impl PeakReducer {
    pub fn new(seed_pairs: usize) -> Self {
        Self {
            last_peak: None,
            seed_pairs,
        }
    }

    pub fn last_peak(&self) -> Option<i64> {
        self.last_peak
    }

    /// Bootstrap from a snapshot: IPI points for the last `seed_pairs` pairs.
    ///
    /// The snapshot's final peak becomes the pairing partner for the next
    /// streamed peak, unless a streamed peak is already newer. An empty
    /// snapshot leaves the reducer untouched.
    pub fn seed(&mut self, peaks: &[Peak]) -> Vec<IpiPoint> {
        let Some(last) = peaks.last() else {
            return Vec::new();
        };
        self.last_peak = Some(
            self.last_peak
                .map_or(last.timestamp, |seen| seen.max(last.timestamp)),
        );

        let tail = &peaks[peaks.len().saturating_sub(self.seed_pairs + 1)..];
        intervals(tail)
    }

    /// Accept one streamed peak.
    ///
    /// `reported_ipi` is the interval the backend computed, if it sent one;
    /// otherwise the distance to the last peak is used. The last-peak state
    /// moves to `timestamp` even when nothing is emitted.
    pub fn accept(&mut self, timestamp: i64, reported_ipi: Option<i64>) -> Option<IpiPoint> {
        let previous = self.last_peak.replace(timestamp);

        if let Some(prev) = previous {
            if timestamp <= prev {
                log::debug!("Dropping peak at {} (last peak {})", timestamp, prev);
                return None;
            }
        }

        let interval = match (reported_ipi, previous) {
            (Some(ipi), _) => ipi,
            (None, Some(prev)) => timestamp.checked_sub(prev)?,
            (None, None) => return None,
        };

        (interval > 0).then_some(IpiPoint { timestamp, interval })
    }
}

impl Default for PeakReducer {
    fn default() -> Self {
        Self::new(DEFAULT_SEED_PAIRS)
    }
}
