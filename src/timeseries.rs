//! # Series Store Module
//!
//! Bounded, ordered series that a chart renderer reads from. The store owns
//! every sequence; acquisition and reduction code only go through its
//! append/replace/seed/reset methods.
//!
//! ## Series
//! - `raw`: sensor samples, sliding window (oldest evicted first)
//! - `peaks`: peak markers inside the raw chart's visible range
//! - `ipi` / `power`: derived series, kept pairwise in step
//! - `energy`: legacy `/energy` readings

use crate::metrics::checked_power;
use crate::visualization::{self, ChartWindow};
use serde::Deserialize;
use std::collections::VecDeque;

pub const DEFAULT_RAW_CAPACITY: usize = 1200;
pub const DEFAULT_PEAK_CAPACITY: usize = 1200;
pub const DEFAULT_ENERGY_CAPACITY: usize = 40;

/// Anything plotted against an epoch-ms time axis
pub trait Timed {
    fn time(&self) -> i64;
    fn value(&self) -> f64;
}

/// One raw sensor reading. Wire form is `[timestampMs, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "(i64, f64)")]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl From<(i64, f64)> for Sample {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

/// A detected local maximum. Wire form is `[timestampMs, magnitude]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "(i64, f64)")]
pub struct Peak {
    pub timestamp: i64,
    pub magnitude: f64,
}

impl From<(i64, f64)> for Peak {
    fn from((timestamp, magnitude): (i64, f64)) -> Self {
        Self { timestamp, magnitude }
    }
}

/// Interval between two consecutive peaks, stamped with the later one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpiPoint {
    pub timestamp: i64,
    pub interval: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerPoint {
    pub timestamp: i64,
    pub watts: f64,
}

impl PowerPoint {
    /// `None` when the interval is not positive; such points never get a power value.
    pub fn from_ipi(ipi: &IpiPoint) -> Option<Self> {
        checked_power(ipi.interval).map(|watts| Self {
            timestamp: ipi.timestamp,
            watts,
        })
    }
}

impl Timed for Sample {
    fn time(&self) -> i64 {
        self.timestamp
    }
    fn value(&self) -> f64 {
        self.value
    }
}

impl Timed for Peak {
    fn time(&self) -> i64 {
        self.timestamp
    }
    fn value(&self) -> f64 {
        self.magnitude
    }
}

impl Timed for IpiPoint {
    fn time(&self) -> i64 {
        self.timestamp
    }
    fn value(&self) -> f64 {
        self.interval as f64
    }
}

impl Timed for PowerPoint {
    fn time(&self) -> i64 {
        self.timestamp
    }
    fn value(&self) -> f64 {
        self.watts
    }
}

/// Append-only series with an optional sliding-window cap
#[derive(Debug, Clone)]
pub struct BoundedSeries<T> {
    data: VecDeque<T>,
    capacity: Option<usize>,
}

impl<T> BoundedSeries<T> {
    pub fn new(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity.unwrap_or(0)),
            capacity,
        }
    }

    pub fn push(&mut self, point: T) {
        self.data.push_back(point);
        if let Some(cap) = self.capacity {
            while self.data.len() > cap {
                self.data.pop_front();
            }
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Clear, then push every point (cap still applies)
    pub fn replace<I: IntoIterator<Item = T>>(&mut self, points: I) {
        self.data.clear();
        for p in points {
            self.push(p);
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.data.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.data.back()
    }

    pub fn last_points(&self, n: usize) -> impl Iterator<Item = &T> {
        self.data.range(self.data.len().saturating_sub(n)..)
    }
}

impl<T: Timed> BoundedSeries<T> {
    pub fn min_max_time(&self) -> Option<(i64, i64)> {
        self.data.iter().fold(None, |acc, point| match acc {
            None => Some((point.time(), point.time())),
            Some((min, max)) => Some((min.min(point.time()), max.max(point.time()))),
        })
    }

    pub fn min_max_value(&self) -> Option<(f64, f64)> {
        self.data.iter().fold(None, |acc, point| match acc {
            None => Some((point.value(), point.value())),
            Some((min, max)) => Some((min.min(point.value()), max.max(point.value()))),
        })
    }
}

/// Per-series retention limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreLimits {
    pub raw: usize,
    pub peaks: usize,
    /// `None` keeps every derived point
    pub derived: Option<usize>,
    pub energy: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            raw: DEFAULT_RAW_CAPACITY,
            peaks: DEFAULT_PEAK_CAPACITY,
            derived: None,
            energy: DEFAULT_ENERGY_CAPACITY,
        }
    }
}

/// Everything the charts display
#[derive(Debug, Clone)]
pub struct SeriesStore {
    raw: BoundedSeries<Sample>,
    peaks: BoundedSeries<Peak>,
    ipi: BoundedSeries<IpiPoint>,
    power: BoundedSeries<PowerPoint>,
    energy: BoundedSeries<Sample>,
}

impl SeriesStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            raw: BoundedSeries::new(limits.raw),
            peaks: BoundedSeries::new(limits.peaks),
            ipi: BoundedSeries::with_capacity(limits.derived),
            power: BoundedSeries::with_capacity(limits.derived),
            energy: BoundedSeries::new(limits.energy),
        }
    }

    pub fn append_raw(&mut self, sample: Sample) {
        self.raw.push(sample);
    }

    /// Drop all peak markers and keep only those at or after `visible_range_start`.
    pub fn replace_peaks(&mut self, peaks: &[Peak], visible_range_start: i64) {
        self.peaks.replace(
            peaks
                .iter()
                .copied()
                .filter(|p| p.timestamp >= visible_range_start),
        );
    }

    /// Append one IPI point and its power value.
    ///
    /// Returns `false` (and stores nothing) when the interval is not positive
    /// or the point is not strictly newer than the last derived point.
    pub fn append_derived(&mut self, point: IpiPoint) -> bool {
        if let Some(last) = self.ipi.last() {
            if point.timestamp <= last.timestamp {
                return false;
            }
        }
        let Some(power) = PowerPoint::from_ipi(&point) else {
            return false;
        };
        self.ipi.push(point);
        self.power.push(power);
        true
    }

    /// Bulk-replace both derived series.
    pub fn seed(&mut self, ipi: Vec<IpiPoint>, power: Vec<PowerPoint>) {
        self.ipi.replace(ipi);
        self.power.replace(power);
    }

    /// Clear raw samples and peak markers; derived history is kept.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.peaks.clear();
    }

    pub fn append_energy(&mut self, reading: Sample) {
        self.energy.push(reading);
    }

    /// Left edge of the raw chart's time axis, if there is any raw data
    pub fn visible_range_start(&self, window: Option<ChartWindow>) -> Option<i64> {
        visualization::visible_range_start(&self.raw, window)
    }

    pub fn raw(&self) -> &BoundedSeries<Sample> {
        &self.raw
    }

    pub fn peaks(&self) -> &BoundedSeries<Peak> {
        &self.peaks
    }

    pub fn ipi(&self) -> &BoundedSeries<IpiPoint> {
        &self.ipi
    }

    pub fn power(&self) -> &BoundedSeries<PowerPoint> {
        &self.power
    }

    pub fn energy(&self) -> &BoundedSeries<Sample> {
        &self.energy
    }
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(StoreLimits::default())
    }
}
