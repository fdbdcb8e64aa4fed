//! # Visible Range Module
//!
//! Works out which part of the raw signal a chart is showing. Peak markers
//! left of that edge are not kept for display.
//!
//! Without a configured window the chart shows every retained raw sample, so
//! the left edge is the oldest sample. With a window the edge is the newest
//! sample minus the window length, but never before the oldest sample.

use crate::timeseries::{BoundedSeries, Sample};
use serde::{Deserialize, Serialize};

/// Time window duration for chart display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartWindow {
    /// 10 seconds
    TenSeconds,
    /// 30 seconds
    ThirtySeconds,
    /// 60 seconds
    OneMinute,
    /// 120 seconds
    TwoMinutes,
}

impl ChartWindow {
    /// Get the duration in milliseconds
    pub fn as_millis(&self) -> i64 {
        match self {
            ChartWindow::TenSeconds => 10_000,
            ChartWindow::ThirtySeconds => 30_000,
            ChartWindow::OneMinute => 60_000,
            ChartWindow::TwoMinutes => 120_000,
        }
    }
}

/// Left edge of the raw chart's time axis, `None` while the series is empty
pub fn visible_range_start(raw: &BoundedSeries<Sample>, window: Option<ChartWindow>) -> Option<i64> {
    let oldest = raw.first()?.timestamp;
    let newest = raw.last()?.timestamp;

    match window {
        Some(w) => Some(oldest.max(newest.saturating_sub(w.as_millis()))),
        None => Some(oldest),
    }
}
