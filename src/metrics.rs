//! Interval to power conversion.
//!
//! Calibration: the meter LED flashes once per watt-hour, so one detected
//! peak is 1 Wh and the power over an interval of `t` ms is `3_600_000 / t` W.

/// Milliseconds in one hour, i.e. watts for a 1 Wh peak spread over 1 ms
pub const MS_PER_WATT_HOUR: f64 = 3_600_000.0;

/// Instantaneous power in watts for an inter-peak interval in milliseconds.
///
/// Caller must pass a finite, strictly positive interval.
pub fn to_power(interval_ms: f64) -> f64 {
    debug_assert!(interval_ms.is_finite() && interval_ms > 0.0);
    MS_PER_WATT_HOUR / interval_ms
}

/// Power for an integer interval, or `None` when the interval carries no information.
pub fn checked_power(interval_ms: i64) -> Option<f64> {
    if interval_ms > 0 {
        Some(to_power(interval_ms as f64))
    } else {
        None
    }
}
