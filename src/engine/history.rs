//! Derived time-series tracking.
//!
//! A history is an ordered list of `(timestamp, value)` points. The last point
//! may be *volatile* (negative timestamp): it is overwritten in place on every
//! observation until a large enough change seals it into a permanent point.

use serde::{Deserialize, Serialize};

/// One `(timestamp, value)` sample. Serialized as `[t, v]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint(pub i64, pub f64);

impl HistoryPoint {
    pub fn timestamp(&self) -> i64 {
        self.0.abs()
    }

    pub fn value(&self) -> f64 {
        self.1
    }

    pub fn is_volatile(&self) -> bool {
        self.0 < 0
    }
}

/// Records an observation of `value` at `timestamp`.
///
/// Overwrites a trailing volatile point, or appends a new one.
pub fn update(value: f64, history: &mut Vec<HistoryPoint>, timestamp: i64) {
    let point = HistoryPoint(-timestamp, value);
    match history.last_mut() {
        Some(last) if last.is_volatile() => *last = point,
        _ => history.push(point),
    }
}

/// Seals the trailing volatile point when `value` moved at least `threshold`
/// away from the last permanent value, or reached zero.
///
/// Returns `true` when the caller should persist the history.
pub fn checkpoint(value: f64, history: &mut [HistoryPoint], timestamp: i64, threshold: f64) -> bool {
    let len = history.len();
    if len < 2 {
        return false;
    }

    let reference = history[len - 2].value();
    if (value - reference).abs() >= threshold || value == 0.0 {
        history[len - 1].0 = timestamp;
        return true;
    }

    false
}

/// Closes a history when its record is deactivated.
pub fn finalize(history: &mut Vec<HistoryPoint>, timestamp: i64) {
    if history.last().is_some_and(HistoryPoint::is_volatile) {
        history.pop();
    }

    if history.last().is_some_and(|p| p.value() > 0.0) {
        history.push(HistoryPoint(timestamp, 0.0));
    }
}

/// Linear estimate of when a quantity crossed zero between two samples.
///
/// `None` when the samples do not straddle zero. When the polls are at least
/// two seconds apart the estimate lies strictly between them.
pub fn interpolate_zero_crossing(prev: HistoryPoint, value: f64, timestamp: i64) -> Option<i64> {
    let prev_value = prev.value();
    let crossed = (prev_value < 0.0 && value > 0.0) || (prev_value > 0.0 && value < 0.0);
    if !crossed {
        return None;
    }

    let prev_t = prev.timestamp();
    let dt = timestamp - prev_t;
    let dv = value - prev_value;
    let estimate = prev_t - (dt as f64 * prev_value / dv).round() as i64;
    if dt >= 2 {
        Some(estimate.clamp(prev_t + 1, timestamp - 1))
    } else {
        Some(estimate)
    }
}
