//! Piecewise-linear trend with changepoints

use crate::error::{ForecastError, Result};
use chrono::{Duration, NaiveDateTime};

/// Maps timestamps onto `[0, 1]` over the training history
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TimeScale {
    start: NaiveDateTime,
    span_seconds: f64,
}

impl TimeScale {
    pub(crate) fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        let span_seconds = (end - start).num_milliseconds() as f64 / 1000.0;
        if span_seconds <= 0.0 {
            return Err(ForecastError::ModelError(
                "History must span more than one timestamp".to_string(),
            ));
        }
        Ok(Self {
            start,
            span_seconds,
        })
    }

    pub(crate) fn scale(&self, ds: NaiveDateTime) -> f64 {
        (ds - self.start).num_milliseconds() as f64 / 1000.0 / self.span_seconds
    }

    pub(crate) fn unscale(&self, t: f64) -> NaiveDateTime {
        self.start + Duration::milliseconds((t * self.span_seconds * 1000.0).round() as i64)
    }
}

/// Potential changepoints at evenly spaced rows of the first
/// `changepoint_range` share of the history.
///
/// `t` must be sorted. The count shrinks to fit the eligible rows.
pub(crate) fn select_changepoints(t: &[f64], n_changepoints: usize, changepoint_range: f64) -> Vec<f64> {
    let hist_size = (t.len() as f64 * changepoint_range).floor() as usize;
    let n = n_changepoints.min(hist_size.saturating_sub(1));
    if n == 0 {
        return Vec::new();
    }

    let last = (hist_size - 1) as f64;
    (1..=n)
        .map(|i| {
            let index = (i as f64 * last / n as f64).round() as usize;
            t[index.min(t.len() - 1)]
        })
        .collect()
}

/// Trend design row: slope, offset and one hinge per changepoint
pub(crate) fn design_row(t: f64, changepoints: &[f64]) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + changepoints.len());
    row.push(t);
    row.push(1.0);
    row.extend(
        changepoints
            .iter()
            .map(|&s| if t >= s { t - s } else { 0.0 }),
    );
    row
}

/// Evaluate the trend at `t`
pub(crate) fn piecewise_linear(t: f64, k: f64, m: f64, deltas: &[f64], changepoints: &[f64]) -> f64 {
    let mut value = k * t + m;
    for (&s, &delta) in changepoints.iter().zip(deltas) {
        if t >= s {
            value += delta * (t - s);
        }
    }
    value
}

/// Slope and offset of the line through the first and last points
pub(crate) fn initial_line(t: &[f64], y: &[f64]) -> (f64, f64) {
    let (first, last) = (0, t.len() - 1);
    let dt = t[last] - t[first];
    let k = if dt > 0.0 { (y[last] - y[first]) / dt } else { 0.0 };
    (k, y[first] - k * t[first])
}
