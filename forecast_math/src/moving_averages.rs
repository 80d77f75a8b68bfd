//! Moving average calculation implementations
//!
//! Contains the two windows the feature pipeline relies on:
//! - Simple Moving Average (SMA) over a trailing window of rows
//! - Exponential Moving Average (EMA) parameterised by span, in the
//!   recursive (non-adjusted) form
//!
//! Both come as streaming structs plus batch helpers that work on columns
//! with gaps (`Option<f64>`).

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Simple Moving Average (SMA) implementation
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    /// Create a new Simple Moving Average with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Update the SMA with a new value
    pub fn update(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum += value;

        // Remove oldest value if we have more than period values
        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }
    }

    /// Get the current SMA value
    pub fn value(&self) -> Result<f64> {
        if self.values.len() < self.period {
            return Err(MathError::InsufficientData(format!(
                "Not enough data for SMA calculation. Need {} values, have {}.",
                self.period,
                self.values.len()
            )));
        }

        Ok(self.sum / self.period as f64)
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the SMA, clearing all values
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}

/// Exponential Moving Average (EMA) implementation
///
/// The smoothing factor is derived from the span as `2 / (span + 1)`. The
/// first value seeds the average, after which
/// `ema = alpha * value + (1 - alpha) * ema`.
///
/// Missing values are skipped with [`skip`](Self::skip): the average is
/// carried but its weight keeps decaying, so the next value is combined as
/// `(w * ema + alpha * value) / (w + alpha)` with `w = (1 - alpha)^(gaps + 1)`.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    span: f64,
    alpha: f64,
    current_ema: Option<f64>,
    old_weight: f64,
}

impl ExponentialMovingAverage {
    /// Create a new Exponential Moving Average with the specified span
    pub fn new(span: f64) -> Result<Self> {
        if !span.is_finite() || span < 1.0 {
            return Err(MathError::InvalidInput(format!(
                "Span must be at least 1, got {}",
                span
            )));
        }

        Ok(Self {
            span,
            alpha: 2.0 / (span + 1.0),
            current_ema: None,
            old_weight: 1.0,
        })
    }

    /// Update the EMA with a new value and return the smoothed value
    pub fn update(&mut self, value: f64) -> f64 {
        let next = match self.current_ema {
            None => value,
            Some(current) => {
                let weight = self.old_weight * (1.0 - self.alpha);
                (weight * current + self.alpha * value) / (weight + self.alpha)
            }
        };
        self.current_ema = Some(next);
        self.old_weight = 1.0;
        next
    }

    /// Step over a missing value, returning the carried average if any
    pub fn skip(&mut self) -> Option<f64> {
        if self.current_ema.is_some() {
            self.old_weight *= 1.0 - self.alpha;
        }
        self.current_ema
    }

    /// Get the current EMA value
    pub fn value(&self) -> Result<f64> {
        self.current_ema.ok_or_else(|| {
            MathError::InsufficientData("EMA has not seen any values yet".to_string())
        })
    }

    /// Smoothing factor derived from the span
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Get the configured span
    pub fn span(&self) -> f64 {
        self.span
    }

    /// Reset the EMA, clearing its state
    pub fn reset(&mut self) {
        self.current_ema = None;
        self.old_weight = 1.0;
    }
}

/// Exponentially smooth a column that may contain gaps.
///
/// A gap repeats the last smoothed value while the weight of the history
/// keeps decaying. Only gaps before the first observation stay empty.
pub fn ewma(values: &[Option<f64>], span: f64) -> Result<Vec<Option<f64>>> {
    let mut ema = ExponentialMovingAverage::new(span)?;

    Ok(values
        .iter()
        .map(|value| match value {
            Some(v) => Some(ema.update(*v)),
            None => ema.skip(),
        })
        .collect())
}

/// Trailing mean over `window` rows.
///
/// The mean is only defined once the window holds `window` observed values;
/// a gap restarts the window.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>> {
    let mut sma = SimpleMovingAverage::new(window)?;

    Ok(values
        .iter()
        .map(|value| match value {
            Some(v) => {
                sma.update(*v);
                sma.value().ok()
            }
            None => {
                sma.reset();
                None
            }
        })
        .collect())
}

/// Shift a column down by `lag` rows, leaving gaps at the top.
pub fn shift<T: Copy>(values: &[Option<T>], lag: usize) -> Vec<Option<T>> {
    (0..values.len())
        .map(|i| if i < lag { None } else { values[i - lag] })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma_calculation() {
        let mut sma = SimpleMovingAverage::new(3).unwrap();

        // Not enough data yet
        assert!(sma.value().is_err());

        sma.update(2.0);
        sma.update(4.0);
        assert!(sma.value().is_err());

        sma.update(6.0);
        assert_eq!(sma.value().unwrap(), 4.0); // (2 + 4 + 6) / 3 = 4

        // The window slides, dropping the oldest value
        sma.update(8.0);
        assert_eq!(sma.value().unwrap(), 6.0); // (4 + 6 + 8) / 3 = 6
    }

    #[test]
    fn test_ema_span_five() {
        let mut ema = ExponentialMovingAverage::new(5.0).unwrap();
        assert!(ema.value().is_err());
        assert_relative_eq!(ema.alpha(), 1.0 / 3.0);

        assert_eq!(ema.update(9.0), 9.0);
        // 1/3 * 12 + 2/3 * 9 = 10
        assert_relative_eq!(ema.update(12.0), 10.0, epsilon = 1e-12);
        assert_relative_eq!(ema.value().unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ema_rejects_small_span() {
        assert!(ExponentialMovingAverage::new(0.5).is_err());
        assert!(ExponentialMovingAverage::new(f64::NAN).is_err());
    }

    #[test]
    fn test_ewma_carries_across_gaps() {
        let smoothed = ewma(&[None, Some(10.0), None, Some(16.0), Some(12.0)], 5.0).unwrap();
        assert_eq!(smoothed[0], None);
        assert_eq!(smoothed[1], Some(10.0));
        assert_eq!(smoothed[2], Some(10.0));
        // w = (2/3)^2, (4/9 * 10 + 1/3 * 16) / (4/9 + 1/3) = 88/7
        assert_relative_eq!(smoothed[3].unwrap(), 88.0 / 7.0, epsilon = 1e-12);
        // back to the plain recursion once the gap is absorbed
        assert_relative_eq!(
            smoothed[4].unwrap(),
            2.0 / 3.0 * 88.0 / 7.0 + 12.0 / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_ewma_without_gaps_matches_streaming() {
        let values = [4.0, 8.0, 6.0, 7.0];
        let mut ema = ExponentialMovingAverage::new(3.0).unwrap();
        let expected: Vec<Option<f64>> = values.iter().map(|&v| Some(ema.update(v))).collect();
        let smoothed = ewma(&values.map(Some), 3.0).unwrap();
        assert_eq!(smoothed, expected);
    }

    #[test]
    fn test_rolling_mean_restarts_after_gap() {
        let values = [Some(1.0), Some(2.0), Some(3.0), Some(4.0), None, Some(5.0)];
        let means = rolling_mean(&values, 3).unwrap();
        assert_eq!(means, vec![None, None, Some(2.0), Some(3.0), None, None]);
    }

    #[test]
    fn test_shift() {
        let shifted = shift(&[Some(1.0), Some(2.0), None], 1);
        assert_eq!(shifted, vec![None, Some(1.0), Some(2.0)]);
    }
}
