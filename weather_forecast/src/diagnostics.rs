//! Rolling-origin cross-validation and accuracy summaries

use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use crate::models::{ForecastModel, FrameRow, TrainedForecastModel};
use chrono::{Duration, NaiveDateTime};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Window sizes for rolling-origin cross-validation
#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidationConfig {
    /// Minimum training span before the first cutoff
    pub initial: Duration,
    /// Spacing between cutoffs
    pub period: Duration,
    /// Span evaluated after each cutoff
    pub horizon: Duration,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            initial: Duration::days(180),
            period: Duration::days(30),
            horizon: Duration::days(30),
        }
    }
}

impl CrossValidationConfig {
    /// Create a config with positive window sizes
    pub fn new(initial: Duration, period: Duration, horizon: Duration) -> Result<Self> {
        for (name, value) in [("initial", initial), ("period", period), ("horizon", horizon)] {
            if value <= Duration::zero() {
                return Err(ForecastError::InvalidParameter(format!(
                    "Cross-validation {} must be positive",
                    name
                )));
            }
        }
        Ok(Self {
            initial,
            period,
            horizon,
        })
    }

    /// Cutoffs for `dates` under this config
    pub fn cutoffs(&self, dates: &[NaiveDateTime]) -> Result<Vec<NaiveDateTime>> {
        generate_cutoffs(dates, self.horizon, self.period, self.initial)
    }

    /// This config, or one with a shorter initial window when the history is
    /// too short for any cutoff.
    ///
    /// The shrunk window is `span - horizon` and must still be at least one
    /// horizon long.
    pub fn fit_to(&self, dates: &[NaiveDateTime]) -> Result<Self> {
        let original_error = match self.cutoffs(dates) {
            Ok(_) => return Ok(self.clone()),
            Err(e) => e,
        };

        let (first, last) = match (dates.first(), dates.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return Err(original_error),
        };
        let initial = (last - first) - self.horizon;
        if initial < self.horizon {
            return Err(original_error);
        }

        let shrunk = Self {
            initial,
            ..self.clone()
        };
        shrunk.cutoffs(dates)?;
        warn!(
            configured_days = self.initial.num_days(),
            initial_days = initial.num_days(),
            "history too short for the initial window, shrinking it"
        );
        Ok(shrunk)
    }
}

/// Cutoff dates for rolling-origin evaluation, ascending.
///
/// Starts one horizon before the last date and steps back by `period`
/// while at least `initial` of history precedes the cutoff. When a window
/// would hold no observations, the cutoff jumps back to the last date
/// before it.
pub fn generate_cutoffs(
    dates: &[NaiveDateTime],
    horizon: Duration,
    period: Duration,
    initial: Duration,
) -> Result<Vec<NaiveDateTime>> {
    let (first, last) = match (dates.first(), dates.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => {
            return Err(ForecastError::DataError(
                "Cannot generate cutoffs without dates".to_string(),
            ))
        }
    };

    let mut cutoff = last - horizon;
    if cutoff < first {
        return Err(ForecastError::DataError(
            "Less data than horizon".to_string(),
        ));
    }

    let mut result = vec![cutoff];
    while result[result.len() - 1] >= first + initial {
        cutoff = cutoff - period;
        let window_has_data = dates
            .iter()
            .any(|&ds| ds > cutoff && ds <= cutoff + horizon);
        if !window_has_data && cutoff > first {
            if let Some(&closest) = dates.iter().filter(|&&ds| ds <= cutoff).max() {
                cutoff = closest - horizon;
            }
        }
        result.push(cutoff);
    }
    result.pop();

    if result.is_empty() {
        return Err(ForecastError::DataError(
            "Less data than horizon after initial window. Make horizon or initial shorter"
                .to_string(),
        ));
    }

    result.reverse();
    Ok(result)
}

/// One held-out prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CvRow {
    pub ds: NaiveDateTime,
    pub cutoff: NaiveDateTime,
    pub y: f64,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// Refit the model's configuration at each cutoff and predict the horizon
/// that follows it.
///
/// Rows are ordered by cutoff, then timestamp.
pub fn cross_validation<T: TrainedForecastModel>(
    trained: &T,
    config: &CrossValidationConfig,
) -> Result<Vec<CvRow>> {
    let history = trained.history();
    let cutoffs = config.cutoffs(&history.dates())?;
    debug!(folds = cutoffs.len(), "running cross-validation");

    let folds: Vec<Vec<CvRow>> = cutoffs
        .par_iter()
        .map(|&cutoff| evaluate_fold(trained.model(), history, cutoff, config.horizon))
        .collect::<Result<_>>()?;

    Ok(folds.into_iter().flatten().collect())
}

fn evaluate_fold<M: ForecastModel>(
    model: &M,
    history: &FeatureTable,
    cutoff: NaiveDateTime,
    horizon: Duration,
) -> Result<Vec<CvRow>> {
    let train = history.until(cutoff)?;
    if train.len() < 2 {
        return Err(ForecastError::DataError(format!(
            "Fewer than two training rows before cutoff {}",
            cutoff
        )));
    }

    let test = history.between(cutoff, cutoff + horizon);
    let rows: Vec<FrameRow> = test
        .iter()
        .map(|row| FrameRow {
            ds: row.ds,
            covariates: row.covariates,
        })
        .collect();

    let trained = model.train(&train)?;
    let prediction = trained.predict(&rows)?;
    let column = |name: &str| {
        prediction
            .column(name)
            .ok_or_else(|| ForecastError::MissingOutputColumn {
                column: name.to_string(),
            })
    };
    let (yhat, lower, upper) = (column("yhat")?, column("yhat_lower")?, column("yhat_upper")?);

    Ok(test
        .iter()
        .enumerate()
        .map(|(i, row)| CvRow {
            ds: row.ds,
            cutoff,
            y: row.y,
            yhat: yhat[i],
            yhat_lower: lower[i],
            yhat_upper: upper[i],
        })
        .collect())
}

/// Accuracy at one forecast horizon, averaged over a trailing window of
/// horizons
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonMetrics {
    pub horizon: Duration,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    /// Share of actuals inside the predicted interval
    pub coverage: f64,
}

/// Accuracy by horizon.
///
/// Each metric at horizon `h` averages the `rolling_window` share of rows
/// with the nearest horizons at or below `h`, weighting the oldest horizon
/// partially so exactly that many rows contribute.
pub fn performance_metrics(rows: &[CvRow], rolling_window: f64) -> Result<Vec<HorizonMetrics>> {
    if rows.is_empty() {
        return Err(ForecastError::DataError(
            "No cross-validation rows to summarise".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&rolling_window) {
        return Err(ForecastError::InvalidParameter(format!(
            "Rolling window must be within [0, 1], got {}",
            rolling_window
        )));
    }

    let window = ((rolling_window * rows.len() as f64) as usize).max(1);

    // [squared error, absolute error, absolute percentage error, covered] per horizon
    let mut by_horizon: BTreeMap<Duration, ([f64; 4], usize)> = BTreeMap::new();
    for row in rows {
        let error = row.y - row.yhat;
        let percentage = if row.y != 0.0 {
            (error / row.y).abs()
        } else {
            f64::NAN
        };
        let covered = if row.y >= row.yhat_lower && row.y <= row.yhat_upper {
            1.0
        } else {
            0.0
        };

        let (sums, count) = by_horizon.entry(row.ds - row.cutoff).or_default();
        for (sum, value) in sums.iter_mut().zip([error * error, error.abs(), percentage, covered]) {
            *sum += value;
        }
        *count += 1;
    }

    let horizons: Vec<(Duration, [f64; 4], usize)> = by_horizon
        .into_iter()
        .map(|(h, (sums, count))| (h, sums, count))
        .collect();

    let mut metrics = Vec::new();
    for end in 0..horizons.len() {
        let mut sums = [0.0; 4];
        let mut count = 0usize;
        for start in (0..=end).rev() {
            let (_, group_sums, group_count) = &horizons[start];
            let needed = window - count;
            if *group_count >= needed {
                let weight = needed as f64 / *group_count as f64;
                for (sum, group_sum) in sums.iter_mut().zip(group_sums) {
                    *sum += weight * group_sum;
                }
                count = window;
                break;
            }
            for (sum, group_sum) in sums.iter_mut().zip(group_sums) {
                *sum += group_sum;
            }
            count += group_count;
        }

        if count < window {
            continue;
        }
        let n = window as f64;
        let mse = sums[0] / n;
        metrics.push(HorizonMetrics {
            horizon: horizons[end].0,
            mse,
            rmse: mse.sqrt(),
            mae: sums[1] / n,
            mape: sums[2] / n,
            coverage: sums[3] / n,
        });
    }

    Ok(metrics)
}
