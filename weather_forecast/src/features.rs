//! Feature engineering for the forecasting model
//!
//! The target is smoothed with a non-adjusted exponentially weighted mean,
//! humidity is lagged by one row and a trailing rolling mean is taken over
//! the smoothed target. Remaining gaps are filled backward, then forward.

use crate::data::ObservationTable;
use crate::error::{ForecastError, Result};
use chrono::NaiveDateTime;
use forecast_math::fill::fill_gaps;
use forecast_math::moving_averages::{ewma, rolling_mean, shift};
use std::fmt;
use tracing::debug;

/// Extra regressors supplied to the model alongside the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Covariate {
    /// Humidity observed on the same row
    Humidity,
    /// Humidity from the previous row
    HumidityLag1,
    /// Trailing mean of the smoothed target
    TempRolling3,
}

impl Covariate {
    /// Every covariate, in column order
    pub const ALL: [Covariate; 3] = [
        Covariate::Humidity,
        Covariate::HumidityLag1,
        Covariate::TempRolling3,
    ];

    /// Column name of the covariate
    pub fn name(&self) -> &'static str {
        match self {
            Covariate::Humidity => "humidity",
            Covariate::HumidityLag1 => "humidity_lag1",
            Covariate::TempRolling3 => "temp_rolling3",
        }
    }
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Covariate values for one timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Covariates {
    pub humidity: f64,
    pub humidity_lag1: f64,
    pub temp_rolling3: f64,
}

impl Covariates {
    /// Get the value of one covariate
    pub fn get(&self, covariate: Covariate) -> f64 {
        match covariate {
            Covariate::Humidity => self.humidity,
            Covariate::HumidityLag1 => self.humidity_lag1,
            Covariate::TempRolling3 => self.temp_rolling3,
        }
    }
}

/// One fully populated training row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub ds: NaiveDateTime,
    /// Smoothed target
    pub y: f64,
    pub covariates: Covariates,
}

/// Gap-free training table ordered by timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    rows: Vec<Observation>,
}

impl FeatureTable {
    /// Create a table from rows ordered by strictly increasing timestamp
    pub fn new(rows: Vec<Observation>) -> Result<Self> {
        if rows.is_empty() {
            return Err(ForecastError::DataError("Feature table is empty".to_string()));
        }
        if rows.windows(2).any(|pair| pair[0].ds >= pair[1].ds) {
            return Err(ForecastError::DataError(
                "Feature rows must have strictly increasing timestamps".to_string(),
            ));
        }
        let finite = rows.iter().all(|row| {
            row.y.is_finite()
                && Covariate::ALL
                    .iter()
                    .all(|&c| row.covariates.get(c).is_finite())
        });
        if !finite {
            return Err(ForecastError::DataError(
                "Feature table contains non-finite values".to_string(),
            ));
        }

        Ok(Self { rows })
    }

    /// Get the rows
    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    /// Get the timestamps
    pub fn dates(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|row| row.ds).collect()
    }

    /// Get the smoothed target
    pub fn targets(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.y).collect()
    }

    /// Get one covariate column
    pub fn column(&self, covariate: Covariate) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.covariates.get(covariate))
            .collect()
    }

    /// First timestamp
    pub fn first_date(&self) -> NaiveDateTime {
        self.rows[0].ds
    }

    /// Last timestamp
    pub fn last_date(&self) -> NaiveDateTime {
        self.rows[self.rows.len() - 1].ds
    }

    /// Last row
    pub fn last(&self) -> &Observation {
        &self.rows[self.rows.len() - 1]
    }

    /// Rows at or before `cutoff`
    pub fn until(&self, cutoff: NaiveDateTime) -> Result<FeatureTable> {
        let rows: Vec<Observation> = self
            .rows
            .iter()
            .filter(|row| row.ds <= cutoff)
            .copied()
            .collect();
        if rows.is_empty() {
            return Err(ForecastError::DataError(format!(
                "No observations at or before {}",
                cutoff
            )));
        }
        Ok(Self { rows })
    }

    /// Rows strictly after `start` and at or before `end`
    pub fn between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<Observation> {
        self.rows
            .iter()
            .filter(|row| row.ds > start && row.ds <= end)
            .copied()
            .collect()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Derives the smoothed target and model covariates from raw observations
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEngineer {
    span: f64,
    rolling_window: usize,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self {
            span: 5.0,
            rolling_window: 3,
        }
    }
}

impl FeatureEngineer {
    /// Create a feature engineer with the default smoothing span and window
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the smoothing span
    pub fn with_span(mut self, span: f64) -> Result<Self> {
        if !span.is_finite() || span < 1.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Smoothing span must be at least 1, got {}",
                span
            )));
        }
        self.span = span;
        Ok(self)
    }

    /// Set the rolling mean window
    pub fn with_rolling_window(mut self, window: usize) -> Result<Self> {
        if window == 0 {
            return Err(ForecastError::InvalidParameter(
                "Rolling window must be positive".to_string(),
            ));
        }
        self.rolling_window = window;
        Ok(self)
    }

    /// Smoothing span
    pub fn span(&self) -> f64 {
        self.span
    }

    /// Rolling mean window
    pub fn rolling_window(&self) -> usize {
        self.rolling_window
    }

    /// Build the training table
    pub fn transform(&self, table: &ObservationTable) -> Result<FeatureTable> {
        let smoothed = ewma(&table.targets(), self.span)?;
        let humidity = table.humidity();
        let humidity_lag1 = shift(&humidity, 1);
        let rolling = rolling_mean(&smoothed, self.rolling_window)?;

        let y = Self::filled("y", &smoothed)?;
        let humidity = Self::filled(Covariate::Humidity.name(), &humidity)?;
        let humidity_lag1 = Self::filled(Covariate::HumidityLag1.name(), &humidity_lag1)?;
        let temp_rolling3 = Self::filled(Covariate::TempRolling3.name(), &rolling)?;

        let rows = table
            .records()
            .iter()
            .enumerate()
            .map(|(i, record)| Observation {
                ds: record.ds,
                y: y[i],
                covariates: Covariates {
                    humidity: humidity[i],
                    humidity_lag1: humidity_lag1[i],
                    temp_rolling3: temp_rolling3[i],
                },
            })
            .collect();

        debug!(
            rows = table.len(),
            span = self.span,
            window = self.rolling_window,
            "engineered features"
        );
        FeatureTable::new(rows)
    }

    fn filled(name: &str, values: &[Option<f64>]) -> Result<Vec<f64>> {
        fill_gaps(values).map_err(|_| {
            ForecastError::DataError(format!(
                "Column '{}' has no values to fill gaps from ({} rows)",
                name,
                values.len()
            ))
        })
    }
}
