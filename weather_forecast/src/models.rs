//! Forecasting models for the smoothed temperature series

use crate::error::{ForecastError, Result};
use crate::features::{Covariates, FeatureTable};
use chrono::NaiveDateTime;

/// A timestamp to predict, with the covariates known for it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRow {
    pub ds: NaiveDateTime,
    pub covariates: Covariates,
}

/// Column-oriented predictor output aligned to the requested timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionFrame {
    ds: Vec<NaiveDateTime>,
    columns: Vec<(String, Vec<f64>)>,
}

impl PredictionFrame {
    /// Create an empty frame for the given timestamps
    pub fn new(ds: Vec<NaiveDateTime>) -> Self {
        Self {
            ds,
            columns: Vec::new(),
        }
    }

    /// Append a column, replacing any existing column with the same name
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.ds.len() {
            return Err(ForecastError::ModelError(format!(
                "Column '{}' has {} values for {} timestamps",
                name,
                values.len(),
                self.ds.len()
            )));
        }

        match self.columns.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, column)) => *column = values,
            None => self.columns.push((name, values)),
        }
        Ok(())
    }

    /// Builder form of [`PredictionFrame::push_column`]
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.push_column(name, values)?;
        Ok(self)
    }

    /// Remove a column, returning its values
    pub fn remove_column(&mut self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|(existing, _)| existing == name)?;
        Some(self.columns.remove(index).1)
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Check if a column exists. The timestamp column is always present.
    pub fn has_column(&self, name: &str) -> bool {
        name == "ds" || self.column(name).is_some()
    }

    /// Value columns in insertion order
    pub fn columns(&self) -> &[(String, Vec<f64>)] {
        &self.columns
    }

    /// Timestamps
    pub fn dates(&self) -> &[NaiveDateTime] {
        &self.ds
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.ds.len()
    }
}

/// Common interface for forecasting models
pub trait ForecastModel: Clone + Send + Sync {
    /// Model produced by training
    type Trained: TrainedForecastModel;

    /// Train the model on a feature table
    fn train(&self, history: &FeatureTable) -> Result<Self::Trained>;

    /// Get the model name
    fn name(&self) -> &str;
}

/// Interface for trained models
pub trait TrainedForecastModel: Send + Sync {
    /// Untrained configuration this model was produced from
    type Model: ForecastModel;

    /// Get the configuration, for refitting on other windows
    fn model(&self) -> &Self::Model;

    /// Predict every requested timestamp.
    ///
    /// The output carries at least `yhat`, `yhat_lower` and `yhat_upper`.
    fn predict(&self, rows: &[FrameRow]) -> Result<PredictionFrame>;

    /// Table the model was trained on
    fn history(&self) -> &FeatureTable;

    /// Training timestamps followed by `periods` future timestamps
    fn make_future_dates(&self, periods: usize) -> Result<Vec<NaiveDateTime>>;

    /// Get the model name
    fn name(&self) -> &str;
}

pub mod decomposition;
pub mod params;
pub(crate) mod seasonality;
pub(crate) mod trend;
pub(crate) mod uncertainty;

pub use decomposition::{DecompositionModel, TrainedDecomposition};
pub use params::{Hyperparameters, ModelSettings, SeasonalityMode};
pub use seasonality::Seasonality;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_prediction_frame_columns() {
        let mut frame = PredictionFrame::new(dates(2))
            .with_column("trend", vec![1.0, 2.0])
            .unwrap()
            .with_column("yhat", vec![3.0, 4.0])
            .unwrap();

        assert!(frame.has_column("ds"));
        assert_eq!(frame.column("yhat"), Some(&[3.0, 4.0][..]));
        assert!(frame.push_column("yhat", vec![1.0]).is_err());

        frame.push_column("yhat", vec![5.0, 6.0]).unwrap();
        assert_eq!(frame.columns().len(), 2);
        assert_eq!(frame.remove_column("yhat"), Some(vec![5.0, 6.0]));
        assert!(!frame.has_column("yhat"));
        assert_eq!(frame.height(), 2);
    }
}
