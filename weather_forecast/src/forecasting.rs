//! Future frames and validated forecast tables

use crate::data::format_timestamps;
use crate::error::{ForecastError, Result};
use crate::features::{Covariate, FeatureTable};
use crate::models::{FrameRow, PredictionFrame, TrainedForecastModel};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Columns every forecast must carry
pub const REQUIRED_OUTPUT_COLUMNS: [&str; 4] = ["ds", "yhat", "yhat_lower", "yhat_upper"];

/// History plus future timestamps with their covariates
#[derive(Debug, Clone, PartialEq)]
pub struct FutureFrame {
    rows: Vec<FrameRow>,
}

impl FutureFrame {
    pub fn rows(&self) -> &[FrameRow] {
        &self.rows
    }

    pub fn dates(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|row| row.ds).collect()
    }

    /// One covariate column
    pub fn column(&self, covariate: Covariate) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.covariates.get(covariate))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Extend the model's history by `periods` daily steps.
///
/// Covariates are joined from `table` by timestamp. Timestamps without a
/// match carry the last observed value of each covariate.
pub fn make_future_frame<M: TrainedForecastModel>(
    model: &M,
    table: &FeatureTable,
    periods: usize,
) -> Result<FutureFrame> {
    let dates = model.make_future_dates(periods)?;
    let known: HashMap<NaiveDateTime, _> = table
        .rows()
        .iter()
        .map(|row| (row.ds, row.covariates))
        .collect();
    let last = table.last().covariates;

    let rows: Vec<FrameRow> = dates
        .into_iter()
        .map(|ds| FrameRow {
            ds,
            covariates: known.get(&ds).copied().unwrap_or(last),
        })
        .collect();

    debug!(rows = rows.len(), periods, "built future frame");
    Ok(FutureFrame { rows })
}

/// Predict every row of the frame and validate the output
pub fn generate_forecast<M: TrainedForecastModel>(model: &M, frame: &FutureFrame) -> Result<ForecastTable> {
    let prediction = model.predict(frame.rows())?;
    ForecastTable::from_prediction(prediction)
}

/// One forecast row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastRow {
    pub ds: NaiveDateTime,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// Validated forecast covering history and future
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTable {
    rows: Vec<ForecastRow>,
    columns: Vec<(String, Vec<f64>)>,
}

impl ForecastTable {
    /// Check for the required columns and collect the rows
    pub fn from_prediction(prediction: PredictionFrame) -> Result<Self> {
        for column in REQUIRED_OUTPUT_COLUMNS {
            if !prediction.has_column(column) {
                return Err(ForecastError::MissingOutputColumn {
                    column: column.to_string(),
                });
            }
        }

        let required = |name: &str| {
            prediction
                .column(name)
                .ok_or_else(|| ForecastError::MissingOutputColumn {
                    column: name.to_string(),
                })
        };
        let (yhat, lower, upper) = (required("yhat")?, required("yhat_lower")?, required("yhat_upper")?);

        let rows = prediction
            .dates()
            .iter()
            .enumerate()
            .map(|(i, &ds)| ForecastRow {
                ds,
                yhat: yhat[i],
                yhat_lower: lower[i],
                yhat_upper: upper[i],
            })
            .collect();

        Ok(Self {
            rows,
            columns: prediction.columns().to_vec(),
        })
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    /// Every value column in predictor order
    pub fn columns(&self) -> &[(String, Vec<f64>)] {
        &self.columns
    }

    /// Rows strictly after `last_ds`, at most `periods` of them
    pub fn after(&self, last_ds: NaiveDateTime, periods: usize) -> Vec<ForecastRow> {
        self.rows
            .iter()
            .filter(|row| row.ds > last_ds)
            .take(periods)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All columns as a DataFrame, `ds` first as formatted text
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let dates: Vec<NaiveDateTime> = self.rows.iter().map(|row| row.ds).collect();
        let mut series = Vec::with_capacity(self.columns.len() + 1);
        series.push(Series::new("ds", format_timestamps(&dates)));
        for (name, values) in &self.columns {
            series.push(Series::new(name, values.as_slice()));
        }
        Ok(DataFrame::new(series)?)
    }
}
