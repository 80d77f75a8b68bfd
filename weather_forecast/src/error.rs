//! Error types for the weather_forecast crate

use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the weather_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Input file does not exist
    #[error("Input file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Tabular input could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A required column is absent after aliasing
    #[error("Missing required column: {column}")]
    SchemaError { column: String },

    /// Timestamp column could not be interpreted as dates
    #[error("Date format error: {0}")]
    DateFormatError(String),

    /// Predictor output lacks a required column
    #[error("Forecast output is missing column: {column}")]
    MissingOutputColumn { column: String },

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Model could not be fitted or evaluated
    #[error("Model error: {0}")]
    ModelError(String),

    /// Hyperparameter search failed as a whole
    #[error("Tuning error: {0}")]
    TuningError(String),

    /// Chart rendering failed
    #[error("Plot error: {0}")]
    PlotError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from numerical routines
    #[error("Math error: {0}")]
    MathError(#[from] forecast_math::MathError),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<polars::prelude::PolarsError> for ForecastError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::DataError(format!("JSON serialization failed: {}", err))
    }
}
