//! # Forecast Math
//!
//! Numerical building blocks shared by the weather forecasting pipeline.
//! This crate provides the smoothing windows, gap filling, penalised
//! least-squares solves and summary statistics the model and the
//! diagnostics are built from.

use thiserror::Error;

pub mod fill;
pub mod linalg;
pub mod moving_averages;
pub mod statistics;

/// Errors that can occur in numerical calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numerical operations
pub type Result<T> = std::result::Result<T, MathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MathError::InsufficientData("need 3 values".to_string());
        assert_eq!(
            err.to_string(),
            "Insufficient data for calculation: need 3 values"
        );
    }
}
