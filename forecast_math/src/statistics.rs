//! Accuracy metrics

use crate::{MathError, Result};

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error, as a fraction; zero actuals are skipped
    pub mape: f64,
}

impl std::fmt::Display for ForecastAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics:")?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  MSE:   {:.4}", self.mse)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        writeln!(f, "  MAPE:  {:.4}", self.mape)?;
        Ok(())
    }
}

/// Calculate accuracy metrics for a forecast vs actual values
pub fn forecast_accuracy(forecast: &[f64], actual: &[f64]) -> Result<ForecastAccuracy> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(MathError::InvalidInput(
            "Forecast and actual values must have the same non-zero length".to_string(),
        ));
    }

    let n = forecast.len() as f64;
    let errors: Vec<f64> = forecast
        .iter()
        .zip(actual.iter())
        .map(|(&f, &a)| a - f)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e.powi(2)).sum::<f64>() / n;

    let percentage: Vec<f64> = actual
        .iter()
        .zip(errors.iter())
        .filter(|(&a, _)| a != 0.0)
        .map(|(&a, &e)| e.abs() / a.abs())
        .collect();
    let mape = if percentage.is_empty() {
        f64::NAN
    } else {
        percentage.iter().sum::<f64>() / percentage.len() as f64
    };

    Ok(ForecastAccuracy {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape,
    })
}

/// Root mean squared error between two equally long series
pub fn rmse(forecast: &[f64], actual: &[f64]) -> Result<f64> {
    forecast_accuracy(forecast, actual).map(|accuracy| accuracy.rmse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(&[1.0, 2.0], &[1.0, 2.0], 0.0)]
    #[case(&[2.0, 2.0], &[1.0, 3.0], 1.0)]
    #[case(&[0.0, 0.0], &[3.0, 4.0], 12.5_f64.sqrt())]
    fn test_rmse(#[case] forecast: &[f64], #[case] actual: &[f64], #[case] expected: f64) {
        assert_relative_eq!(rmse(forecast, actual).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_forecast_accuracy() {
        let accuracy = forecast_accuracy(&[1.0, 2.0, 3.0], &[2.0, 2.0, 5.0]).unwrap();
        assert_relative_eq!(accuracy.mae, 1.0);
        assert_relative_eq!(accuracy.mse, 5.0 / 3.0);
        assert_relative_eq!(accuracy.rmse, (5.0f64 / 3.0).sqrt());
        assert_relative_eq!(accuracy.mape, (0.5 + 0.0 + 0.4) / 3.0);
    }

    #[test]
    fn test_forecast_accuracy_length_mismatch() {
        assert!(forecast_accuracy(&[1.0], &[1.0, 2.0]).is_err());
        assert!(rmse(&[], &[]).is_err());
    }
}
