//! # Weather Forecast
//!
//! Temperature forecasting from daily observations with a humidity
//! covariate.
//!
//! ## Features
//!
//! - CSV loading with column aliasing and schema/date validation
//! - Feature engineering: exponential smoothing of the target, lagged
//!   humidity, trailing rolling mean
//! - A trend + seasonality decomposition model with extra regressors and
//!   simulated uncertainty intervals
//! - Rolling-origin cross-validation and a TPE hyperparameter search
//! - Future-frame construction, CSV export and chart rendering
//!
//! ## Quick Start
//!
//! ```no_run
//! use weather_forecast::data::DataLoader;
//! use weather_forecast::features::FeatureEngineer;
//! use weather_forecast::forecasting::{generate_forecast, make_future_frame};
//! use weather_forecast::tuning::{Tuner, TunerConfig};
//!
//! # fn main() -> weather_forecast::Result<()> {
//! // Load and validate observations
//! let observations = DataLoader::from_csv("weather.csv")?;
//!
//! // Smooth the target and derive covariates
//! let features = FeatureEngineer::default().transform(&observations)?;
//!
//! // Search hyperparameters and refit the best configuration
//! let tuned = Tuner::new(TunerConfig::default())?.tune(&features)?;
//!
//! // Forecast the next 7 days
//! let frame = make_future_frame(&tuned.model, &features, 7)?;
//! let forecast = generate_forecast(&tuned.model, &frame)?;
//! let next_week = forecast.after(features.last_date(), 7);
//! assert_eq!(next_week.len(), 7);
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod diagnostics;
pub mod error;
pub mod features;
pub mod forecasting;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod tuning;

// Re-export commonly used types
pub use crate::data::{DataLoader, ObservationTable};
pub use crate::error::{ForecastError, Result};
pub use crate::features::{Covariate, FeatureEngineer, FeatureTable};
pub use crate::forecasting::{ForecastRow, ForecastTable, FutureFrame};
pub use crate::models::{
    DecompositionModel, ForecastModel, Hyperparameters, SeasonalityMode, TrainedForecastModel,
};
pub use crate::pipeline::{ChartOutput, PipelineConfig, PipelineOutput};
pub use crate::tuning::{Tuner, TunerConfig, TuningReport};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_information() {
        assert_eq!(NAME, "weather_forecast");
        assert!(!VERSION.is_empty());
    }
}
