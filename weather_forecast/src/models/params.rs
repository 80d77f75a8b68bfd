//! Model hyperparameters and fitting settings

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CHANGEPOINT_PRIOR_SCALE: &str = "changepoint_prior_scale";
pub const SEASONALITY_PRIOR_SCALE: &str = "seasonality_prior_scale";
pub const HOLIDAYS_PRIOR_SCALE: &str = "holidays_prior_scale";
pub const SEASONALITY_MODE: &str = "seasonality_mode";
pub const CHANGEPOINT_RANGE: &str = "changepoint_range";

/// How seasonal and regressor components combine with the trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    /// Components are added to the trend
    #[default]
    Additive,
    /// Components scale the trend
    Multiplicative,
}

impl SeasonalityMode {
    /// All modes, in search order
    pub const ALL: [SeasonalityMode; 2] = [SeasonalityMode::Additive, SeasonalityMode::Multiplicative];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonalityMode::Additive => "additive",
            SeasonalityMode::Multiplicative => "multiplicative",
        }
    }
}

impl fmt::Display for SeasonalityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeasonalityMode {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "additive" => Ok(SeasonalityMode::Additive),
            "multiplicative" => Ok(SeasonalityMode::Multiplicative),
            other => Err(ForecastError::InvalidParameter(format!(
                "Unknown seasonality mode '{}'",
                other
            ))),
        }
    }
}

/// Tunable model configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Scale of the Laplace prior on trend rate changes
    pub changepoint_prior_scale: f64,
    /// Scale of the Gaussian prior on seasonal coefficients
    pub seasonality_prior_scale: f64,
    /// Scale of the Gaussian prior on regressor coefficients
    pub holidays_prior_scale: f64,
    pub seasonality_mode: SeasonalityMode,
    /// Share of the history eligible for changepoints
    pub changepoint_range: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            seasonality_mode: SeasonalityMode::Additive,
            changepoint_range: 0.8,
        }
    }
}

impl Hyperparameters {
    /// Check every field against its domain
    pub fn validate(&self) -> Result<()> {
        let scales = [
            (CHANGEPOINT_PRIOR_SCALE, self.changepoint_prior_scale),
            (SEASONALITY_PRIOR_SCALE, self.seasonality_prior_scale),
            (HOLIDAYS_PRIOR_SCALE, self.holidays_prior_scale),
        ];
        for (name, value) in scales {
            if !value.is_finite() || value <= 0.0 {
                return Err(ForecastError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "{} must be within (0, 1], got {}",
                CHANGEPOINT_RANGE, self.changepoint_range
            )));
        }

        Ok(())
    }
}

/// Fixed settings that are not searched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Maximum number of potential changepoints
    pub n_changepoints: usize,
    /// Probability mass covered by the uncertainty interval
    pub interval_width: f64,
    /// Simulations used for the interval; zero collapses bounds onto `yhat`
    pub uncertainty_samples: usize,
    /// Seed for the interval simulations
    pub seed: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            n_changepoints: 25,
            interval_width: 0.8,
            uncertainty_samples: 1000,
            seed: 0,
        }
    }
}

impl ModelSettings {
    pub fn with_n_changepoints(mut self, n_changepoints: usize) -> Self {
        self.n_changepoints = n_changepoints;
        self
    }

    pub fn with_interval_width(mut self, interval_width: f64) -> Result<Self> {
        if !(interval_width > 0.0 && interval_width < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Interval width must be within (0, 1), got {}",
                interval_width
            )));
        }
        self.interval_width = interval_width;
        Ok(self)
    }

    pub fn with_uncertainty_samples(mut self, samples: usize) -> Self {
        self.uncertainty_samples = samples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let params = Hyperparameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.seasonality_mode, SeasonalityMode::Additive);
        assert_eq!(params.changepoint_range, 0.8);
    }

    #[test]
    fn test_validate_rejects_out_of_domain() {
        let mut params = Hyperparameters::default();
        params.changepoint_prior_scale = 0.0;
        assert!(params.validate().is_err());

        let mut params = Hyperparameters::default();
        params.changepoint_range = 1.5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(Hyperparameters::default()).unwrap();
        assert_eq!(json["seasonality_mode"], "additive");
        assert_eq!(json["holidays_prior_scale"], 10.0);

        let mode: SeasonalityMode = "multiplicative".parse().unwrap();
        assert_eq!(mode.to_string(), "multiplicative");
        assert!("weekly".parse::<SeasonalityMode>().is_err());
    }

    #[test]
    fn test_settings_builders() {
        let settings = ModelSettings::default()
            .with_uncertainty_samples(50)
            .with_seed(7)
            .with_interval_width(0.95)
            .unwrap();
        assert_eq!(settings.uncertainty_samples, 50);
        assert_eq!(settings.seed, 7);
        assert!(ModelSettings::default().with_interval_width(1.0).is_err());
    }
}
