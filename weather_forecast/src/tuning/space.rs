//! Search space declarations and sampled parameter sets

use crate::error::{ForecastError, Result};
use crate::models::params::{
    CHANGEPOINT_PRIOR_SCALE, CHANGEPOINT_RANGE, HOLIDAYS_PRIOR_SCALE, SEASONALITY_MODE,
    SEASONALITY_PRIOR_SCALE,
};
use crate::models::{Hyperparameters, SeasonalityMode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sampled value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Float(f64),
    Categorical(String),
}

/// Sampled values by parameter name
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Domain of one searched parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamDomain {
    /// Closed float range, optionally searched in log space
    Float { low: f64, high: f64, log: bool },
    /// Unordered choices
    Categorical(Vec<String>),
}

impl ParamDomain {
    /// Linear float range
    pub fn float(low: f64, high: f64) -> Result<Self> {
        Self::checked_float(low, high, false)
    }

    /// Float range searched in log space
    pub fn log_float(low: f64, high: f64) -> Result<Self> {
        if low <= 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Log-scaled range needs a positive lower bound, got {}",
                low
            )));
        }
        Self::checked_float(low, high, true)
    }

    fn checked_float(low: f64, high: f64, log: bool) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(ForecastError::InvalidParameter(format!(
                "Invalid float range [{}, {}]",
                low, high
            )));
        }
        Ok(ParamDomain::Float { low, high, log })
    }

    /// Categorical choices
    pub fn categorical<S: Into<String>>(choices: impl IntoIterator<Item = S>) -> Result<Self> {
        let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
        if choices.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Categorical domain needs at least one choice".to_string(),
            ));
        }
        Ok(ParamDomain::Categorical(choices))
    }

    /// Check if a value belongs to the domain
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (ParamDomain::Float { low, high, .. }, ParamValue::Float(v)) => {
                *v >= *low && *v <= *high
            }
            (ParamDomain::Categorical(choices), ParamValue::Categorical(v)) => choices.contains(v),
            _ => false,
        }
    }

    /// Draw uniformly in the search space (log-uniform for log ranges)
    pub fn sample_uniform<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match self {
            ParamDomain::Float { low, high, .. } => {
                let (a, b) = (self.to_internal(*low), self.to_internal(*high));
                let x = rng.gen_range(a..=b);
                ParamValue::Float(self.from_internal(x).clamp(*low, *high))
            }
            ParamDomain::Categorical(choices) => {
                ParamValue::Categorical(choices[rng.gen_range(0..choices.len())].clone())
            }
        }
    }

    /// Map a float value into the space the sampler works in
    pub(crate) fn to_internal(&self, value: f64) -> f64 {
        match self {
            ParamDomain::Float { log: true, .. } => value.ln(),
            _ => value,
        }
    }

    pub(crate) fn from_internal(&self, value: f64) -> f64 {
        match self {
            ParamDomain::Float { log: true, .. } => value.exp(),
            _ => value,
        }
    }
}

/// Named parameter domains
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchSpace {
    params: BTreeMap<String, ParamDomain>,
}

impl SearchSpace {
    /// Create an empty space
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter
    pub fn with_param(mut self, name: impl Into<String>, domain: ParamDomain) -> Self {
        self.params.insert(name.into(), domain);
        self
    }

    /// The five model hyperparameters with their usual ranges
    pub fn default_space() -> Result<Self> {
        Ok(Self::new()
            .with_param(CHANGEPOINT_PRIOR_SCALE, ParamDomain::log_float(0.001, 0.5)?)
            .with_param(SEASONALITY_PRIOR_SCALE, ParamDomain::log_float(0.01, 10.0)?)
            .with_param(HOLIDAYS_PRIOR_SCALE, ParamDomain::log_float(0.01, 10.0)?)
            .with_param(
                SEASONALITY_MODE,
                ParamDomain::categorical(SeasonalityMode::ALL.iter().map(|m| m.as_str()))?,
            )
            .with_param(CHANGEPOINT_RANGE, ParamDomain::float(0.8, 0.95)?))
    }

    /// Get a domain by name
    pub fn get(&self, name: &str) -> Option<&ParamDomain> {
        self.params.get(name)
    }

    /// Iterate domains in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamDomain)> {
        self.params.iter()
    }

    /// Check that `params` assigns every parameter a value in its domain
    pub fn contains(&self, params: &ParamSet) -> bool {
        self.params.iter().all(|(name, domain)| {
            params
                .get(name)
                .map_or(false, |value| domain.contains(value))
        })
    }

    /// Draw every parameter uniformly
    pub fn sample_uniform<R: Rng>(&self, rng: &mut R) -> ParamSet {
        self.params
            .iter()
            .map(|(name, domain)| (name.clone(), domain.sample_uniform(rng)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl Hyperparameters {
    /// Build hyperparameters from a sampled set; absent entries keep their defaults
    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let defaults = Hyperparameters::default();
        let float = |name: &str, default: f64| -> Result<f64> {
            match params.get(name) {
                None => Ok(default),
                Some(ParamValue::Float(v)) => Ok(*v),
                Some(other) => Err(ForecastError::InvalidParameter(format!(
                    "{} must be a number, got {:?}",
                    name, other
                ))),
            }
        };

        let seasonality_mode = match params.get(SEASONALITY_MODE) {
            None => defaults.seasonality_mode,
            Some(ParamValue::Categorical(mode)) => mode.parse()?,
            Some(other) => {
                return Err(ForecastError::InvalidParameter(format!(
                    "{} must be a choice, got {:?}",
                    SEASONALITY_MODE, other
                )))
            }
        };

        let hyperparameters = Hyperparameters {
            changepoint_prior_scale: float(CHANGEPOINT_PRIOR_SCALE, defaults.changepoint_prior_scale)?,
            seasonality_prior_scale: float(SEASONALITY_PRIOR_SCALE, defaults.seasonality_prior_scale)?,
            holidays_prior_scale: float(HOLIDAYS_PRIOR_SCALE, defaults.holidays_prior_scale)?,
            seasonality_mode,
            changepoint_range: float(CHANGEPOINT_RANGE, defaults.changepoint_range)?,
        };
        hyperparameters.validate()?;
        Ok(hyperparameters)
    }
}
