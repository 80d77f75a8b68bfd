//! Hyperparameter search scored by rolling-origin cross-validation

use crate::diagnostics::{cross_validation, performance_metrics, CrossValidationConfig};
use crate::error::{ForecastError, Result};
use crate::features::{Covariate, FeatureTable};
use crate::models::{
    DecompositionModel, ForecastModel, Hyperparameters, ModelSettings, TrainedDecomposition,
};
use serde::Serialize;
use tracing::{debug, info, warn};

pub mod sampler;
pub mod space;

pub use sampler::{RandomSampler, Sampler, TpeSampler};
pub use space::{ParamDomain, ParamSet, ParamValue, SearchSpace};

/// Share of cross-validation rows in each rolling horizon window of the score
pub const SCORE_ROLLING_WINDOW: f64 = 0.1;

/// Outcome of a trial
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum TrialState {
    Complete,
    Failed(String),
}

/// One evaluated parameter set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trial {
    pub number: usize,
    pub params: ParamSet,
    /// Model configuration, when the sampled values formed a valid one
    pub hyperparameters: Option<Hyperparameters>,
    /// Mean rolling-horizon RMSE; infinite for failed trials
    pub score: f64,
    pub state: TrialState,
}

impl Trial {
    /// Check if the trial produced a usable score
    pub fn is_complete(&self) -> bool {
        self.state == TrialState::Complete && self.score.is_finite()
    }
}

/// Search configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TunerConfig {
    pub n_trials: usize,
    /// Seed for sampling and interval simulation; drawn at random when absent
    pub seed: Option<u64>,
    pub cv: CrossValidationConfig,
    pub settings: ModelSettings,
    pub regressors: Vec<Covariate>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            n_trials: 20,
            seed: None,
            cv: CrossValidationConfig::default(),
            settings: ModelSettings::default(),
            regressors: Covariate::ALL.to_vec(),
        }
    }
}

impl TunerConfig {
    pub fn with_trials(mut self, n_trials: usize) -> Result<Self> {
        if n_trials == 0 {
            return Err(ForecastError::InvalidParameter(
                "At least one trial is required".to_string(),
            ));
        }
        self.n_trials = n_trials;
        Ok(self)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_cv(mut self, cv: CrossValidationConfig) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Summary of a finished search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningReport {
    pub best_params: Hyperparameters,
    pub best_score: f64,
    pub best_trial: usize,
    pub seed: u64,
    pub trials: Vec<Trial>,
}

impl TuningReport {
    /// Full report as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Best hyperparameters as pretty JSON
    pub fn best_params_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.best_params)?)
    }

    /// Number of trials that failed
    pub fn failed_trials(&self) -> usize {
        self.trials.iter().filter(|t| !t.is_complete()).count()
    }
}

/// Best configuration refit on the full table
#[derive(Debug, Clone)]
pub struct TunedModel {
    pub model: TrainedDecomposition,
    pub report: TuningReport,
}

/// Searches decomposition model hyperparameters
pub struct Tuner<S: Sampler = TpeSampler> {
    config: TunerConfig,
    seed: u64,
    space: SearchSpace,
    sampler: S,
}

impl Tuner<TpeSampler> {
    /// Create a tuner over the default search space with a TPE sampler
    pub fn new(config: TunerConfig) -> Result<Self> {
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(Self {
            space: SearchSpace::default_space()?,
            sampler: TpeSampler::new(seed),
            seed,
            config,
        })
    }
}

impl<S: Sampler> Tuner<S> {
    /// Replace the sampler
    pub fn with_sampler<T: Sampler>(self, sampler: T) -> Tuner<T> {
        Tuner {
            config: self.config,
            seed: self.seed,
            space: self.space,
            sampler,
        }
    }

    /// Replace the search space
    pub fn with_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    /// Seed used for this search
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Untrained model for a configuration, with the registered regressors
    pub fn build_model(&self, params: &Hyperparameters) -> Result<DecompositionModel> {
        let settings = self.config.settings.clone().with_seed(self.seed);
        DecompositionModel::new(*params)?
            .with_settings(settings)
            .with_regressors(&self.config.regressors)
    }

    /// Score of a configuration on `table`: the mean over horizons of the
    /// rolling-window RMSE of its cross-validated predictions
    pub fn objective(
        &self,
        params: &Hyperparameters,
        table: &FeatureTable,
        cv: &CrossValidationConfig,
    ) -> Result<f64> {
        let trained = self.build_model(params)?.train(table)?;
        let rows = cross_validation(&trained, cv)?;
        let metrics = performance_metrics(&rows, SCORE_ROLLING_WINDOW)?;
        if metrics.is_empty() {
            return Err(ForecastError::ModelError(
                "Cross-validation produced no horizon metrics".to_string(),
            ));
        }

        let score = metrics.iter().map(|m| m.rmse).sum::<f64>() / metrics.len() as f64;
        if !score.is_finite() {
            return Err(ForecastError::ModelError(format!(
                "Cross-validation score is not finite: {}",
                score
            )));
        }
        Ok(score)
    }

    /// Run the search and refit the best configuration on the whole table
    pub fn tune(&mut self, table: &FeatureTable) -> Result<TunedModel> {
        info!(
            trials = self.config.n_trials,
            seed = self.seed,
            rows = table.len(),
            "starting hyperparameter search"
        );
        let cv = self.config.cv.fit_to(&table.dates()).map_err(|e| {
            ForecastError::TuningError(format!(
                "cross-validation windows do not fit the history: {}",
                e
            ))
        })?;

        let mut trials: Vec<Trial> = Vec::with_capacity(self.config.n_trials);
        let mut last_failure = None;
        for number in 0..self.config.n_trials {
            let params = self.sampler.suggest(&self.space, &trials)?;
            let (hyperparameters, outcome) = match Hyperparameters::from_params(&params) {
                Ok(hyper) => (Some(hyper), self.objective(&hyper, table, &cv)),
                Err(e) => (None, Err(e)),
            };

            let trial = match outcome {
                Ok(score) => {
                    debug!(number, score, "trial complete");
                    Trial {
                        number,
                        params,
                        hyperparameters,
                        score,
                        state: TrialState::Complete,
                    }
                }
                Err(e) => {
                    warn!(number, error = %e, "trial failed");
                    let message = e.to_string();
                    last_failure = Some(message.clone());
                    Trial {
                        number,
                        params,
                        hyperparameters,
                        score: f64::INFINITY,
                        state: TrialState::Failed(message),
                    }
                }
            };
            trials.push(trial);
        }

        let best = trials
            .iter()
            .filter(|trial| trial.is_complete())
            .min_by(|a, b| a.score.total_cmp(&b.score));
        let (best_trial, best_score, best_params) = match best.and_then(|t| {
            t.hyperparameters
                .map(|hyper| (t.number, t.score, hyper))
        }) {
            Some(best) => best,
            None => {
                return Err(ForecastError::TuningError(format!(
                    "all {} trials failed; last error: {}",
                    trials.len(),
                    last_failure.unwrap_or_else(|| "none recorded".to_string())
                )))
            }
        };

        let report = TuningReport {
            best_params,
            best_score,
            best_trial,
            seed: self.seed,
            trials,
        };
        info!(
            trial = best_trial,
            score = best_score,
            params = %report.best_params_json()?.replace('\n', ""),
            "best hyperparameters"
        );

        let model = self.build_model(&best_params)?.train(table)?;
        Ok(TunedModel { model, report })
    }
}
