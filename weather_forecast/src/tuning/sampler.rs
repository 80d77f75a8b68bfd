//! Parameter samplers
//!
//! [`TpeSampler`] is a tree-structured Parzen estimator: completed trials
//! are split into a small "good" group and the rest, a kernel density is
//! fitted to each group per parameter, and the candidate with the highest
//! good/bad density ratio is proposed.

use super::space::{ParamDomain, ParamSet, ParamValue, SearchSpace};
use super::Trial;
use crate::error::{ForecastError, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Proposes the next parameter set given the trials so far
pub trait Sampler: Send {
    fn suggest(&mut self, space: &SearchSpace, history: &[Trial]) -> Result<ParamSet>;
}

/// Uniform (log-uniform for log ranges) independent sampling
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn suggest(&mut self, space: &SearchSpace, _history: &[Trial]) -> Result<ParamSet> {
        Ok(space.sample_uniform(&mut self.rng))
    }
}

/// Tree-structured Parzen estimator
#[derive(Debug, Clone)]
pub struct TpeSampler {
    rng: StdRng,
    n_startup_trials: usize,
    n_candidates: usize,
    prior_weight: f64,
}

impl TpeSampler {
    /// Create a sampler with 10 random start-up trials and 24 candidates
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            n_startup_trials: 10,
            n_candidates: 24,
            prior_weight: 1.0,
        }
    }

    /// Set the number of completed trials sampled at random first
    pub fn with_startup_trials(mut self, n_startup_trials: usize) -> Self {
        self.n_startup_trials = n_startup_trials;
        self
    }

    /// Set the number of candidates scored per suggestion
    pub fn with_candidates(mut self, n_candidates: usize) -> Result<Self> {
        if n_candidates == 0 {
            return Err(ForecastError::InvalidParameter(
                "TPE needs at least one candidate".to_string(),
            ));
        }
        self.n_candidates = n_candidates;
        Ok(self)
    }

    fn suggest_float(
        &mut self,
        name: &str,
        domain: &ParamDomain,
        bounds: (f64, f64),
        good: &[&Trial],
        bad: &[&Trial],
    ) -> Result<ParamValue> {
        let internal = |trials: &[&Trial]| -> Vec<f64> {
            trials
                .iter()
                .filter_map(|trial| match trial.params.get(name) {
                    Some(ParamValue::Float(v)) => Some(domain.to_internal(*v)),
                    _ => None,
                })
                .collect()
        };
        let (low, high) = (domain.to_internal(bounds.0), domain.to_internal(bounds.1));
        let below = ParzenEstimator::new(&internal(good), low, high, self.prior_weight)?;
        let above = ParzenEstimator::new(&internal(bad), low, high, self.prior_weight)?;

        let mut best: Option<(f64, f64)> = None;
        for _ in 0..self.n_candidates {
            let candidate = below.sample(&mut self.rng)?;
            let score = below.log_pdf(candidate) - above.log_pdf(candidate);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }

        let value = best.map_or(low, |(candidate, _)| candidate);
        Ok(ParamValue::Float(
            domain.from_internal(value).clamp(bounds.0, bounds.1),
        ))
    }

    fn suggest_categorical(
        &mut self,
        name: &str,
        choices: &[String],
        good: &[&Trial],
        bad: &[&Trial],
    ) -> Result<ParamValue> {
        let weights = |trials: &[&Trial]| -> Vec<f64> {
            let mut counts = vec![1.0; choices.len()];
            for trial in trials {
                if let Some(ParamValue::Categorical(value)) = trial.params.get(name) {
                    if let Some(index) = choices.iter().position(|choice| choice == value) {
                        counts[index] += 1.0;
                    }
                }
            }
            let total: f64 = counts.iter().sum();
            counts.into_iter().map(|c| c / total).collect()
        };
        let below = weights(good);
        let above = weights(bad);

        let distribution = WeightedIndex::new(&below)
            .map_err(|e| ForecastError::TuningError(format!("invalid categorical weights: {}", e)))?;
        let mut best: Option<(usize, f64)> = None;
        for _ in 0..self.n_candidates {
            let index = distribution.sample(&mut self.rng);
            let score = below[index].ln() - above[index].ln();
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }

        let index = best.map_or(0, |(index, _)| index);
        Ok(ParamValue::Categorical(choices[index].clone()))
    }
}

/// Number of trials in the good group
fn gamma(n: usize) -> usize {
    ((0.1 * n as f64).ceil() as usize).min(25)
}

impl Sampler for TpeSampler {
    fn suggest(&mut self, space: &SearchSpace, history: &[Trial]) -> Result<ParamSet> {
        let mut completed: Vec<&Trial> = history.iter().filter(|t| t.is_complete()).collect();
        if completed.len() < self.n_startup_trials.max(2) {
            return Ok(space.sample_uniform(&mut self.rng));
        }

        completed.sort_by(|a, b| a.score.total_cmp(&b.score));
        let n_good = gamma(completed.len()).clamp(1, completed.len() - 1);
        let (good, bad) = completed.split_at(n_good);

        let mut params = ParamSet::new();
        for (name, domain) in space.iter() {
            let value = match domain {
                ParamDomain::Float { low, high, .. } => {
                    self.suggest_float(name, domain, (*low, *high), good, bad)?
                }
                ParamDomain::Categorical(choices) => {
                    self.suggest_categorical(name, choices, good, bad)?
                }
            };
            params.insert(name.clone(), value);
        }

        Ok(params)
    }
}

/// Mixture of truncated Gaussians centred on observations plus a broad
/// prior component over the whole range
#[derive(Debug, Clone)]
struct ParzenEstimator {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    weights: Vec<f64>,
    low: f64,
    high: f64,
    standard: Normal,
}

impl ParzenEstimator {
    fn new(observations: &[f64], low: f64, high: f64, prior_weight: f64) -> Result<Self> {
        let standard = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::TuningError(format!("standard normal: {}", e)))?;
        let range = high - low;

        let mut components: Vec<(f64, f64, bool)> = observations
            .iter()
            .map(|&x| (x.clamp(low, high), 1.0, false))
            .collect();
        components.push(((low + high) / 2.0, prior_weight, true));
        components.sort_by(|a, b| a.0.total_cmp(&b.0));

        let min_sigma = range / (components.len() as f64 + 1.0).min(100.0);
        let mus: Vec<f64> = components.iter().map(|c| c.0).collect();
        let sigmas = (0..mus.len())
            .map(|i| {
                if components[i].2 {
                    return range;
                }
                let left = if i == 0 { mus[i] - low } else { mus[i] - mus[i - 1] };
                let right = if i + 1 == mus.len() { high - mus[i] } else { mus[i + 1] - mus[i] };
                left.max(right).clamp(min_sigma, range)
            })
            .collect();

        Ok(Self {
            mus,
            sigmas,
            weights: components.iter().map(|c| c.1).collect(),
            low,
            high,
            standard,
        })
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> Result<f64> {
        let component = WeightedIndex::new(&self.weights)
            .map_err(|e| ForecastError::TuningError(format!("invalid mixture weights: {}", e)))?
            .sample(rng);
        let (mu, sigma) = (self.mus[component], self.sigmas[component]);

        for _ in 0..64 {
            let z: f64 = rng.sample(StandardNormal);
            let x = mu + sigma * z;
            if x >= self.low && x <= self.high {
                return Ok(x);
            }
        }
        Ok(mu.clamp(self.low, self.high))
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let total_weight: f64 = self.weights.iter().sum();
        let density: f64 = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .zip(&self.weights)
            .map(|((&mu, &sigma), &weight)| {
                let mass = self.standard.cdf((self.high - mu) / sigma)
                    - self.standard.cdf((self.low - mu) / sigma);
                weight * self.standard.pdf((x - mu) / sigma) / (sigma * mass.max(1e-12))
            })
            .sum();
        (density / total_weight).max(f64::MIN_POSITIVE).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::TrialState;

    fn trial(number: usize, x: f64, mode: &str, score: f64) -> Trial {
        let mut params = ParamSet::new();
        params.insert("x".to_string(), ParamValue::Float(x));
        params.insert("mode".to_string(), ParamValue::Categorical(mode.to_string()));
        Trial {
            number,
            params,
            hyperparameters: None,
            score,
            state: TrialState::Complete,
        }
    }

    fn space() -> SearchSpace {
        SearchSpace::new()
            .with_param("x", ParamDomain::float(0.0, 10.0).unwrap())
            .with_param("mode", ParamDomain::categorical(["a", "b"]).unwrap())
    }

    #[test]
    fn test_gamma() {
        assert_eq!(gamma(10), 1);
        assert_eq!(gamma(11), 2);
        assert_eq!(gamma(1000), 25);
    }

    #[test]
    fn test_random_sampler_is_seeded() {
        let space = space();
        let a = RandomSampler::new(5).suggest(&space, &[]).unwrap();
        let b = RandomSampler::new(5).suggest(&space, &[]).unwrap();
        assert_eq!(a, b);
        assert!(space.contains(&a));
    }

    // score is the distance from 2, and mode "b" is always better
    fn scored_history() -> Vec<Trial> {
        (0..40)
            .map(|i| {
                let x = i as f64 / 4.0;
                let mode = if i % 2 == 0 { "a" } else { "b" };
                let penalty = if mode == "a" { 5.0 } else { 0.0 };
                trial(i, x, mode, (x - 2.0).abs() + penalty)
            })
            .collect()
    }

    #[test]
    fn test_tpe_concentrates_near_good_trials() {
        let history = scored_history();
        let space = space();
        let mut sampler = TpeSampler::new(3);
        let mut near = 0;
        let mut mode_b = 0;
        for _ in 0..50 {
            let params = sampler.suggest(&space, &history).unwrap();
            assert!(space.contains(&params));
            if let Some(ParamValue::Float(x)) = params.get("x") {
                if (x - 2.0).abs() < 2.5 {
                    near += 1;
                }
            }
            if params.get("mode") == Some(&ParamValue::Categorical("b".to_string())) {
                mode_b += 1;
            }
        }
        assert!(near > 35, "only {} of 50 suggestions near the optimum", near);
        assert!(mode_b > 35, "only {} of 50 suggestions chose the better mode", mode_b);
    }

    #[test]
    fn test_tpe_ignores_failed_trials_during_startup() {
        let mut failed = trial(0, 1.0, "a", f64::INFINITY);
        failed.state = TrialState::Failed("boom".to_string());
        let space = space();
        let params = TpeSampler::new(1).suggest(&space, &[failed]).unwrap();
        assert!(space.contains(&params));
    }

    #[test]
    fn test_tpe_samples_randomly_until_startup_trials_complete() {
        let history = scored_history();
        let space = space();
        let mut tpe = TpeSampler::new(9).with_startup_trials(50);
        let mut random = RandomSampler::new(9);
        for _ in 0..5 {
            assert_eq!(
                tpe.suggest(&space, &history).unwrap(),
                random.suggest(&space, &history).unwrap()
            );
        }
    }

    #[test]
    fn test_tpe_candidate_count() {
        assert!(TpeSampler::new(1).with_candidates(0).is_err());

        let space = space();
        let mut sampler = TpeSampler::new(1).with_candidates(1).unwrap();
        let params = sampler.suggest(&space, &scored_history()).unwrap();
        assert!(space.contains(&params));
    }

    #[test]
    fn test_parzen_density_peaks_at_observations() {
        let estimator = ParzenEstimator::new(&[2.0, 2.1], 0.0, 10.0, 1.0).unwrap();
        assert!(estimator.log_pdf(2.05) > estimator.log_pdf(8.0));
    }
}
