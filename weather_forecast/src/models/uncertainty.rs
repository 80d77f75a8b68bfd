//! Simulated uncertainty intervals
//!
//! Future trend changes are drawn at the historical changepoint rate with
//! Laplace magnitudes, and Gaussian observation noise is added on top.

use super::trend::piecewise_linear;
use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use statrs::statistics::{Data, OrderStatistics};

/// Fitted trend parameters, in scaled units
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrendState<'a> {
    pub k: f64,
    pub m: f64,
    pub deltas: &'a [f64],
    pub changepoints: &'a [f64],
}

/// Point predictions for the rows to bound, in scaled units
#[derive(Debug, Clone, Copy)]
pub(crate) struct PointComponents<'a> {
    pub t: &'a [f64],
    pub multiplicative: &'a [f64],
    pub additive: &'a [f64],
}

/// Interval bounds in target units
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Intervals {
    pub yhat_lower: Vec<f64>,
    pub yhat_upper: Vec<f64>,
    pub trend_lower: Vec<f64>,
    pub trend_upper: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IntervalSampler {
    pub samples: usize,
    pub width: f64,
    pub sigma: f64,
    pub y_scale: f64,
    pub seed: u64,
}

impl IntervalSampler {
    pub(crate) fn sample(&self, trend: TrendState<'_>, points: PointComponents<'_>) -> Result<Intervals> {
        let rows = points.t.len();
        let noise = Normal::new(0.0, self.sigma)
            .map_err(|e| ForecastError::ModelError(format!("invalid noise scale: {}", e)))?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let t_max = points.t.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let rate = trend.changepoints.len() as f64 * (t_max - 1.0);
        let magnitude = trend.deltas.iter().map(|d| d.abs()).sum::<f64>()
            / trend.deltas.len().max(1) as f64
            + 1e-8;

        let mut trend_draws = vec![Vec::with_capacity(self.samples); rows];
        let mut yhat_draws = vec![Vec::with_capacity(self.samples); rows];

        for _ in 0..self.samples {
            let mut changepoints = trend.changepoints.to_vec();
            let mut deltas = trend.deltas.to_vec();

            if rate > 0.0 {
                let poisson = Poisson::new(rate)
                    .map_err(|e| ForecastError::ModelError(format!("invalid changepoint rate: {}", e)))?;
                let count = poisson.sample(&mut rng) as usize;
                let mut future: Vec<f64> = (0..count).map(|_| rng.gen_range(1.0..t_max)).collect();
                future.sort_by(f64::total_cmp);
                for s in future {
                    changepoints.push(s);
                    deltas.push(laplace(&mut rng, magnitude));
                }
            }

            for i in 0..rows {
                let g = piecewise_linear(points.t[i], trend.k, trend.m, &deltas, &changepoints);
                let y = g * (1.0 + points.multiplicative[i]) + points.additive[i] + noise.sample(&mut rng);
                trend_draws[i].push(g * self.y_scale);
                yhat_draws[i].push(y * self.y_scale);
            }
        }

        let lower_q = (1.0 - self.width) / 2.0;
        let upper_q = (1.0 + self.width) / 2.0;
        let mut intervals = Intervals {
            yhat_lower: Vec::with_capacity(rows),
            yhat_upper: Vec::with_capacity(rows),
            trend_lower: Vec::with_capacity(rows),
            trend_upper: Vec::with_capacity(rows),
        };
        for (trend_row, yhat_row) in trend_draws.into_iter().zip(yhat_draws) {
            let (lower, upper) = quantiles(trend_row, lower_q, upper_q)?;
            intervals.trend_lower.push(lower);
            intervals.trend_upper.push(upper);
            let (lower, upper) = quantiles(yhat_row, lower_q, upper_q)?;
            intervals.yhat_lower.push(lower);
            intervals.yhat_upper.push(upper);
        }

        Ok(intervals)
    }
}

/// Lower and upper empirical quantiles of one row of draws
fn quantiles(draws: Vec<f64>, lower_q: f64, upper_q: f64) -> Result<(f64, f64)> {
    if draws.is_empty() || draws.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::ModelError(
            "Simulated draws are empty or not finite".to_string(),
        ));
    }
    let mut data = Data::new(draws);
    Ok((data.quantile(lower_q), data.quantile(upper_q)))
}

/// Draw from Laplace(0, scale) by inverting the CDF
fn laplace<R: Rng>(rng: &mut R, scale: f64) -> f64 {
    let u: f64 = rng.gen::<f64>() - 0.5;
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(samples: usize) -> IntervalSampler {
        IntervalSampler {
            samples,
            width: 0.8,
            sigma: 0.05,
            y_scale: 10.0,
            seed: 3,
        }
    }

    #[test]
    fn test_intervals_are_seeded() {
        let changepoints = [0.2, 0.5];
        let deltas = [0.1, -0.3];
        let trend = TrendState { k: 1.0, m: 0.0, deltas: &deltas, changepoints: &changepoints };
        let t = [0.5, 1.0, 1.2, 1.5];
        let zeros = [0.0; 4];
        let points = PointComponents { t: &t, multiplicative: &zeros, additive: &zeros };

        let first = sampler(200).sample(trend, points).unwrap();
        let second = sampler(200).sample(trend, points).unwrap();
        assert_eq!(first, second);

        for i in 0..t.len() {
            assert!(first.yhat_lower[i] < first.yhat_upper[i]);
            assert!(first.trend_lower[i] <= first.trend_upper[i]);
        }
        // trend uncertainty only opens up beyond the history
        assert!((first.trend_upper[0] - first.trend_lower[0]).abs() < 1e-9);
        assert!(first.trend_upper[3] - first.trend_lower[3] > 0.0);
    }

    #[test]
    fn test_quantiles_of_draws() {
        let (lower, upper) = quantiles(vec![5.0, 1.0, 3.0, 2.0, 4.0], 0.0, 1.0).unwrap();
        assert_eq!((lower, upper), (1.0, 5.0));
        let (median, _) = quantiles(vec![5.0, 1.0, 3.0, 2.0, 4.0], 0.5, 0.9).unwrap();
        assert_eq!(median, 3.0);
        assert!(quantiles(vec![1.0, f64::NAN], 0.1, 0.9).is_err());
        assert!(quantiles(Vec::new(), 0.1, 0.9).is_err());
    }

    #[test]
    fn test_laplace_is_centred() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let mean = (0..n).map(|_| laplace(&mut rng, 2.0)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.1);
    }
}
