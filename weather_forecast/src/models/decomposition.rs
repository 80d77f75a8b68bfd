//! Trend + seasonality decomposition model with extra regressors
//!
//! The target is modelled as `g(t) * (1 + Xm·βm) + Xa·βa`, where `g` is a
//! piecewise-linear trend, `Xm` holds the multiplicative components and `Xa`
//! the additive ones. Coefficients are the posterior mode under Gaussian
//! priors on the trend and component coefficients and a Laplace prior on the
//! changepoint rate adjustments.

use super::params::{Hyperparameters, ModelSettings, SeasonalityMode};
use super::seasonality::{auto_seasonalities, Seasonality};
use super::trend::{design_row, initial_line, piecewise_linear, select_changepoints, TimeScale};
use super::uncertainty::{IntervalSampler, PointComponents, TrendState};
use super::{ForecastModel, FrameRow, PredictionFrame, TrainedForecastModel};
use crate::error::{ForecastError, Result};
use crate::features::{Covariate, Covariates, FeatureTable};
use chrono::{Duration, NaiveDateTime};
use forecast_math::linalg::ridge_solve;
use statrs::statistics::Statistics;
use tracing::debug;

/// Variance of the N(0, 5) priors on slope and offset
const TREND_PRIOR_VARIANCE: f64 = 25.0;
const MAX_ITERATIONS: usize = 50;
const MAX_STEP_HALVINGS: usize = 10;
const TOLERANCE: f64 = 1e-8;
const MIN_SIGMA: f64 = 1e-4;
/// Smallest |δ| used when reweighting the Laplace prior
const DELTA_FLOOR: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq)]
enum ComponentKind {
    Seasonal(Seasonality),
    Regressor {
        covariate: Covariate,
        mu: f64,
        std: f64,
    },
}

/// A block of feature columns sharing a mode and prior
#[derive(Debug, Clone, PartialEq)]
struct Component {
    kind: ComponentKind,
    mode: SeasonalityMode,
    prior_scale: f64,
    width: usize,
}

impl Component {
    fn name(&self) -> &str {
        match &self.kind {
            ComponentKind::Seasonal(seasonality) => &seasonality.name,
            ComponentKind::Regressor { covariate, .. } => covariate.name(),
        }
    }

    fn features(&self, ds: NaiveDateTime, covariates: &Covariates) -> Vec<f64> {
        match &self.kind {
            ComponentKind::Seasonal(seasonality) => seasonality.features(ds),
            ComponentKind::Regressor { covariate, mu, std } => {
                vec![(covariates.get(*covariate) - mu) / std]
            }
        }
    }
}

fn feature_row(components: &[Component], ds: NaiveDateTime, covariates: &Covariates) -> Vec<f64> {
    components
        .iter()
        .flat_map(|component| component.features(ds, covariates))
        .collect()
}

/// Untrained decomposition model: hyperparameters, settings and regressors
#[derive(Debug, Clone)]
pub struct DecompositionModel {
    name: String,
    params: Hyperparameters,
    settings: ModelSettings,
    regressors: Vec<Covariate>,
}

impl DecompositionModel {
    /// Create a model with validated hyperparameters and default settings
    pub fn new(params: Hyperparameters) -> Result<Self> {
        params.validate()?;

        Ok(Self {
            name: format!("Decomposition ({} seasonality)", params.seasonality_mode),
            params,
            settings: ModelSettings::default(),
            regressors: Vec::new(),
        })
    }

    /// Replace the fixed settings
    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register an extra regressor
    pub fn add_regressor(&mut self, covariate: Covariate) -> Result<()> {
        if self.regressors.contains(&covariate) {
            return Err(ForecastError::InvalidParameter(format!(
                "Regressor '{}' is already registered",
                covariate
            )));
        }
        self.regressors.push(covariate);
        Ok(())
    }

    /// Register several regressors
    pub fn with_regressors(mut self, covariates: &[Covariate]) -> Result<Self> {
        for &covariate in covariates {
            self.add_regressor(covariate)?;
        }
        Ok(self)
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn regressors(&self) -> &[Covariate] {
        &self.regressors
    }

    fn components(&self, history: &FeatureTable) -> Vec<Component> {
        let mode = self.params.seasonality_mode;
        let mut components: Vec<Component> = auto_seasonalities(&history.dates())
            .into_iter()
            .map(|seasonality| Component {
                width: seasonality.width(),
                kind: ComponentKind::Seasonal(seasonality),
                mode,
                prior_scale: self.params.seasonality_prior_scale,
            })
            .collect();

        for &covariate in &self.regressors {
            let values = history.column(covariate);
            let binary = values.iter().all(|&v| v == 0.0 || v == 1.0);
            let (mu, std) = if binary {
                (0.0, 1.0)
            } else {
                let std = values.iter().std_dev();
                let std = if std.is_finite() && std > 0.0 { std } else { 1.0 };
                (values.iter().mean(), std)
            };

            components.push(Component {
                kind: ComponentKind::Regressor { covariate, mu, std },
                mode,
                prior_scale: self.params.holidays_prior_scale,
                width: 1,
            });
        }

        components
    }
}

impl ForecastModel for DecompositionModel {
    type Trained = TrainedDecomposition;

    fn train(&self, history: &FeatureTable) -> Result<TrainedDecomposition> {
        if history.len() < 2 {
            return Err(ForecastError::ModelError(format!(
                "Need at least two observations to fit, got {}",
                history.len()
            )));
        }

        let time = TimeScale::new(history.first_date(), history.last_date())?;
        let t: Vec<f64> = history.rows().iter().map(|row| time.scale(row.ds)).collect();
        let y = history.targets();
        let y_scale = y.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let y_scaled: Vec<f64> = y.iter().map(|v| v / y_scale).collect();

        let changepoints = select_changepoints(
            &t,
            self.settings.n_changepoints,
            self.params.changepoint_range,
        );
        let components = self.components(history);

        let mut multiplicative = Vec::new();
        let mut beta_penalties = Vec::new();
        for component in &components {
            for _ in 0..component.width {
                multiplicative.push(component.mode == SeasonalityMode::Multiplicative);
                beta_penalties.push(1.0 / component.prior_scale.powi(2));
            }
        }

        let problem = Problem {
            trend_rows: t.iter().map(|&ti| design_row(ti, &changepoints)).collect(),
            features: history
                .rows()
                .iter()
                .map(|row| feature_row(&components, row.ds, &row.covariates))
                .collect(),
            multiplicative,
            beta_penalties,
            y: &y_scaled,
            tau: self.params.changepoint_prior_scale,
        };

        let (k, m) = initial_line(&t, &y_scaled);
        let mut theta = vec![0.0; problem.n_params()];
        theta[0] = k;
        theta[1] = m;

        let (theta, sigma, iterations) = problem.solve(theta)?;
        debug!(
            model = %self.name,
            rows = history.len(),
            changepoints = changepoints.len(),
            iterations,
            sigma,
            "fitted decomposition model"
        );

        let n_trend = problem.n_trend();
        Ok(TrainedDecomposition {
            model: self.clone(),
            history: history.clone(),
            time,
            y_scale,
            k: theta[0],
            m: theta[1],
            deltas: theta[2..n_trend].to_vec(),
            beta: theta[n_trend..].to_vec(),
            changepoints,
            components,
            sigma,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Penalised least-squares problem in scaled units
struct Problem<'a> {
    trend_rows: Vec<Vec<f64>>,
    features: Vec<Vec<f64>>,
    multiplicative: Vec<bool>,
    beta_penalties: Vec<f64>,
    y: &'a [f64],
    tau: f64,
}

impl Problem<'_> {
    fn n_trend(&self) -> usize {
        self.trend_rows.first().map_or(2, |row| row.len())
    }

    fn n_params(&self) -> usize {
        self.n_trend() + self.multiplicative.len()
    }

    /// Trend, multiplicative and additive parts of row `i`
    fn parts(&self, i: usize, theta: &[f64]) -> (f64, f64, f64) {
        let n_trend = self.n_trend();
        let g: f64 = self.trend_rows[i]
            .iter()
            .zip(&theta[..n_trend])
            .map(|(x, b)| x * b)
            .sum();

        let (mut mult, mut add) = (0.0, 0.0);
        for (j, (&x, &b)) in self.features[i].iter().zip(&theta[n_trend..]).enumerate() {
            if self.multiplicative[j] {
                mult += x * b;
            } else {
                add += x * b;
            }
        }
        (g, mult, add)
    }

    fn residual_sum(&self, theta: &[f64]) -> f64 {
        (0..self.y.len())
            .map(|i| {
                let (g, mult, add) = self.parts(i, theta);
                (self.y[i] - g * (1.0 + mult) - add).powi(2)
            })
            .sum()
    }

    fn objective(&self, theta: &[f64], penalties: &[f64], precision: f64) -> f64 {
        precision * self.residual_sum(theta)
            + theta
                .iter()
                .zip(penalties)
                .map(|(b, l)| l * b * b)
                .sum::<f64>()
    }

    fn penalties(&self, delta_weights: &[f64]) -> Vec<f64> {
        let mut penalties = Vec::with_capacity(self.n_params());
        penalties.push(1.0 / TREND_PRIOR_VARIANCE);
        penalties.push(1.0 / TREND_PRIOR_VARIANCE);
        penalties.extend_from_slice(delta_weights);
        penalties.extend_from_slice(&self.beta_penalties);
        penalties
    }

    /// Jacobian and working target of the model linearised at `theta`
    fn linearise(&self, theta: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let n_trend = self.n_trend();
        let mut jacobian = Vec::with_capacity(self.y.len());
        let mut target = Vec::with_capacity(self.y.len());

        for i in 0..self.y.len() {
            let (g, mult, add) = self.parts(i, theta);
            let mut row = Vec::with_capacity(theta.len());
            row.extend(self.trend_rows[i].iter().map(|x| x * (1.0 + mult)));
            row.extend(
                self.features[i]
                    .iter()
                    .enumerate()
                    .map(|(j, &x)| if self.multiplicative[j] { g * x } else { x }),
            );

            let linear: f64 = row.iter().zip(theta).map(|(a, b)| a * b).sum();
            target.push(self.y[i] - (g * (1.0 + mult) + add) + linear);
            jacobian.push(row);
        }
        debug_assert!(jacobian.iter().all(|row| row.len() == n_trend + self.multiplicative.len()));

        (jacobian, target)
    }

    fn sigma(&self, theta: &[f64]) -> f64 {
        (self.residual_sum(theta) / self.y.len() as f64)
            .sqrt()
            .max(MIN_SIGMA)
    }

    /// Damped Gauss-Newton with reweighted Laplace penalties
    fn solve(&self, mut theta: Vec<f64>) -> Result<(Vec<f64>, f64, usize)> {
        let n_trend = self.n_trend();
        let mut delta_weights = vec![1.0 / self.tau.powi(2); n_trend - 2];
        let mut sigma = self.sigma(&theta);
        let mut iterations = 0;

        while iterations < MAX_ITERATIONS {
            iterations += 1;
            let penalties = self.penalties(&delta_weights);
            let precision = 1.0 / sigma.powi(2);

            let (jacobian, target) = self.linearise(&theta);
            let proposal = ridge_solve(&jacobian, &target, &penalties, precision)?;

            let current = self.objective(&theta, &penalties, precision);
            let mut next = proposal.clone();
            let mut step = 1.0;
            for _ in 0..MAX_STEP_HALVINGS {
                if self.objective(&next, &penalties, precision) <= current {
                    break;
                }
                step *= 0.5;
                next = theta
                    .iter()
                    .zip(&proposal)
                    .map(|(old, new)| old + step * (new - old))
                    .collect();
            }

            if next.iter().any(|v| !v.is_finite()) {
                return Err(ForecastError::ModelError(
                    "Fit diverged to non-finite coefficients".to_string(),
                ));
            }

            let change = theta
                .iter()
                .zip(&next)
                .map(|(old, new)| (old - new).abs())
                .fold(0.0, f64::max);
            theta = next;
            sigma = self.sigma(&theta);
            delta_weights = theta[2..n_trend]
                .iter()
                .map(|delta| 1.0 / (self.tau * delta.abs().max(DELTA_FLOOR)))
                .collect();

            if change < TOLERANCE {
                break;
            }
        }

        Ok((theta, sigma, iterations))
    }
}

/// Trained decomposition model bound to its training table
#[derive(Debug, Clone)]
pub struct TrainedDecomposition {
    model: DecompositionModel,
    history: FeatureTable,
    time: TimeScale,
    y_scale: f64,
    k: f64,
    m: f64,
    deltas: Vec<f64>,
    beta: Vec<f64>,
    changepoints: Vec<f64>,
    components: Vec<Component>,
    sigma: f64,
}

impl TrainedDecomposition {
    /// Dates of the potential changepoints
    pub fn changepoint_dates(&self) -> Vec<NaiveDateTime> {
        self.changepoints
            .iter()
            .map(|&t| self.time.unscale(t))
            .collect()
    }

    /// Fitted rate adjustment at each changepoint, in scaled units
    pub fn rate_changes(&self) -> &[f64] {
        &self.deltas
    }

    /// Names of the seasonal and regressor components, in column order
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Seasonalities selected for the history
    pub fn seasonalities(&self) -> Vec<&Seasonality> {
        self.components
            .iter()
            .filter_map(|c| match &c.kind {
                ComponentKind::Seasonal(seasonality) => Some(seasonality),
                ComponentKind::Regressor { .. } => None,
            })
            .collect()
    }

    /// Observation noise in target units
    pub fn noise_scale(&self) -> f64 {
        self.sigma * self.y_scale
    }
}

impl TrainedForecastModel for TrainedDecomposition {
    type Model = DecompositionModel;

    fn model(&self) -> &DecompositionModel {
        &self.model
    }

    fn predict(&self, rows: &[FrameRow]) -> Result<PredictionFrame> {
        let n = rows.len();
        let t: Vec<f64> = rows.iter().map(|row| self.time.scale(row.ds)).collect();

        let mut trend_scaled = Vec::with_capacity(n);
        let mut mult = vec![0.0; n];
        let mut add = vec![0.0; n];
        let mut component_values = vec![Vec::with_capacity(n); self.components.len()];

        for (i, row) in rows.iter().enumerate() {
            trend_scaled.push(piecewise_linear(t[i], self.k, self.m, &self.deltas, &self.changepoints));

            let features = feature_row(&self.components, row.ds, &row.covariates);
            let mut offset = 0;
            for (c, component) in self.components.iter().enumerate() {
                let value: f64 = features[offset..offset + component.width]
                    .iter()
                    .zip(&self.beta[offset..offset + component.width])
                    .map(|(x, b)| x * b)
                    .sum();
                offset += component.width;

                match component.mode {
                    SeasonalityMode::Multiplicative => {
                        mult[i] += value;
                        component_values[c].push(value);
                    }
                    SeasonalityMode::Additive => {
                        add[i] += value;
                        component_values[c].push(value * self.y_scale);
                    }
                }
            }
        }

        let trend: Vec<f64> = trend_scaled.iter().map(|g| g * self.y_scale).collect();
        let additive_terms: Vec<f64> = add.iter().map(|a| a * self.y_scale).collect();
        let yhat: Vec<f64> = (0..n)
            .map(|i| trend[i] * (1.0 + mult[i]) + additive_terms[i])
            .collect();

        let settings = self.model.settings();
        let (mut yhat_lower, mut yhat_upper, mut trend_lower, mut trend_upper) =
            if settings.uncertainty_samples == 0 || n == 0 {
                (yhat.clone(), yhat.clone(), trend.clone(), trend.clone())
            } else {
                let sampler = IntervalSampler {
                    samples: settings.uncertainty_samples,
                    width: settings.interval_width,
                    sigma: self.sigma,
                    y_scale: self.y_scale,
                    seed: settings.seed,
                };
                let intervals = sampler.sample(
                    TrendState {
                        k: self.k,
                        m: self.m,
                        deltas: &self.deltas,
                        changepoints: &self.changepoints,
                    },
                    PointComponents {
                        t: &t,
                        multiplicative: &mult,
                        additive: &add,
                    },
                )?;
                (
                    intervals.yhat_lower,
                    intervals.yhat_upper,
                    intervals.trend_lower,
                    intervals.trend_upper,
                )
            };

        // Keep point predictions inside their bounds
        for i in 0..n {
            yhat_lower[i] = yhat_lower[i].min(yhat[i]);
            yhat_upper[i] = yhat_upper[i].max(yhat[i]);
            trend_lower[i] = trend_lower[i].min(trend[i]);
            trend_upper[i] = trend_upper[i].max(trend[i]);
        }

        let mut frame = PredictionFrame::new(rows.iter().map(|row| row.ds).collect())
            .with_column("trend", trend)?
            .with_column("yhat_lower", yhat_lower)?
            .with_column("yhat_upper", yhat_upper)?
            .with_column("trend_lower", trend_lower)?
            .with_column("trend_upper", trend_upper)?
            .with_column("additive_terms", additive_terms)?
            .with_column("multiplicative_terms", mult)?;
        for (component, values) in self.components.iter().zip(component_values) {
            frame.push_column(component.name(), values)?;
        }
        frame.push_column("yhat", yhat)?;

        Ok(frame)
    }

    fn history(&self) -> &FeatureTable {
        &self.history
    }

    fn make_future_dates(&self, periods: usize) -> Result<Vec<NaiveDateTime>> {
        let last = self.history.last_date();
        let mut dates = self.history.dates();
        dates.reserve(periods);
        for step in 1..=periods {
            let next = last
                .checked_add_signed(Duration::days(step as i64))
                .ok_or_else(|| {
                    ForecastError::InvalidParameter(format!(
                        "{} periods after {} is out of range",
                        periods, last
                    ))
                })?;
            dates.push(next);
        }
        Ok(dates)
    }

    fn name(&self) -> &str {
        self.model.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Observation;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn history(n: usize, f: impl Fn(usize) -> f64) -> FeatureTable {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows = (0..n)
            .map(|i| Observation {
                ds: start + Duration::days(i as i64),
                y: f(i),
                covariates: Covariates {
                    humidity: 50.0 + (i % 5) as f64,
                    humidity_lag1: 50.0 + ((i + 4) % 5) as f64,
                    temp_rolling3: f(i),
                },
            })
            .collect();
        FeatureTable::new(rows).unwrap()
    }

    fn frame_rows(table: &FeatureTable) -> Vec<FrameRow> {
        table
            .rows()
            .iter()
            .map(|row| FrameRow {
                ds: row.ds,
                covariates: row.covariates,
            })
            .collect()
    }

    fn quick_settings() -> ModelSettings {
        ModelSettings::default().with_uncertainty_samples(100)
    }

    #[test]
    fn test_duplicate_regressor_rejected() {
        let mut model = DecompositionModel::new(Hyperparameters::default()).unwrap();
        model.add_regressor(Covariate::Humidity).unwrap();
        assert!(matches!(
            model.add_regressor(Covariate::Humidity),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_invalid_hyperparameters_rejected() {
        let params = Hyperparameters {
            changepoint_range: 0.0,
            ..Hyperparameters::default()
        };
        assert!(DecompositionModel::new(params).is_err());
    }

    #[test]
    fn test_fits_linear_trend() {
        let table = history(60, |i| 10.0 + 0.1 * i as f64);
        let model = DecompositionModel::new(Hyperparameters::default())
            .unwrap()
            .with_settings(quick_settings());
        let trained = model.train(&table).unwrap();

        let frame = trained.predict(&frame_rows(&table)).unwrap();
        let yhat = frame.column("yhat").unwrap();
        for (fitted, actual) in yhat.iter().zip(table.targets()) {
            assert_relative_eq!(*fitted, actual, epsilon = 0.1);
        }
        assert_eq!(trained.seasonalities().len(), 1);
    }

    #[test]
    fn test_changepoints_in_leading_share() {
        let table = history(100, |i| 5.0 + 0.2 * i as f64);
        let trained = DecompositionModel::new(Hyperparameters::default())
            .unwrap()
            .with_settings(quick_settings().with_n_changepoints(8))
            .train(&table)
            .unwrap();

        let dates = table.dates();
        let changepoints = trained.changepoint_dates();
        assert_eq!(changepoints.len(), 8);
        assert_eq!(trained.rate_changes().len(), 8);
        for date in &changepoints {
            assert!(*date > dates[0] && *date <= dates[79], "changepoint at {}", date);
        }

        // a straight line needs no rate changes and leaves little noise
        for delta in trained.rate_changes() {
            assert!(delta.abs() < 0.05, "rate change {}", delta);
        }
        assert!(trained.noise_scale() > 0.0 && trained.noise_scale() < 0.1);
    }

    #[test]
    fn test_recovers_weekly_pattern_multiplicative() {
        let table = history(120, |i| {
            let weekly = (2.0 * std::f64::consts::PI * i as f64 / 7.0).sin();
            20.0 * (1.0 + 0.1 * weekly)
        });
        let params = Hyperparameters {
            seasonality_mode: SeasonalityMode::Multiplicative,
            ..Hyperparameters::default()
        };
        let trained = DecompositionModel::new(params)
            .unwrap()
            .with_settings(quick_settings())
            .train(&table)
            .unwrap();

        let frame = trained.predict(&frame_rows(&table)).unwrap();
        let yhat = frame.column("yhat").unwrap();
        let rmse = forecast_math::statistics::rmse(yhat, &table.targets()).unwrap();
        assert!(rmse < 0.2, "rmse {}", rmse);
        assert!(frame.column("weekly").is_some());
    }

    #[test]
    fn test_prediction_columns_and_bounds() {
        let table = history(40, |i| 15.0 + (i % 7) as f64);
        let trained = DecompositionModel::new(Hyperparameters::default())
            .unwrap()
            .with_regressors(&Covariate::ALL)
            .unwrap()
            .with_settings(quick_settings())
            .train(&table)
            .unwrap();

        let frame = trained.predict(&frame_rows(&table)).unwrap();
        for column in [
            "trend",
            "trend_lower",
            "trend_upper",
            "additive_terms",
            "multiplicative_terms",
            "weekly",
            "humidity",
            "humidity_lag1",
            "temp_rolling3",
            "yhat",
            "yhat_lower",
            "yhat_upper",
        ] {
            assert!(frame.has_column(column), "missing {}", column);
        }

        let yhat = frame.column("yhat").unwrap();
        let lower = frame.column("yhat_lower").unwrap();
        let upper = frame.column("yhat_upper").unwrap();
        for i in 0..yhat.len() {
            assert!(lower[i] <= yhat[i] && yhat[i] <= upper[i]);
        }
        assert_eq!(trained.component_names().len(), 4);
    }

    #[test]
    fn test_predictions_are_deterministic() {
        let table = history(30, |i| 5.0 + (i as f64).sqrt());
        let model = DecompositionModel::new(Hyperparameters::default())
            .unwrap()
            .with_settings(quick_settings().with_seed(9));
        let rows = frame_rows(&table);

        let first = model.train(&table).unwrap().predict(&rows).unwrap();
        let second = model.train(&table).unwrap().predict(&rows).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_make_future_dates() {
        let table = history(10, |i| i as f64);
        let trained = DecompositionModel::new(Hyperparameters::default())
            .unwrap()
            .with_settings(quick_settings())
            .train(&table)
            .unwrap();

        let dates = trained.make_future_dates(3).unwrap();
        assert_eq!(dates.len(), 13);
        assert_eq!(dates[12], table.last_date() + Duration::days(3));
        assert_eq!(trained.make_future_dates(0).unwrap(), table.dates());
    }

    #[test]
    fn test_single_row_rejected() {
        let table = history(1, |_| 1.0);
        let model = DecompositionModel::new(Hyperparameters::default()).unwrap();
        assert!(matches!(model.train(&table), Err(ForecastError::ModelError(_))));
    }
}
