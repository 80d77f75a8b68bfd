//! End-to-end forecasting run

use crate::data::DataLoader;
use crate::error::{ForecastError, Result};
use crate::features::FeatureEngineer;
use crate::forecasting::{generate_forecast, make_future_frame, ForecastRow, ForecastTable};
use crate::report::{export_csv, plot_forecast, plot_horizon, HISTORY_CHART, HORIZON_CHART};
use crate::tuning::{Tuner, TunerConfig, TuningReport};
use std::path::{Path, PathBuf};
use tracing::info;

/// Where charts are written, if anywhere
#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutput {
    Disabled,
    Render { history: PathBuf, horizon: PathBuf },
}

impl ChartOutput {
    /// Both charts under `dir` with their default names
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        ChartOutput::Render {
            history: dir.join(HISTORY_CHART),
            horizon: dir.join(HORIZON_CHART),
        }
    }
}

impl Default for ChartOutput {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub periods: usize,
    pub output: Option<PathBuf>,
    pub features: FeatureEngineer,
    pub tuner: TunerConfig,
    pub charts: ChartOutput,
}

impl PipelineConfig {
    /// Forecast 7 days from `input` with default tuning and charts in the
    /// working directory
    pub fn new<P: Into<PathBuf>>(input: P) -> Self {
        Self {
            input: input.into(),
            periods: 7,
            output: None,
            features: FeatureEngineer::default(),
            tuner: TunerConfig::default(),
            charts: ChartOutput::default(),
        }
    }

    pub fn with_periods(mut self, periods: usize) -> Result<Self> {
        if periods == 0 {
            return Err(ForecastError::InvalidParameter(
                "Forecast periods must be positive".to_string(),
            ));
        }
        self.periods = periods;
        Ok(self)
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, output: P) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_features(mut self, features: FeatureEngineer) -> Self {
        self.features = features;
        self
    }

    pub fn with_tuner(mut self, tuner: TunerConfig) -> Self {
        self.tuner = tuner;
        self
    }

    pub fn with_charts(mut self, charts: ChartOutput) -> Self {
        self.charts = charts;
        self
    }
}

/// Results of a run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: TuningReport,
    pub forecast: ForecastTable,
    /// Forecast rows after the last observation
    pub horizon: Vec<ForecastRow>,
    /// Files written, in order
    pub artifacts: Vec<PathBuf>,
}

/// Load, engineer, tune, forecast, export and chart
pub fn run(config: &PipelineConfig) -> Result<PipelineOutput> {
    if config.periods == 0 {
        return Err(ForecastError::InvalidParameter(
            "Forecast periods must be positive".to_string(),
        ));
    }

    let observations = DataLoader::from_csv(&config.input)?;
    let features = config.features.transform(&observations)?;
    info!(rows = features.len(), "prepared features");

    let tuned = Tuner::new(config.tuner.clone())?.tune(&features)?;

    let frame = make_future_frame(&tuned.model, &features, config.periods)?;
    let forecast = generate_forecast(&tuned.model, &frame)?;
    let horizon = forecast.after(features.last_date(), config.periods);
    info!(rows = forecast.len(), future = horizon.len(), "generated forecast");

    let mut artifacts = Vec::new();
    if let Some(output) = &config.output {
        export_csv(&forecast, output)?;
        artifacts.push(output.clone());
    }

    if let ChartOutput::Render { history, horizon: horizon_path } = &config.charts {
        plot_forecast(&forecast, history)?;
        artifacts.push(history.clone());
        plot_horizon(&horizon, horizon_path)?;
        artifacts.push(horizon_path.clone());
    }

    Ok(PipelineOutput {
        report: tuned.report,
        forecast,
        horizon,
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::new("weather.csv");
        assert_eq!(config.periods, 7);
        assert_eq!(config.output, None);
        assert_eq!(
            config.charts,
            ChartOutput::Render {
                history: PathBuf::from("./Historical and Future Forecast.png"),
                horizon: PathBuf::from("./Next 7 days Forecast.png"),
            }
        );
        assert!(PipelineConfig::new("weather.csv").with_periods(0).is_err());
    }

    #[test]
    fn test_missing_input_is_reported() {
        let config = PipelineConfig::new("/definitely/not/here.csv").with_charts(ChartOutput::Disabled);
        assert!(matches!(run(&config), Err(ForecastError::NotFound { .. })));
    }
}
