//! Command-line arguments

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use weather_forecast::{ChartOutput, PipelineConfig, TunerConfig};

#[derive(Debug, Parser)]
#[command(name = "weathercast")]
#[command(version, about = "Forecast daily temperature from a weather CSV", long_about = None)]
pub struct Cli {
    /// Weather CSV with ds, temperature_celsius (or y) and humidity columns
    #[arg(short, long)]
    pub input: PathBuf,

    /// Number of days to forecast
    #[arg(short, long, default_value_t = 7)]
    pub periods: usize,

    /// Write the full forecast to this CSV file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Hyperparameter search trials
    #[arg(long, default_value_t = 20)]
    pub trials: usize,

    /// Seed for the search and the interval simulation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory for the chart images
    #[arg(long, default_value = ".")]
    pub chart_dir: PathBuf,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,
}

impl Cli {
    /// Pipeline configuration for these arguments
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let mut tuner = TunerConfig::default()
            .with_trials(self.trials)
            .context("invalid --trials")?;
        if let Some(seed) = self.seed {
            tuner = tuner.with_seed(seed);
        }

        let charts = if self.no_charts {
            ChartOutput::Disabled
        } else {
            ChartOutput::in_dir(&self.chart_dir)
        };

        let mut config = PipelineConfig::new(&self.input)
            .with_periods(self.periods)
            .context("invalid --periods")?
            .with_tuner(tuner)
            .with_charts(charts);
        if let Some(output) = &self.output {
            config = config.with_output(output);
        }
        Ok(config)
    }
}
