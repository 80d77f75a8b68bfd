//! # weathercast
//!
//! Tune, forecast and chart daily temperature from a weather CSV.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weather_forecast::data::format_timestamps;
use weather_forecast::pipeline;

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    info!(
        library = weather_forecast::NAME,
        version = weather_forecast::VERSION,
        input = %cli.input.display(),
        "starting"
    );
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.to_config()?;
    let output = pipeline::run(&config)
        .with_context(|| format!("forecasting from {} failed", config.input.display()))?;

    println!(
        "Best hyperparameters (trial {}, mean RMSE {:.4}):",
        output.report.best_trial, output.report.best_score
    );
    println!("{}", output.report.best_params_json()?);
    if output.report.failed_trials() > 0 {
        println!(
            "{} of {} trials failed",
            output.report.failed_trials(),
            output.report.trials.len()
        );
    }

    println!();
    println!("{:<20} {:>10} {:>12} {:>12}", "ds", "yhat", "yhat_lower", "yhat_upper");
    let dates: Vec<_> = output.horizon.iter().map(|row| row.ds).collect();
    for (ds, row) in format_timestamps(&dates).iter().zip(&output.horizon) {
        println!(
            "{:<20} {:>10.3} {:>12.3} {:>12.3}",
            ds, row.yhat, row.yhat_lower, row.yhat_upper
        );
    }

    for path in &output.artifacts {
        println!("wrote {}", path.display());
    }
    info!(artifacts = output.artifacts.len(), "done");
    Ok(())
}
