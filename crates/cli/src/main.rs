//! Hostwatch CLI
//!
//! Offline tooling around the detector: assembling a training corpus,
//! fitting and inspecting the baseline, and summarizing the alert log.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{analyze, collect, inspect, train};
use hostwatch_lib::Settings;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Hostwatch host anomaly detector CLI
#[derive(Parser)]
#[command(name = "hostwatch")]
#[command(author, version, about = "CLI for the Hostwatch host anomaly detector", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to ./hostwatch.toml when present)
    #[arg(long, short, env = "HOSTWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample the host and write a training corpus CSV
    Collect {
        /// Number of snapshots to take
        #[arg(long, short, default_value_t = 1000)]
        samples: usize,

        /// Seconds to wait between snapshots
        #[arg(long, short, default_value_t = 1.0)]
        interval: f64,

        /// Output CSV path
        #[arg(long, short, default_value = "system_metrics.csv")]
        output: PathBuf,
    },

    /// Fit the baseline model on a corpus and persist it
    Train {
        /// Training corpus CSV
        #[arg(long, default_value = "system_metrics.csv")]
        corpus: PathBuf,

        /// Directory to write the model artifacts to (overrides settings)
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Assumed anomalous fraction of the corpus (overrides settings)
        #[arg(long)]
        contamination: Option<f64>,
    },

    /// Show the persisted baseline model
    Inspect {
        /// Directory holding the model artifacts (overrides settings)
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },

    /// Summarize an alert log
    Analyze {
        /// Alert log to read (overrides settings)
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Collect {
            samples,
            interval,
            output,
        } => {
            collect::collect_corpus(samples, interval, &output).await?;
        }
        Commands::Train {
            corpus,
            model_dir,
            contamination,
        } => {
            let mut params = settings.forest_params();
            if let Some(contamination) = contamination {
                params.contamination = contamination;
            }
            let model_dir = model_dir.unwrap_or(settings.model_dir);
            train::train_model(&corpus, &model_dir, &params, cli.format)?;
        }
        Commands::Inspect { model_dir } => {
            let model_dir = model_dir.unwrap_or(settings.model_dir);
            inspect::show_model(&model_dir, cli.format)?;
        }
        Commands::Analyze { log } => {
            let log = log.unwrap_or(settings.alert_log);
            analyze::analyze_log(&log, cli.format)?;
        }
    }

    Ok(())
}
