//! Hostwatch agent - online host anomaly detector
//!
//! Loads the baseline fitted by `hostwatch train`, samples the host every
//! interval and reports anomalous snapshots to the alert log and the console.

use anyhow::Result;
use clap::Parser;
use hostwatch_lib::{
    alert::{ConsoleSink, FileAlertSink},
    collector,
    health::HealthRegistry,
    observability::StructuredLogger,
    DetectionLoopBuilder, LogFormat, Settings,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "hostwatch-agent", version, about = "Real-time host anomaly detector")]
struct Args {
    /// Settings file (defaults to ./hostwatch.toml when present)
    #[arg(short, long, env = "HOSTWATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("hostwatch-agent: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(settings.log_format);

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Agent stopped");
            eprintln!("hostwatch-agent: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr so they never interleave with the console sink
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (json, text) = match format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        LogFormat::Text => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

async fn run(settings: Settings) -> Result<()> {
    info!(host = %settings.host_name, "Starting hostwatch-agent");

    let health_registry = HealthRegistry::with_detector_components().await;
    let logger = StructuredLogger::new(&settings.host_name);
    logger.log_startup(
        AGENT_VERSION,
        settings.monitor_interval_seconds,
        &settings.schedule.to_string(),
    );

    if settings.api_port != 0 {
        let health = health_registry.clone();
        let port = settings.api_port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, health).await {
                error!(error = %e, "API server stopped");
            }
        });
    }

    let mut builder = DetectionLoopBuilder::new()
        .sampler(collector::create_sampler())
        .model_dir(&settings.model_dir)
        .interval(settings.interval())
        .schedule(settings.schedule)
        .health(health_registry)
        .logger(logger);

    match FileAlertSink::open(&settings.alert_log) {
        Ok(sink) => {
            info!(path = %sink.path().display(), "Writing alerts to file");
            builder = builder.sink(sink);
        }
        Err(e) => warn!(
            path = %settings.alert_log.display(),
            error = %e,
            "Alert log unavailable, reporting to the console only"
        ),
    }
    let detector = builder.sink(ConsoleSink::stdout()).build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping after the current cycle"),
            Err(e) => error!(error = %e, "Failed to listen for interrupt"),
        }
        let _ = shutdown_tx.send(());
    });

    let summary = detector.run(shutdown_rx).await?;
    info!(
        cycles = summary.cycles,
        anomalies = summary.anomalies,
        emission_failures = summary.emission_failures,
        overruns = summary.overruns,
        "Detection loop stopped"
    );

    Ok(())
}
