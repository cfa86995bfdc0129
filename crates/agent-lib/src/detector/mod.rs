//! Online detection loop
//!
//! The loop loads the baseline once, then repeatedly samples the host,
//! scores the snapshot and hands anomalous ones to every alert sink. A cycle
//! is never interrupted: shutdown is only observed while waiting for the next
//! cycle.

#[cfg(test)]
mod tests;

use crate::alert::{AlertLevel, AlertRecord, AlertSink};
use crate::baseline::{BaselineModel, Scorer};
use crate::collector::MetricSampler;
use crate::error::ModelLoadError;
use crate::health::{components, HealthRegistry};
use crate::observability::{AgentMetrics, StructuredLogger};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a detection loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Starting,
    Running,
    Stopped,
}

/// How the start of the next cycle is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// Next cycle starts one interval after the previous one started
    #[default]
    FixedPeriod,
    /// Next cycle starts one interval after the previous one finished
    FixedDelay,
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::FixedPeriod => write!(f, "fixed_period"),
            Schedule::FixedDelay => write!(f, "fixed_delay"),
        }
    }
}

/// Configuration for the detection loop
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Cycle period (default: 3 seconds)
    pub interval: Duration,
    pub schedule: Schedule,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            schedule: Schedule::FixedPeriod,
        }
    }
}

/// Where the loop gets its baseline from during STARTING
pub enum ModelSource {
    /// Load the persisted artifacts from a directory
    Directory(PathBuf),
    /// Use an already constructed scorer
    Loaded(Arc<dyn Scorer>),
}

/// Counters for one run of the loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub anomalies: u64,
    pub emission_failures: u64,
    pub overruns: u64,
}

/// Sample → score → alert loop for one host
pub struct DetectionLoop {
    sampler: Box<dyn MetricSampler>,
    model: ModelSource,
    sinks: Vec<Box<dyn AlertSink>>,
    config: DetectionConfig,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
    state_tx: watch::Sender<LoopState>,
    summary: RunSummary,
}

impl DetectionLoop {
    /// Observe state transitions; subscribe before calling [`run`](Self::run)
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state_tx.subscribe()
    }

    /// Run until `shutdown` fires
    ///
    /// Returns the run counters after a graceful stop, or the load error if
    /// the baseline could not be loaded (the loop then never enters RUNNING).
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<RunSummary, ModelLoadError> {
        self.set_state(LoopState::Starting);

        let scorer = match self.load_scorer() {
            Ok(scorer) => scorer,
            Err(e) => {
                self.health
                    .set_unhealthy(components::BASELINE, e.to_string())
                    .await;
                self.set_state(LoopState::Stopped);
                return Err(e);
            }
        };

        self.set_state(LoopState::Running);
        self.health.set_ready(true).await;
        self.note(AlertLevel::Info, "Starting real-time monitoring");
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            schedule = %self.config.schedule,
            sinks = self.sinks.len(),
            "Starting detection loop"
        );

        let mut next_start = Instant::now();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutting down detection loop");
                    break;
                }
                _ = tokio::time::sleep_until(next_start) => {}
            }

            let cycle_start = Instant::now();
            self.run_cycle(scorer.as_ref()).await;

            next_start = self.next_start(cycle_start);
        }

        self.note(AlertLevel::Info, "Monitoring stopped by operator");
        self.health.set_ready(false).await;
        self.set_state(LoopState::Stopped);
        self.logger
            .log_shutdown("operator", self.summary.cycles, self.summary.anomalies);

        Ok(self.summary)
    }

    fn load_scorer(&mut self) -> Result<Arc<dyn Scorer>, ModelLoadError> {
        let source = std::mem::replace(&mut self.model, ModelSource::Directory(PathBuf::new()));
        match source {
            ModelSource::Loaded(scorer) => Ok(scorer),
            ModelSource::Directory(dir) => {
                let display = dir.display().to_string();
                match BaselineModel::load(&dir) {
                    Ok(model) => {
                        let trees = model.forest.tree_count();
                        let contamination = model.forest.params.contamination;
                        self.metrics.set_model_info(trees, contamination);
                        self.logger.log_model_loaded(&display, trees, contamination);
                        self.note(AlertLevel::Info, "Model loaded successfully");
                        Ok(Arc::new(model))
                    }
                    Err(e) => {
                        self.logger.log_model_load_failed(&display, &e.to_string());
                        self.note(
                            AlertLevel::Error,
                            &format!("Failed to load model or scaler: {}", e),
                        );
                        Err(e)
                    }
                }
            }
        }
    }

    /// One complete sample → score → alert sequence
    async fn run_cycle(&mut self, scorer: &dyn Scorer) {
        let sample_start = Instant::now();
        let snapshot = self.sampler.sample().await;
        self.metrics
            .observe_sample_latency(sample_start.elapsed().as_secs_f64());

        let degraded = self.sampler.take_degraded_fields();
        if degraded > 0 {
            self.metrics.add_collection_errors(degraded);
            self.health
                .set_degraded(
                    components::SAMPLER,
                    format!("{} snapshot fields degraded", degraded),
                )
                .await;
        } else {
            self.health.set_healthy(components::SAMPLER).await;
        }

        let features = snapshot.to_feature_vector();
        let score_start = Instant::now();
        let verdict = scorer.score(&features);
        self.metrics
            .observe_score_latency(score_start.elapsed().as_secs_f64());

        self.summary.cycles += 1;
        self.metrics.inc_cycles();
        debug!(cycle = self.summary.cycles, verdict = %verdict, "Detection cycle complete");

        if verdict.is_anomaly() {
            self.summary.anomalies += 1;
            self.metrics.inc_anomalies();
            self.logger.log_anomaly(
                snapshot.cpu_usage,
                snapshot.memory_usage,
                snapshot.log_count,
                scorer.decision(&features),
            );
            let record = AlertRecord::from_snapshot(snapshot);
            self.emit(&record).await;
        }
    }

    /// Hand the record to every sink; a failing sink never stops the others
    async fn emit(&mut self, record: &AlertRecord) {
        let mut failed = Vec::new();
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.emit(record) {
                failed.push(format!("{}: {}", sink.name(), e));
                self.logger
                    .log_emission_failure(sink.name(), &e.to_string(), &record.render_block());
            }
        }

        if failed.is_empty() {
            self.health.set_healthy(components::ALERT_SINK).await;
        } else {
            self.summary.emission_failures += failed.len() as u64;
            for _ in &failed {
                self.metrics.inc_emission_failures();
            }
            self.health
                .set_degraded(components::ALERT_SINK, failed.join("; "))
                .await;
        }
    }

    fn next_start(&mut self, cycle_start: Instant) -> Instant {
        let now = Instant::now();
        match self.config.schedule {
            Schedule::FixedDelay => now + self.config.interval,
            Schedule::FixedPeriod => {
                let due = cycle_start + self.config.interval;
                if now > due {
                    self.summary.overruns += 1;
                    self.metrics.inc_cycle_overruns();
                    self.logger.log_overrun(
                        self.summary.cycles,
                        (now - cycle_start).as_millis(),
                        self.config.interval.as_millis(),
                    );
                    now
                } else {
                    due
                }
            }
        }
    }

    fn note(&mut self, level: AlertLevel, message: &str) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.note(level, message) {
                warn!(sink = sink.name(), error = %e, note = message, "Failed to write note to alert sink");
            }
        }
    }

    fn set_state(&self, state: LoopState) {
        debug!(state = ?state, "Detection loop state change");
        self.state_tx.send_replace(state);
    }
}

/// Builder for creating the detection loop
pub struct DetectionLoopBuilder {
    sampler: Option<Box<dyn MetricSampler>>,
    model: Option<ModelSource>,
    sinks: Vec<Box<dyn AlertSink>>,
    config: DetectionConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl DetectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            sampler: None,
            model: None,
            sinks: Vec::new(),
            config: DetectionConfig::default(),
            health: None,
            logger: None,
        }
    }

    pub fn sampler(mut self, sampler: impl MetricSampler + 'static) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    /// Load the baseline from `dir` when the loop starts
    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model = Some(ModelSource::Directory(dir.into()));
        self
    }

    /// Use an already constructed scorer
    pub fn scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.model = Some(ModelSource::Loaded(scorer));
        self
    }

    /// Add an alert sink; sinks receive records in insertion order
    pub fn sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.config.schedule = schedule;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the detection loop
    pub fn build(self) -> Result<DetectionLoop> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let model = self
            .model
            .ok_or_else(|| anyhow::anyhow!("Model source is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Detection interval must be positive");
        }

        let (state_tx, _) = watch::channel(LoopState::Starting);

        Ok(DetectionLoop {
            sampler,
            model,
            sinks: self.sinks,
            config: self.config,
            metrics: AgentMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("localhost")),
            health: self.health.unwrap_or_default(),
            state_tx,
            summary: RunSummary::default(),
        })
    }
}

impl Default for DetectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
