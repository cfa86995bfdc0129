//! Observability infrastructure for the detector
//!
//! Provides:
//! - Prometheus metrics (sampling and scoring latency, cycle and alert counters, model info)
//! - Structured event logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, GaugeVec, Histogram,
    IntCounter,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Buckets for scoring latency (in seconds)
const SCORE_LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Buckets for sampling latency; a sample includes the CPU measurement window
const SAMPLE_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 1.1, 1.25, 1.5, 2.0, 3.0, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    sample_latency_seconds: Histogram,
    score_latency_seconds: Histogram,
    cycles: IntCounter,
    anomalies: IntCounter,
    collection_errors: IntCounter,
    emission_failures: IntCounter,
    cycle_overruns: IntCounter,
    model_info: GaugeVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            sample_latency_seconds: register_histogram!(
                "hostwatch_sample_latency_seconds",
                "Time spent taking one host snapshot, including the CPU window",
                SAMPLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sample_latency_seconds"),

            score_latency_seconds: register_histogram!(
                "hostwatch_score_latency_seconds",
                "Time spent normalizing and scoring one feature vector",
                SCORE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register score_latency_seconds"),

            cycles: register_int_counter!(
                "hostwatch_cycles_total",
                "Total number of completed detection cycles"
            )
            .expect("Failed to register cycles_total"),

            anomalies: register_int_counter!(
                "hostwatch_anomalies_total",
                "Total number of samples judged anomalous"
            )
            .expect("Failed to register anomalies_total"),

            collection_errors: register_int_counter!(
                "hostwatch_collection_errors_total",
                "Total number of snapshot fields degraded by collection failures"
            )
            .expect("Failed to register collection_errors_total"),

            emission_failures: register_int_counter!(
                "hostwatch_emission_failures_total",
                "Total number of alert sink writes that failed"
            )
            .expect("Failed to register emission_failures_total"),

            cycle_overruns: register_int_counter!(
                "hostwatch_cycle_overruns_total",
                "Total number of cycles that took longer than the interval"
            )
            .expect("Failed to register cycle_overruns_total"),

            model_info: register_gauge_vec!(
                "hostwatch_model_info",
                "Information about the loaded baseline model",
                &["trees", "contamination"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Detector metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_sample_latency(&self, duration_secs: f64) {
        self.inner().sample_latency_seconds.observe(duration_secs);
    }

    pub fn observe_score_latency(&self, duration_secs: f64) {
        self.inner().score_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycles(&self) {
        self.inner().cycles.inc();
    }

    pub fn inc_anomalies(&self) {
        self.inner().anomalies.inc();
    }

    /// Add degraded snapshot fields reported by the sampler
    pub fn add_collection_errors(&self, count: u64) {
        self.inner().collection_errors.inc_by(count);
    }

    pub fn inc_emission_failures(&self) {
        self.inner().emission_failures.inc();
    }

    pub fn inc_cycle_overruns(&self) {
        self.inner().cycle_overruns.inc();
    }

    /// Publish the loaded model's shape
    pub fn set_model_info(&self, trees: usize, contamination: f64) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[&trees.to_string(), &contamination.to_string()])
            .set(1.0);
    }
}

/// Structured logger for detector events
///
/// Emits the significant lifecycle and detection events with a consistent
/// set of fields so they can be filtered in JSON output.
#[derive(Clone)]
pub struct StructuredLogger {
    host_name: String,
}

impl StructuredLogger {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Log detector startup
    pub fn log_startup(&self, version: &str, interval_secs: f64, schedule: &str) {
        info!(
            event = "detector_started",
            host = %self.host_name,
            version = %version,
            interval_secs = interval_secs,
            schedule = %schedule,
            "Host anomaly detector started"
        );
    }

    /// Log a successfully loaded baseline
    pub fn log_model_loaded(&self, model_dir: &str, trees: usize, contamination: f64) {
        info!(
            event = "model_loaded",
            host = %self.host_name,
            model_dir = %model_dir,
            trees = trees,
            contamination = contamination,
            "Baseline model loaded"
        );
    }

    /// Log a baseline that could not be loaded
    pub fn log_model_load_failed(&self, model_dir: &str, reason: &str) {
        error!(
            event = "model_load_failed",
            host = %self.host_name,
            model_dir = %model_dir,
            reason = %reason,
            "Failed to load baseline model"
        );
    }

    /// Log an anomalous verdict
    pub fn log_anomaly(&self, cpu_usage: f64, memory_usage: f64, log_count: u64, decision: Option<f64>) {
        warn!(
            event = "anomaly_detected",
            host = %self.host_name,
            cpu_usage = cpu_usage,
            memory_usage = memory_usage,
            log_count = log_count,
            decision = ?decision,
            "Anomaly detected"
        );
    }

    /// Log a sink write that failed; the alert is carried by this line instead
    pub fn log_emission_failure(&self, sink: &str, reason: &str, block: &str) {
        error!(
            event = "alert_emission_failed",
            host = %self.host_name,
            sink = %sink,
            reason = %reason,
            alert = %block,
            "Alert sink write failed"
        );
    }

    /// Log a cycle that ran past its slot
    pub fn log_overrun(&self, cycle: u64, elapsed_ms: u128, interval_ms: u128) {
        warn!(
            event = "cycle_overrun",
            host = %self.host_name,
            cycle = cycle,
            elapsed_ms = elapsed_ms as u64,
            interval_ms = interval_ms as u64,
            "Detection cycle exceeded interval"
        );
    }

    /// Log detector shutdown
    pub fn log_shutdown(&self, reason: &str, cycles: u64, anomalies: u64) {
        info!(
            event = "detector_stopped",
            host = %self.host_name,
            reason = %reason,
            cycles = cycles,
            anomalies = anomalies,
            "Host anomaly detector stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_metrics_creation() {
        let metrics = AgentMetrics::new();

        metrics.observe_sample_latency(1.01);
        metrics.observe_score_latency(0.0002);
        metrics.set_model_info(100, 0.0001);
        metrics.add_collection_errors(2);

        let before = counter_value("hostwatch_cycle_overruns_total");
        metrics.inc_cycle_overruns();
        assert!(counter_value("hostwatch_cycle_overruns_total") > before);
    }

    fn counter_value(name: &str) -> f64 {
        prometheus::gather()
            .iter()
            .find(|family| family.get_name() == name)
            .map(|family| family.get_metric()[0].get_counter().get_value())
            .unwrap_or(0.0)
    }

    #[test]
    fn test_metrics_are_exported() {
        let metrics = AgentMetrics::new();
        metrics.inc_cycles();

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "hostwatch_cycles_total"));
        assert!(names.iter().any(|n| n == "hostwatch_sample_latency_seconds"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-host");
        assert_eq!(logger.host_name(), "test-host");
        logger.log_shutdown("test", 0, 0);
    }
}
