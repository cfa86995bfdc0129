//! Detection loop tests with a mock sampler, fixed-verdict scorers and
//! in-memory sinks

use super::*;
use crate::alert::MemorySink;
use crate::collector::async_trait;
use crate::error::EmissionError;
use crate::models::{fixtures, FeatureVector, Snapshot, Verdict};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sampler returning the fixture snapshot; optionally fires shutdown after
/// a number of samples, from inside the sample call
struct MockSampler {
    calls: Arc<AtomicUsize>,
    stop_after: usize,
    shutdown: Option<broadcast::Sender<()>>,
    delay: Duration,
}

impl MockSampler {
    fn new(stop_after: usize, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            stop_after,
            shutdown: Some(shutdown),
            delay: Duration::ZERO,
        }
    }

    /// Never stops on its own; shutdown comes from the caller
    fn endless() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            stop_after: usize::MAX,
            shutdown: None,
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MetricSampler for MockSampler {
    async fn sample(&mut self) -> Snapshot {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.stop_after {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        fixtures::snapshot()
    }
}

struct FixedScorer(Verdict);

impl Scorer for FixedScorer {
    fn score(&self, _features: &FeatureVector) -> Verdict {
        self.0
    }
}

struct FailingSink;

impl AlertSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn emit(&mut self, _record: &AlertRecord) -> Result<(), EmissionError> {
        Err(EmissionError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        )))
    }

    fn note(&mut self, _level: AlertLevel, _message: &str) -> Result<(), EmissionError> {
        Err(EmissionError::Closed)
    }
}

fn anomaly_entries(sink: &MemorySink) -> Vec<String> {
    sink.entries()
        .into_iter()
        .filter(|e| e.contains("ANOMALY:"))
        .collect()
}

fn detection_loop(
    sampler: MockSampler,
    verdict: Verdict,
    sink: MemorySink,
) -> DetectionLoop {
    DetectionLoopBuilder::new()
        .sampler(sampler)
        .scorer(Arc::new(FixedScorer(verdict)))
        .sink(sink)
        .interval(Duration::from_millis(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_anomaly_emits_alert_block() {
    let (tx, rx) = broadcast::channel(1);
    let sink = MemorySink::new();
    let detector = detection_loop(MockSampler::new(1, tx), Verdict::Anomaly, sink.clone());

    let summary = detector.run(rx).await.unwrap();

    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.anomalies, 1);
    let alerts = anomaly_entries(&sink);
    assert_eq!(alerts.len(), 1);
    let lines: Vec<&str> = alerts[0].lines().collect();
    assert!(lines.contains(&"CPU: 95.0%"));
    assert!(lines.contains(&"RAM: 88.0%"));
    assert!(lines.contains(&"Top Processes:"));
    assert!(!alerts[0].to_lowercase().contains("system idle process"));
}

#[tokio::test]
async fn test_normal_verdict_emits_nothing() {
    let (tx, rx) = broadcast::channel(1);
    let sink = MemorySink::new();
    let detector = detection_loop(MockSampler::new(3, tx), Verdict::Normal, sink.clone());

    let summary = detector.run(rx).await.unwrap();

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.anomalies, 0);
    assert!(anomaly_entries(&sink).is_empty());
}

#[tokio::test]
async fn test_failing_sink_does_not_stop_loop() {
    let (tx, rx) = broadcast::channel(1);
    let sink = MemorySink::new();
    let detector = DetectionLoopBuilder::new()
        .sampler(MockSampler::new(3, tx))
        .scorer(Arc::new(FixedScorer(Verdict::Anomaly)))
        .sink(FailingSink)
        .sink(sink.clone())
        .interval(Duration::from_millis(5))
        .build()
        .unwrap();

    let summary = detector.run(rx).await.unwrap();

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.emission_failures, 3);
    // The healthy sink still receives every record
    assert_eq!(anomaly_entries(&sink).len(), 3);
}

#[tokio::test]
async fn test_model_load_failure_stops_without_running() {
    let dir = tempfile::TempDir::new().unwrap();
    let (tx, rx) = broadcast::channel(1);
    let sampler = MockSampler::new(1, tx);
    let calls = Arc::clone(&sampler.calls);
    let health = HealthRegistry::with_detector_components().await;
    let sink = MemorySink::new();

    let detector = DetectionLoopBuilder::new()
        .sampler(sampler)
        .model_dir(dir.path())
        .sink(sink.clone())
        .health(health.clone())
        .build()
        .unwrap();
    let state = detector.subscribe_state();

    let err = detector.run(rx).await.unwrap_err();

    assert!(matches!(err, ModelLoadError::Missing { .. }));
    assert_eq!(*state.borrow(), LoopState::Stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!health.readiness().await.ready);
    assert!(sink.entries()[0].starts_with("ERROR - Failed to load model or scaler"));
}

#[tokio::test]
async fn test_loop_loads_model_from_directory() {
    let dir = tempfile::TempDir::new().unwrap();
    let corpus: Vec<FeatureVector> = (0..64)
        .map(|i| FeatureVector {
            cpu_usage: 5.0 + (i % 7) as f64,
            memory_usage: 30.0 + (i % 5) as f64,
            ..Default::default()
        })
        .collect();
    crate::baseline::fit(&corpus, 0.01)
        .unwrap()
        .save(dir.path())
        .unwrap();

    let (tx, rx) = broadcast::channel(1);
    let sink = MemorySink::new();
    let detector = DetectionLoopBuilder::new()
        .sampler(MockSampler::new(1, tx))
        .model_dir(dir.path())
        .sink(sink.clone())
        .build()
        .unwrap();

    let summary = detector.run(rx).await.unwrap();

    assert_eq!(summary.cycles, 1);
    assert_eq!(sink.entries()[0], "INFO - Model loaded successfully");
    assert_eq!(sink.entries()[1], "INFO - Starting real-time monitoring");
}

#[tokio::test]
async fn test_shutdown_mid_cycle_completes_record() {
    let (tx, rx) = broadcast::channel(1);
    let sink = MemorySink::new();
    // Shutdown arrives while the first sample is still in its window
    let sampler = MockSampler::new(1, tx).with_delay(Duration::from_millis(20));
    let detector = detection_loop(sampler, Verdict::Anomaly, sink.clone());

    let summary = detector.run(rx).await.unwrap();

    assert_eq!(summary.cycles, 1);
    let entries = sink.entries();
    let alert = entries
        .iter()
        .find(|e| e.contains("ANOMALY:"))
        .expect("alert emitted");
    assert!(alert.trim_end().ends_with("(9.0% CPU, 30.1% RAM)"));
    assert_eq!(
        entries.last().map(String::as_str),
        Some("INFO - Monitoring stopped by operator")
    );
}

#[tokio::test]
async fn test_shutdown_while_waiting_for_next_cycle() {
    let (tx, rx) = broadcast::channel(1);
    let sink = MemorySink::new();
    let sampler = MockSampler::endless();
    let calls = sampler.calls.clone();
    let detector = DetectionLoopBuilder::new()
        .sampler(sampler)
        .scorer(Arc::new(FixedScorer(Verdict::Normal)))
        .sink(sink.clone())
        .interval(Duration::from_secs(30))
        .build()
        .unwrap();

    let handle = tokio::spawn(detector.run(rx));
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tx.send(()).unwrap();

    // Stops well before the 30s wait would elapse
    let summary = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop stopped during the wait")
        .unwrap()
        .unwrap();

    assert_eq!(summary.cycles, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        sink.entries().last().map(String::as_str),
        Some("INFO - Monitoring stopped by operator")
    );
}

#[tokio::test]
async fn test_state_transitions_and_readiness() {
    let (tx, rx) = broadcast::channel(1);
    let health = HealthRegistry::with_detector_components().await;
    let detector = DetectionLoopBuilder::new()
        .sampler(MockSampler::new(2, tx))
        .scorer(Arc::new(FixedScorer(Verdict::Normal)))
        .health(health.clone())
        .interval(Duration::from_millis(5))
        .build()
        .unwrap();
    let mut state = detector.subscribe_state();
    assert_eq!(*state.borrow(), LoopState::Starting);

    let handle = tokio::spawn(detector.run(rx));

    // RUNNING is observed before the loop stops
    let mut seen_running = false;
    while state.changed().await.is_ok() {
        match *state.borrow() {
            LoopState::Running => seen_running = true,
            LoopState::Stopped => break,
            LoopState::Starting => {}
        }
    }
    let summary = handle.await.unwrap().unwrap();

    assert!(seen_running || summary.cycles > 0);
    assert_eq!(*state.borrow(), LoopState::Stopped);
    assert!(!health.readiness().await.ready);
}

#[tokio::test]
async fn test_fixed_period_counts_overruns() {
    let (tx, rx) = broadcast::channel(1);
    let sampler = MockSampler::new(3, tx).with_delay(Duration::from_millis(30));
    let detector = DetectionLoopBuilder::new()
        .sampler(sampler)
        .scorer(Arc::new(FixedScorer(Verdict::Normal)))
        .interval(Duration::from_millis(5))
        .schedule(Schedule::FixedPeriod)
        .build()
        .unwrap();

    let summary = detector.run(rx).await.unwrap();

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.overruns, 3);
}

#[tokio::test]
async fn test_fixed_delay_never_overruns() {
    let (tx, rx) = broadcast::channel(1);
    let sampler = MockSampler::new(2, tx).with_delay(Duration::from_millis(10));
    let detector = DetectionLoopBuilder::new()
        .sampler(sampler)
        .scorer(Arc::new(FixedScorer(Verdict::Normal)))
        .interval(Duration::from_millis(5))
        .schedule(Schedule::FixedDelay)
        .build()
        .unwrap();

    let summary = detector.run(rx).await.unwrap();
    assert_eq!(summary.overruns, 0);
}

#[test]
fn test_builder_requires_sampler_and_model() {
    assert!(DetectionLoopBuilder::new()
        .scorer(Arc::new(FixedScorer(Verdict::Normal)))
        .build()
        .is_err());

    let (tx, _rx) = broadcast::channel(1);
    assert!(DetectionLoopBuilder::new()
        .sampler(MockSampler::new(1, tx))
        .build()
        .is_err());
}

#[test]
fn test_builder_rejects_zero_interval() {
    let (tx, _rx) = broadcast::channel(1);
    let result = DetectionLoopBuilder::new()
        .sampler(MockSampler::new(1, tx))
        .scorer(Arc::new(FixedScorer(Verdict::Normal)))
        .interval(Duration::ZERO)
        .build();
    assert!(result.is_err());
}

#[test]
fn test_detection_config_default() {
    let config = DetectionConfig::default();
    assert_eq!(config.interval, Duration::from_secs(3));
    assert_eq!(config.schedule, Schedule::FixedPeriod);
    assert_eq!(Schedule::FixedDelay.to_string(), "fixed_delay");
}
