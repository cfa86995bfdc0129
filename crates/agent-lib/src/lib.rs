//! Host metric anomaly detection library
//!
//! This crate provides the core functionality for:
//! - Sampling host resource metrics and recent system log lines
//! - Fitting and loading the baseline model (standard scaler + isolation forest)
//! - The online detection loop and its alert sinks
//! - Alert log analysis
//! - Settings, health checks and observability

pub mod alert;
pub mod baseline;
pub mod collector;
pub mod detector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod settings;

pub use baseline::{BaselineModel, Scorer};
pub use detector::{DetectionLoop, DetectionLoopBuilder, LoopState, RunSummary, Schedule};
pub use error::{CollectionError, EmissionError, InsufficientDataError, ModelLoadError, TrainError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use settings::{LogFormat, Settings, SettingsError};
