//! Layered settings shared by the agent and the CLI
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, `HOSTWATCH_*` environment variables.

use crate::baseline::ForestParams;
use crate::detector::Schedule;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "hostwatch.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HOSTWATCH";

/// Output format of the diagnostic log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Settings could not be loaded or failed validation
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_interval")]
    pub monitor_interval_seconds: f64,

    /// Only read by the trainer
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_alert_log")]
    pub alert_log: PathBuf,

    /// Health/metrics HTTP port; 0 disables the server
    #[serde(default)]
    pub api_port: u16,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_host_name")]
    pub host_name: String,

    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    #[serde(default)]
    pub schedule: Schedule,
}

fn default_interval() -> f64 {
    3.0
}

fn default_contamination() -> f64 {
    0.0001
}

fn default_model_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_alert_log() -> PathBuf {
    PathBuf::from("anomaly_detection.log")
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_samples() -> usize {
    256
}

fn default_random_seed() -> u64 {
    42
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitor_interval_seconds: default_interval(),
            contamination: default_contamination(),
            model_dir: default_model_dir(),
            alert_log: default_alert_log(),
            api_port: 0,
            log_format: LogFormat::default(),
            host_name: default_host_name(),
            n_estimators: default_n_estimators(),
            max_samples: default_max_samples(),
            random_seed: default_random_seed(),
            schedule: Schedule::default(),
        }
    }
}

impl Settings {
    /// Load from `path` (required when given) or `hostwatch.toml` (optional),
    /// then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(p) => config::File::from(p.to_path_buf()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.monitor_interval_seconds.is_finite() && self.monitor_interval_seconds > 0.0) {
            return Err(SettingsError::Invalid {
                key: "monitor_interval_seconds",
                reason: format!("must be positive, got {}", self.monitor_interval_seconds),
            });
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(SettingsError::Invalid {
                key: "contamination",
                reason: format!("must be in (0, 0.5], got {}", self.contamination),
            });
        }
        if self.n_estimators == 0 {
            return Err(SettingsError::Invalid {
                key: "n_estimators",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_samples == 0 {
            return Err(SettingsError::Invalid {
                key: "max_samples",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_interval_seconds)
    }

    /// Forest parameters for the trainer
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            contamination: self.contamination,
            seed: self.random_seed,
        }
    }
}
