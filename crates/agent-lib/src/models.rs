//! Core data models for the host detector

use serde::{Deserialize, Serialize};

/// Number of features scored by the baseline model
pub const FEATURE_COUNT: usize = 7;

/// Column names in the order the baseline model is fitted on
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "cpu_usage",
    "memory_usage",
    "disk_io_read",
    "disk_io_write",
    "network_io_sent",
    "network_io_received",
    "log_count",
];

/// Resource usage of a single process at sampling time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    /// CPU percent, rounded to one decimal
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    /// Share of total memory in percent, rounded to one decimal
    #[serde(rename = "memory")]
    pub memory_percent: f64,
}

/// Point-in-time reading of host resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_io_read: u64,
    pub disk_io_write: u64,
    pub network_io_sent: u64,
    pub network_io_received: u64,
    pub log_count: u64,
    /// Top processes by CPU, descending, at most three
    pub top_processes: Vec<ProcessUsage>,
    /// Top processes by memory, descending, at most three
    pub top_memory_processes: Vec<ProcessUsage>,
    /// Recent error/critical log lines, at most five
    pub recent_logs: Vec<String>,
}

impl Snapshot {
    /// Project the snapshot onto the scored feature set.
    pub fn to_feature_vector(&self) -> FeatureVector {
        FeatureVector {
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            disk_io_read: self.disk_io_read as f64,
            disk_io_write: self.disk_io_write as f64,
            network_io_sent: self.network_io_sent as f64,
            network_io_received: self.network_io_received as f64,
            log_count: self.log_count as f64,
        }
    }
}

/// Named-field feature vector shared by training and scoring
///
/// Field names double as the corpus column names, so a corpus row
/// deserializes straight into this type regardless of column order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_io_read: f64,
    pub disk_io_write: f64,
    pub network_io_sent: f64,
    pub network_io_received: f64,
    pub log_count: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.cpu_usage,
            self.memory_usage,
            self.disk_io_read,
            self.disk_io_write,
            self.network_io_sent,
            self.network_io_received,
            self.log_count,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        let [cpu_usage, memory_usage, disk_io_read, disk_io_write, network_io_sent, network_io_received, log_count] =
            values;
        Self {
            cpu_usage,
            memory_usage,
            disk_io_read,
            disk_io_write,
            network_io_sent,
            network_io_received,
            log_count,
        }
    }
}

/// Free-function form of [`Snapshot::to_feature_vector`]
pub fn to_feature_vector(snapshot: &Snapshot) -> FeatureVector {
    snapshot.to_feature_vector()
}

/// Binary classification of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Normal,
    Anomaly,
}

impl Verdict {
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Verdict::Anomaly)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Normal => write!(f, "normal"),
            Verdict::Anomaly => write!(f, "anomaly"),
        }
    }
}
