//! Host metrics sampling
//!
//! A [`MetricSampler`] produces one [`Snapshot`] per call. The production
//! sampler combines a [`HostProbe`] (OS counters and process table) with a
//! [`LogSource`] (recent error-level system log lines). Partial failures in
//! either degrade single fields instead of failing the snapshot.

mod diskstats;
mod logs;
mod processes;
mod system;


pub use diskstats::{parse_diskstats, read_diskstats, MonotonicCounter, SECTOR_SIZE};
pub use logs::{
    detect_log_source, CommandLogSource, StaticLogSource, LOG_FAILURE_PLACEHOLDER,
    MAX_LOG_LINES,
};
pub use processes::{is_idle_process, rank_processes, IDLE_PROCESS_NAME, TOP_PROCESS_COUNT};
pub use system::{SysinfoProbe, SystemSampler, DEFAULT_CPU_WINDOW};

use crate::error::CollectionError;
use crate::models::{ProcessUsage, Snapshot};
use std::sync::Arc;

pub use async_trait::async_trait;

/// Produces point-in-time snapshots of host resource usage
#[async_trait]
pub trait MetricSampler: Send {
    /// Take one snapshot. Blocks for the CPU measurement window and never fails.
    async fn sample(&mut self) -> Snapshot;

    /// Number of snapshot fields degraded to placeholders since the last call
    fn take_degraded_fields(&mut self) -> u64 {
        0
    }
}

/// Pair of cumulative I/O counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub read_or_sent: u64,
    pub write_or_received: u64,
}

/// Raw readings taken at the end of a measurement window
#[derive(Debug)]
pub struct RawReading {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk: Result<IoCounters, CollectionError>,
    pub network: Result<IoCounters, CollectionError>,
    pub processes: Vec<Result<ProcessUsage, CollectionError>>,
}

/// OS-facing half of the sampler
pub trait HostProbe: Send {
    /// Start a CPU measurement window
    fn prime(&mut self);

    /// Read every counter; called once the window has elapsed
    fn read(&mut self) -> RawReading;
}

/// Capability for fetching recent error/critical system log lines
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Short name of the backing OS facility
    fn name(&self) -> &str;

    /// Most recent error-level lines, newest first where the OS supports it
    async fn recent_error_logs(&self) -> Result<Vec<String>, CollectionError>;
}

/// Create the sampler for the current OS
pub fn create_sampler() -> SystemSampler<SysinfoProbe> {
    let logs: Arc<dyn LogSource> = detect_log_source();
    tracing::info!(log_source = logs.name(), "Selected system log source");
    SystemSampler::new(SysinfoProbe::new(), logs)
}
