//! Production sampler backed by `sysinfo`

use super::{
    async_trait, diskstats, rank_processes, HostProbe, IoCounters, LogSource, MetricSampler,
    MonotonicCounter, RawReading, LOG_FAILURE_PLACEHOLDER, MAX_LOG_LINES, TOP_PROCESS_COUNT,
};
use crate::error::CollectionError;
use crate::models::{ProcessUsage, Snapshot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Networks, System};
use tracing::{debug, warn};

/// Default CPU measurement window
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_secs(1);

/// Default location of the kernel disk statistics
const DISKSTATS_PATH: &str = "/proc/diskstats";

/// Reads host counters and the process table through `sysinfo`
pub struct SysinfoProbe {
    system: System,
    networks: Networks,
    diskstats_path: Option<PathBuf>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let diskstats_path =
            cfg!(target_os = "linux").then(|| PathBuf::from(DISKSTATS_PATH));

        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
            diskstats_path,
        }
    }

    fn disk_counters(&self) -> Result<IoCounters, CollectionError> {
        match &self.diskstats_path {
            Some(path) => diskstats::read_diskstats(path),
            None => {
                // No host-wide counters: approximate with per-process totals
                let mut counters = IoCounters::default();
                for process in self.system.processes().values() {
                    let usage = process.disk_usage();
                    counters.read_or_sent = counters.read_or_sent.saturating_add(usage.total_read_bytes);
                    counters.write_or_received = counters
                        .write_or_received
                        .saturating_add(usage.total_written_bytes);
                }
                Ok(counters)
            }
        }
    }

    fn network_counters(&self) -> IoCounters {
        let mut counters = IoCounters::default();
        for (_name, data) in self.networks.iter() {
            counters.read_or_sent = counters.read_or_sent.saturating_add(data.total_transmitted());
            counters.write_or_received = counters
                .write_or_received
                .saturating_add(data.total_received());
        }
        counters
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    fn prime(&mut self) {
        self.system.refresh_cpu();
        self.system.refresh_processes();
    }

    fn read(&mut self) -> RawReading {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.system.refresh_processes();
        self.networks.refresh();

        let total_memory = self.system.total_memory() as f64;
        let memory_usage = if total_memory > 0.0 {
            let used = total_memory - self.system.available_memory() as f64;
            used / total_memory * 100.0
        } else {
            0.0
        };

        let processes = self
            .system
            .processes()
            .values()
            .map(|process| {
                let memory_percent = if total_memory > 0.0 {
                    process.memory() as f64 / total_memory * 100.0
                } else {
                    0.0
                };
                Ok(ProcessUsage {
                    pid: process.pid().as_u32(),
                    name: process.name().to_string(),
                    cpu_percent: round1(process.cpu_usage() as f64),
                    memory_percent: round1(memory_percent),
                })
            })
            .collect();

        RawReading {
            cpu_usage: round1(self.system.global_cpu_info().cpu_usage() as f64),
            memory_usage: round1(memory_usage),
            disk: self.disk_counters(),
            network: Ok(self.network_counters()),
            processes,
        }
    }
}

/// Sampler combining a host probe with a system log source
pub struct SystemSampler<P> {
    probe: P,
    logs: Arc<dyn LogSource>,
    cpu_window: Duration,
    disk_read: MonotonicCounter,
    disk_write: MonotonicCounter,
    net_sent: MonotonicCounter,
    net_received: MonotonicCounter,
    degraded_fields: u64,
}

impl<P: HostProbe> SystemSampler<P> {
    pub fn new(probe: P, logs: Arc<dyn LogSource>) -> Self {
        Self {
            probe,
            logs,
            cpu_window: DEFAULT_CPU_WINDOW.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
            disk_read: MonotonicCounter::new(),
            disk_write: MonotonicCounter::new(),
            net_sent: MonotonicCounter::new(),
            net_received: MonotonicCounter::new(),
            degraded_fields: 0,
        }
    }

    /// Override the CPU measurement window
    pub fn with_cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window;
        self
    }

    fn apply_disk(&mut self, disk: Result<IoCounters, CollectionError>) -> (u64, u64) {
        match disk {
            Ok(c) => (
                self.disk_read.observe(c.read_or_sent),
                self.disk_write.observe(c.write_or_received),
            ),
            Err(e) => {
                self.degraded_fields += 1;
                debug!(error = %e, "Disk counters unavailable, reusing last values");
                (self.disk_read.current(), self.disk_write.current())
            }
        }
    }

    fn apply_network(&mut self, network: Result<IoCounters, CollectionError>) -> (u64, u64) {
        match network {
            Ok(c) => (
                self.net_sent.observe(c.read_or_sent),
                self.net_received.observe(c.write_or_received),
            ),
            Err(e) => {
                self.degraded_fields += 1;
                debug!(error = %e, "Network counters unavailable, reusing last values");
                (self.net_sent.current(), self.net_received.current())
            }
        }
    }
}

#[async_trait]
impl<P: HostProbe> MetricSampler for SystemSampler<P> {
    async fn sample(&mut self) -> Snapshot {
        let logs = Arc::clone(&self.logs);

        self.probe.prime();
        // The log query runs inside the CPU window
        let (log_result, ()) = tokio::join!(
            logs.recent_error_logs(),
            tokio::time::sleep(self.cpu_window)
        );
        let reading = self.probe.read();
        let timestamp = chrono::Local::now();

        let (recent_logs, log_count) = match log_result {
            Ok(mut lines) => {
                lines.truncate(MAX_LOG_LINES);
                let count = lines.len() as u64;
                (lines, count)
            }
            Err(e) => {
                self.degraded_fields += 1;
                warn!(source = logs.name(), error = %e, "System log query failed");
                (vec![LOG_FAILURE_PLACEHOLDER.to_string()], 0)
            }
        };

        let (disk_io_read, disk_io_write) = self.apply_disk(reading.disk);
        let (network_io_sent, network_io_received) = self.apply_network(reading.network);

        let readable: Vec<ProcessUsage> = reading
            .processes
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(p) => Some(p),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable process");
                    None
                }
            })
            .collect();

        let top_processes = rank_processes(
            readable.iter().cloned().map(Ok),
            |p| p.cpu_percent,
            TOP_PROCESS_COUNT,
        );
        let top_memory_processes = rank_processes(
            readable.into_iter().map(Ok),
            |p| p.memory_percent,
            TOP_PROCESS_COUNT,
        );

        Snapshot {
            timestamp,
            cpu_usage: reading.cpu_usage,
            memory_usage: reading.memory_usage,
            disk_io_read,
            disk_io_write,
            network_io_sent,
            network_io_received,
            log_count,
            top_processes,
            top_memory_processes,
            recent_logs,
        }
    }

    fn take_degraded_fields(&mut self) -> u64 {
        std::mem::take(&mut self.degraded_fields)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
