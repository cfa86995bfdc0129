//! Alert records and their renderings
//!
//! An [`AlertRecord`] is built once per anomalous verdict and handed to every
//! configured [`AlertSink`]. The plain block written to the alert log is the
//! format [`analyzer`] parses back; the console rendering is for operators.

pub mod analyzer;
mod sink;

pub use sink::{format_log_line, AlertSink, ConsoleSink, FileAlertSink, MemorySink};

use crate::collector::is_idle_process;
use crate::models::{ProcessUsage, Snapshot};
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::{Deserialize, Serialize};

/// Marker opening an anomaly block in the alert log
pub const ANOMALY_MARKER: &str = "ANOMALY:";

/// Marker opening the process section of an anomaly block
pub const TOP_PROCESSES_MARKER: &str = "Top Processes:";

/// Line used when every ranked process was filtered out
pub const NO_PROCESSES_LINE: &str = "  No relevant processes.";

/// Width of the console separator rule
const SEPARATOR_WIDTH: usize = 40;

/// Severity of a sink entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "INFO"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Immutable record of one anomalous sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Local>,
    /// Raw, unnormalized snapshot that triggered the alert
    pub snapshot: Snapshot,
}

impl AlertRecord {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            snapshot,
        }
    }

    /// Multi-line message for the alert log, starting with [`ANOMALY_MARKER`]
    pub fn render_block(&self) -> String {
        let s = &self.snapshot;
        format!(
            "{}\nCPU: {:.1}%\nRAM: {:.1}%\nDisk IO Read: {}\nDisk IO Write: {}\nNetwork IO Sent: {}\nNetwork IO Received: {}\nLog Count: {}\n{}\n{}",
            ANOMALY_MARKER,
            s.cpu_usage,
            s.memory_usage,
            s.disk_io_read,
            s.disk_io_write,
            s.network_io_sent,
            s.network_io_received,
            s.log_count,
            TOP_PROCESSES_MARKER,
            format_processes(&s.top_processes),
        )
    }

    /// Colored summary line plus detail section for a terminal
    pub fn render_console(&self) -> String {
        let s = &self.snapshot;
        let mut out = format!(
            "{} - {} - CPU: {:.1}% | RAM: {:.1}% | Disk Read: {} | Disk Write: {} | Net Sent: {} | Net Received: {} | LOGS: {}\n",
            self.timestamp.format("%H:%M:%S"),
            "🚨 ANOMALY".red(),
            s.cpu_usage,
            s.memory_usage,
            s.disk_io_read,
            s.disk_io_write,
            s.network_io_sent,
            s.network_io_received,
            s.log_count,
        );
        out.push_str(&format!("{}\n", "▼ SYSTEM DETAILS ▼".yellow()));
        out.push_str(&format!("{}\n", "[TOP PROCESSES]".yellow()));
        out.push_str(&format_processes(&s.top_processes));
        out.push('\n');
        out.push_str(&format!("{}\n", "[RECENT LOGS]".yellow()));
        for line in &s.recent_logs {
            out.push_str(&format!("  - {}\n", line));
        }
        out.push_str(&"-".repeat(SEPARATOR_WIDTH));
        out
    }
}

/// Render ranked processes as `  rank. name (cpu% CPU, mem% RAM)` lines
///
/// Idle-process entries are skipped but keep consuming their rank, so the
/// numbering reflects the position in the original ranking.
pub fn format_processes(processes: &[ProcessUsage]) -> String {
    let lines: Vec<String> = processes
        .iter()
        .enumerate()
        .filter(|(_, p)| !is_idle_process(&p.name))
        .map(|(i, p)| {
            format!(
                "  {}. {} ({:.1}% CPU, {:.1}% RAM)",
                i + 1,
                p.name,
                p.cpu_percent,
                p.memory_percent
            )
        })
        .collect();

    if lines.is_empty() {
        NO_PROCESSES_LINE.to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    #[test]
    fn test_block_contains_metrics_and_processes() {
        let block = AlertRecord::from_snapshot(fixtures::snapshot()).render_block();
        let lines: Vec<&str> = block.lines().collect();

        assert_eq!(lines[0], "ANOMALY:");
        assert!(lines.contains(&"CPU: 95.0%"));
        assert!(lines.contains(&"RAM: 88.0%"));
        assert!(lines.contains(&"Disk IO Read: 120"));
        assert!(lines.contains(&"Network IO Received: 7000"));
        assert!(lines.contains(&"Log Count: 2"));
        assert!(lines.contains(&"Top Processes:"));
    }

    #[test]
    fn test_format_processes_skips_idle_keeps_rank() {
        let text = format_processes(&fixtures::snapshot().top_processes);
        assert_eq!(
            text,
            "  2. cargo (85.5% CPU, 12.3% RAM)\n  3. postgres (9.0% CPU, 30.1% RAM)"
        );
    }

    #[test]
    fn test_format_processes_empty() {
        assert_eq!(format_processes(&[]), NO_PROCESSES_LINE);

        let only_idle = vec![ProcessUsage {
            pid: 0,
            name: "SYSTEM IDLE PROCESS".to_string(),
            cpu_percent: 99.0,
            memory_percent: 0.0,
        }];
        assert_eq!(format_processes(&only_idle), NO_PROCESSES_LINE);
    }

    #[test]
    fn test_console_rendering_sections() {
        colored::control::set_override(false);
        let text = AlertRecord::from_snapshot(fixtures::snapshot()).render_console();

        assert!(text.starts_with("12:30:45 - 🚨 ANOMALY - CPU: 95.0% | RAM: 88.0%"));
        assert!(text.contains("| LOGS: 2"));
        assert!(text.contains("▼ SYSTEM DETAILS ▼"));
        assert!(text.contains("[TOP PROCESSES]"));
        assert!(text.contains("  - kernel: Out of memory: Killed process 991"));
        assert!(text.ends_with(&"-".repeat(40)));
    }

    #[test]
    fn test_level_display() {
        assert_eq!(AlertLevel::Warning.to_string(), "WARNING");
        assert_eq!(AlertLevel::Info.to_string(), "INFO");
    }
}
