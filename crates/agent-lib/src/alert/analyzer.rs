//! Parse an alert log back into entries and summarize anomaly blocks

use super::{ANOMALY_MARKER, NO_PROCESSES_LINE, TOP_PROCESSES_MARKER};
use serde::Serialize;
use std::collections::HashMap;
use std::io::BufRead;

/// Length of the `YYYY-MM-DD HH:MM:SS,mmm` prefix
const TIMESTAMP_LEN: usize = 23;

/// Number of process names reported by [`analyze`]
pub const TOP_PROCESS_REPORT: usize = 5;

/// One header line of the log plus any detail lines that followed it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub detail_lines: Vec<String>,
}

impl LogEntry {
    pub fn is_anomaly(&self) -> bool {
        self.message.contains(ANOMALY_MARKER)
    }
}

/// Metrics extracted from an anomaly block
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnomalyDetails {
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub log_count: Option<u64>,
    pub processes: Vec<String>,
}

/// Aggregate view over a whole alert log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub total_entries: usize,
    pub anomaly_count: usize,
    /// Percent of entries that are anomaly blocks
    pub anomaly_rate: f64,
    pub cpu_mean: Option<f64>,
    pub cpu_max: Option<f64>,
    pub ram_mean: Option<f64>,
    pub ram_max: Option<f64>,
    /// Most frequent process names across anomaly blocks, with counts
    pub top_processes: Vec<(String, usize)>,
}

/// Split a `timestamp - LEVEL - message` header line
fn parse_header(line: &str) -> Option<(String, String, String)> {
    let timestamp = line.get(..TIMESTAMP_LEN)?;
    chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S,%3f").ok()?;

    let rest = line[TIMESTAMP_LEN..].strip_prefix(" - ")?;
    let (level, message) = rest.split_once(" - ")?;
    if level.is_empty() || !level.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((timestamp.to_string(), level.to_string(), message.to_string()))
}

/// Parse a log into entries
///
/// While an anomaly block is open, every following line (header or not)
/// becomes one of its detail lines until the next anomaly header.
pub fn parse_alert_log<R: BufRead>(reader: R) -> std::io::Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    let mut current: Option<LogEntry> = None;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();

        match parse_header(line) {
            Some((timestamp, level, message)) => {
                let entry = LogEntry {
                    timestamp,
                    level,
                    message,
                    detail_lines: Vec::new(),
                };
                if entry.is_anomaly() {
                    entries.extend(current.take());
                    current = Some(entry);
                } else if let Some(open) = current.as_mut() {
                    open.detail_lines.push(line.to_string());
                } else {
                    entries.push(entry);
                }
            }
            None => {
                if let Some(open) = current.as_mut() {
                    open.detail_lines.push(line.to_string());
                }
            }
        }
    }
    entries.extend(current);
    Ok(entries)
}

/// Extract metrics from an anomaly block's detail lines
pub fn extract_details(entry: &LogEntry) -> AnomalyDetails {
    let mut details = AnomalyDetails::default();

    for (idx, line) in entry.detail_lines.iter().enumerate() {
        if let Some(v) = line.strip_prefix("CPU:") {
            details.cpu_usage = v.trim().trim_end_matches('%').parse().ok();
        } else if let Some(v) = line.strip_prefix("RAM:") {
            details.memory_usage = v.trim().trim_end_matches('%').parse().ok();
        } else if let Some(v) = line.strip_prefix("Log Count:") {
            details.log_count = v.trim().parse().ok();
        } else if line.starts_with(TOP_PROCESSES_MARKER) {
            details.processes = entry.detail_lines[idx + 1..]
                .iter()
                .filter_map(|l| process_name(l))
                .collect();
            break;
        }
    }
    details
}

/// Name from a `  rank. name (cpu% CPU, mem% RAM)` line
fn process_name(line: &str) -> Option<String> {
    if line == NO_PROCESSES_LINE {
        return None;
    }
    let (rank, rest) = line.trim().split_once(". ")?;
    rank.parse::<usize>().ok()?;
    let name = match rest.rfind(" (") {
        Some(pos) => &rest[..pos],
        None => rest,
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Summarize parsed entries
pub fn analyze(entries: &[LogEntry]) -> AnalysisReport {
    let anomalies: Vec<AnomalyDetails> = entries
        .iter()
        .filter(|e| e.is_anomaly())
        .map(extract_details)
        .collect();

    let cpu: Vec<f64> = anomalies.iter().filter_map(|a| a.cpu_usage).collect();
    let ram: Vec<f64> = anomalies.iter().filter_map(|a| a.memory_usage).collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in anomalies.iter().flat_map(|a| a.processes.iter()) {
        *counts.entry(name.as_str()).or_default() += 1;
    }
    let mut top_processes: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    top_processes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_processes.truncate(TOP_PROCESS_REPORT);

    let total_entries = entries.len();
    let anomaly_count = anomalies.len();
    AnalysisReport {
        total_entries,
        anomaly_count,
        anomaly_rate: if total_entries > 0 {
            anomaly_count as f64 / total_entries as f64 * 100.0
        } else {
            0.0
        },
        cpu_mean: mean(&cpu),
        cpu_max: max(&cpu),
        ram_mean: mean(&ram),
        ram_max: max(&ram),
        top_processes,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}
