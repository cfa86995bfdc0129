//! Host-wide disk I/O counters
//!
//! Reads `/proc/diskstats` and sums sectors read/written over whole devices.
//! Partitions are skipped when their parent device was already listed so
//! the same I/O is not counted twice.

use super::IoCounters;
use crate::error::CollectionError;
use std::path::Path;

/// Bytes per sector as reported by `/proc/diskstats`
pub const SECTOR_SIZE: u64 = 512;

/// Device name prefixes that never back real storage
const VIRTUAL_PREFIXES: &[&str] = &["loop", "ram", "zram", "fd"];

/// Read and parse a diskstats file
pub fn read_diskstats(path: &Path) -> Result<IoCounters, CollectionError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_diskstats(&content))
}

/// Parse diskstats content into cumulative (read, written) byte counts
pub fn parse_diskstats(content: &str) -> IoCounters {
    let mut counters = IoCounters::default();
    let mut devices: Vec<&str> = Vec::new();

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // major minor name reads merged sectors_read ms writes merged sectors_written ...
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];

        if VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        if devices.iter().any(|dev| is_partition_of(name, dev)) {
            continue;
        }

        let sectors_read = fields[5].parse::<u64>().unwrap_or(0);
        let sectors_written = fields[9].parse::<u64>().unwrap_or(0);

        counters.read_or_sent = counters
            .read_or_sent
            .saturating_add(sectors_read.saturating_mul(SECTOR_SIZE));
        counters.write_or_received = counters
            .write_or_received
            .saturating_add(sectors_written.saturating_mul(SECTOR_SIZE));
        devices.push(name);
    }

    counters
}

/// `sda1` of `sda`, `nvme0n1p2` of `nvme0n1`, `mmcblk0p1` of `mmcblk0`
fn is_partition_of(name: &str, device: &str) -> bool {
    match name.strip_prefix(device) {
        Some(rest) if !rest.is_empty() => {
            let digits = rest.strip_prefix('p').unwrap_or(rest);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

/// Keeps a reported counter non-decreasing across raw counter resets
///
/// The first observation is reported as-is; later observations add only the
/// positive delta from the previous raw value.
#[derive(Debug, Clone, Default)]
pub struct MonotonicCounter {
    last_raw: Option<u64>,
    total: u64,
}

impl MonotonicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a raw reading and return the monotonic value
    pub fn observe(&mut self, raw: u64) -> u64 {
        self.total = match self.last_raw {
            None => raw,
            Some(prev) => self.total.saturating_add(raw.saturating_sub(prev)),
        };
        self.last_raw = Some(raw);
        self.total
    }

    /// Last reported value, used when a reading is unavailable
    pub fn current(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   8       0 sda 1000 0 2000 0 500 0 4000 0 0 0 0
   8       1 sda1 900 0 1800 0 400 0 3600 0 0 0 0
   7       0 loop0 50 0 100 0 0 0 0 0 0 0 0
 259       0 nvme0n1 10 0 20 0 30 0 40 0 0 0 0
 259       1 nvme0n1p1 10 0 20 0 30 0 40 0 0 0 0
";

    #[test]
    fn test_parse_diskstats_sums_whole_devices() {
        let counters = parse_diskstats(SAMPLE);
        assert_eq!(counters.read_or_sent, (2000 + 20) * SECTOR_SIZE);
        assert_eq!(counters.write_or_received, (4000 + 40) * SECTOR_SIZE);
    }

    #[test]
    fn test_parse_diskstats_ignores_short_lines() {
        let counters = parse_diskstats("garbage\n8 0 sda 1\n");
        assert_eq!(counters, IoCounters::default());
    }

    #[test]
    fn test_partition_detection() {
        assert!(is_partition_of("sda1", "sda"));
        assert!(is_partition_of("nvme0n1p2", "nvme0n1"));
        assert!(!is_partition_of("sdb", "sda"));
        assert!(!is_partition_of("sda", "sda"));
        assert!(!is_partition_of("sdaa", "sda"));
    }

    #[test]
    fn test_monotonic_counter_absorbs_reset() {
        let mut counter = MonotonicCounter::new();
        assert_eq!(counter.observe(100), 100);
        assert_eq!(counter.observe(150), 150);
        // Raw counter went backwards (device removed, wrap): hold, then rebase
        assert_eq!(counter.observe(20), 150);
        assert_eq!(counter.observe(30), 160);
        assert_eq!(counter.current(), 160);
    }

    #[test]
    fn test_read_diskstats_missing_file() {
        let result = read_diskstats(Path::new("/nonexistent/diskstats"));
        assert!(matches!(result, Err(CollectionError::Io(_))));
    }
}
