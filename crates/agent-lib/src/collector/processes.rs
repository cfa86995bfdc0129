//! Process ranking for snapshot context

use crate::error::CollectionError;
use crate::models::ProcessUsage;
use std::cmp::Ordering;
use tracing::trace;

/// Number of processes kept per ranking
pub const TOP_PROCESS_COUNT: usize = 3;

/// Pseudo-process that reports idle CPU time on Windows
pub const IDLE_PROCESS_NAME: &str = "system idle process";

/// True for the idle pseudo-process, in any letter case
pub fn is_idle_process(name: &str) -> bool {
    name.eq_ignore_ascii_case(IDLE_PROCESS_NAME)
}

/// Rank processes descending by `key`, keeping at most `limit`
///
/// Entries that failed to read (process exited, access denied) are dropped.
/// Ties keep enumeration order.
pub fn rank_processes<I, F>(entries: I, key: F, limit: usize) -> Vec<ProcessUsage>
where
    I: IntoIterator<Item = Result<ProcessUsage, CollectionError>>,
    F: Fn(&ProcessUsage) -> f64,
{
    let mut processes: Vec<ProcessUsage> = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(process) => Some(process),
            Err(e) => {
                trace!(error = %e, "Skipping unreadable process");
                None
            }
        })
        .collect();

    processes.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    processes.truncate(limit);
    processes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: u32, name: &str, cpu: f64, mem: f64) -> ProcessUsage {
        ProcessUsage {
            pid,
            name: name.to_string(),
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    #[test]
    fn test_rank_by_cpu_descending() {
        let entries = vec![
            Ok(proc(1, "a", 5.0, 1.0)),
            Ok(proc(2, "b", 50.0, 2.0)),
            Ok(proc(3, "c", 20.0, 30.0)),
            Ok(proc(4, "d", 1.0, 40.0)),
        ];
        let top = rank_processes(entries, |p| p.cpu_percent, TOP_PROCESS_COUNT);
        let names: Vec<_> = top.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_rank_by_memory() {
        let entries = vec![
            Ok(proc(1, "a", 5.0, 1.0)),
            Ok(proc(3, "c", 20.0, 30.0)),
            Ok(proc(4, "d", 1.0, 40.0)),
        ];
        let top = rank_processes(entries, |p| p.memory_percent, 2);
        assert_eq!(top[0].name, "d");
        assert_eq!(top[1].name, "c");
    }

    #[test]
    fn test_rank_skips_failed_entries() {
        let entries = vec![
            Ok(proc(1, "a", 5.0, 1.0)),
            Err(CollectionError::NoSuchProcess(2)),
            Ok(proc(3, "c", 20.0, 30.0)),
            Err(CollectionError::AccessDenied(4)),
            Ok(proc(5, "e", 10.0, 3.0)),
            Ok(proc(6, "f", 0.5, 3.0)),
        ];
        let top = rank_processes(entries, |p| p.cpu_percent, TOP_PROCESS_COUNT);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].name, "c");
        assert_eq!(top[2].name, "a");
    }

    #[test]
    fn test_rank_fewer_than_limit() {
        let top = rank_processes(vec![Ok(proc(1, "only", 1.0, 1.0))], |p| p.cpu_percent, 3);
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_idle_process_case_insensitive() {
        assert!(is_idle_process("System Idle Process"));
        assert!(is_idle_process("SYSTEM IDLE PROCESS"));
        assert!(!is_idle_process("systemd"));
    }
}
