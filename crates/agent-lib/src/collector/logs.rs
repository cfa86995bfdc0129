//! Recent system log retrieval
//!
//! One [`LogSource`] per OS facility: `journalctl` on Linux, `wevtutil` on
//! Windows. Other platforms get a static source. The sampler owns the
//! fallback to a placeholder line, sources only report errors.

use super::{async_trait, LogSource};
use crate::error::CollectionError;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Maximum number of log lines kept per snapshot
pub const MAX_LOG_LINES: usize = 5;

/// Line substituted when the log query fails
pub const LOG_FAILURE_PLACEHOLDER: &str = "Error: Log retrieval failed";

/// Upper bound on a single log query
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Log source backed by an external command
pub struct CommandLogSource {
    name: &'static str,
    program: &'static str,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandLogSource {
    /// `journalctl -p crit..err -n 5 --no-pager --utc`
    pub fn journalctl() -> Self {
        Self {
            name: "journalctl",
            program: "journalctl",
            args: vec![
                "-p".into(),
                "crit..err".into(),
                "-n".into(),
                MAX_LOG_LINES.to_string(),
                "--no-pager".into(),
                "--utc".into(),
            ],
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Critical and error events from the Windows System channel, newest first
    pub fn wevtutil() -> Self {
        Self {
            name: "wevtutil",
            program: "wevtutil",
            args: vec![
                "qe".into(),
                "System".into(),
                "/q:*[System[(Level=1 or Level=2)]]".into(),
                format!("/c:{}", MAX_LOG_LINES),
                "/rd:true".into(),
                "/f:text".into(),
            ],
            timeout: QUERY_TIMEOUT,
        }
    }

}

#[async_trait]
impl LogSource for CommandLogSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn recent_error_logs(&self) -> Result<Vec<String>, CollectionError> {
        // A hung query is killed when the timeout drops the future
        let mut command = Command::new(self.program);
        command.args(&self.args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| CollectionError::LogQuery(format!("{} timed out", self.program)))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollectionError::LogQuery(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_log_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Keep the first non-empty lines, dropping journalctl meta lines
fn parse_log_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with("-- "))
        .take(MAX_LOG_LINES)
        .map(String::from)
        .collect()
}

/// Fixed log lines; used on platforms without a supported facility and in tests
pub struct StaticLogSource {
    lines: Vec<String>,
    fail: bool,
}

impl StaticLogSource {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines, fail: false }
    }

    /// Source whose every query fails
    pub fn failing() -> Self {
        Self {
            lines: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl LogSource for StaticLogSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn recent_error_logs(&self) -> Result<Vec<String>, CollectionError> {
        if self.fail {
            return Err(CollectionError::LogQuery("static source failure".to_string()));
        }
        Ok(self.lines.iter().take(MAX_LOG_LINES).cloned().collect())
    }
}

/// Select the log source for the running OS
pub fn detect_log_source() -> Arc<dyn LogSource> {
    match std::env::consts::OS {
        "linux" => Arc::new(CommandLogSource::journalctl()),
        "windows" => Arc::new(CommandLogSource::wevtutil()),
        other => {
            tracing::warn!(os = other, "No system log facility for this OS");
            Arc::new(StaticLogSource::new(Vec::new()))
        }
    }
}
