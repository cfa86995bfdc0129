//! Alert sinks: durable log file, console, in-memory

use super::{AlertLevel, AlertRecord};
use crate::error::EmissionError;
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Destination for alert records and operator notes
///
/// A sink either writes a complete entry or returns an error; callers never
/// see a half-written record.
pub trait AlertSink: Send {
    fn name(&self) -> &str;

    /// Write one anomaly record
    fn emit(&mut self, record: &AlertRecord) -> Result<(), EmissionError>;

    /// Write a free-form line such as start/stop notices
    fn note(&mut self, level: AlertLevel, message: &str) -> Result<(), EmissionError>;
}

/// Format a log entry as `YYYY-MM-DD HH:MM:SS,mmm - LEVEL - message`
pub fn format_log_line(timestamp: &DateTime<Local>, level: AlertLevel, message: &str) -> String {
    format!(
        "{} - {} - {}",
        timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
        level,
        message
    )
}

/// Append-only alert log file
pub struct FileAlertSink {
    path: PathBuf,
    file: File,
}

impl FileAlertSink {
    /// Open `path` for appending, creating it if missing
    pub fn open(path: &Path) -> Result<Self, EmissionError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_entry(
        &mut self,
        timestamp: &DateTime<Local>,
        level: AlertLevel,
        message: &str,
    ) -> Result<(), EmissionError> {
        // One write call per entry keeps blocks contiguous in the file
        let mut entry = format_log_line(timestamp, level, message);
        entry.push('\n');
        self.file.write_all(entry.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

impl AlertSink for FileAlertSink {
    fn name(&self) -> &str {
        "alert_log"
    }

    fn emit(&mut self, record: &AlertRecord) -> Result<(), EmissionError> {
        self.write_entry(&record.timestamp, AlertLevel::Warning, &record.render_block())
    }

    fn note(&mut self, level: AlertLevel, message: &str) -> Result<(), EmissionError> {
        self.write_entry(&Local::now(), level, message)
    }
}

/// Colored operator display on stdout
pub struct ConsoleSink {
    out: Box<dyn Write + Send>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        let stdout = std::io::stdout();
        if !stdout.is_terminal() {
            colored::control::set_override(false);
        }
        Self {
            out: Box::new(stdout),
        }
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }
}

impl AlertSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn emit(&mut self, record: &AlertRecord) -> Result<(), EmissionError> {
        writeln!(self.out, "{}", record.render_console())?;
        self.out.flush()?;
        Ok(())
    }

    fn note(&mut self, level: AlertLevel, message: &str) -> Result<(), EmissionError> {
        writeln!(self.out, "{}", format_log_line(&Local::now(), level, message))?;
        Ok(())
    }
}

/// Sink that keeps rendered entries in memory
///
/// Clones share the same buffer, so a test can keep one handle and give the
/// other to the loop.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry written so far
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn push(&self, entry: String) -> Result<(), EmissionError> {
        self.entries
            .lock()
            .map_err(|_| EmissionError::Closed)?
            .push(entry);
        Ok(())
    }
}

impl AlertSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn emit(&mut self, record: &AlertRecord) -> Result<(), EmissionError> {
        self.push(format!("{} - {}", AlertLevel::Warning, record.render_block()))
    }

    fn note(&mut self, level: AlertLevel, message: &str) -> Result<(), EmissionError> {
        self.push(format!("{} - {}", level, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_log_line_format() {
        let ts = Local
            .with_ymd_and_hms(2024, 3, 1, 9, 5, 7)
            .single()
            .unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(
            format_log_line(&ts, AlertLevel::Info, "Model loaded"),
            "2024-03-01 09:05:07,042 - INFO - Model loaded"
        );
    }

    #[test]
    fn test_file_sink_appends_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.log");

        let mut sink = FileAlertSink::open(&path).unwrap();
        sink.note(AlertLevel::Info, "Starting monitoring").unwrap();
        sink.emit(&AlertRecord::from_snapshot(fixtures::snapshot())).unwrap();
        drop(sink);

        // Reopening appends instead of truncating
        let mut sink = FileAlertSink::open(&path).unwrap();
        sink.note(AlertLevel::Info, "Monitoring stopped by operator").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with(" - INFO - Starting monitoring"));
        // The header carries the snapshot's time, not the write time
        assert_eq!(lines[1], "2024-03-01 12:30:45,000 - WARNING - ANOMALY:");
        assert_eq!(lines[2], "CPU: 95.0%");
        assert!(lines.contains(&"Top Processes:"));
        assert!(lines.last().unwrap().ends_with("Monitoring stopped by operator"));
    }

    #[test]
    fn test_file_sink_open_fails_for_missing_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("alerts.log");
        assert!(matches!(FileAlertSink::open(&path), Err(EmissionError::Io(_))));
    }

    #[test]
    fn test_console_sink_writes_rendering() {
        colored::control::set_override(false);
        let buffer = SharedBuffer::default();
        let mut sink = ConsoleSink::with_writer(Box::new(buffer.clone()));
        sink.emit(&AlertRecord::from_snapshot(fixtures::snapshot())).unwrap();

        let text = buffer.contents();
        assert!(text.contains("🚨 ANOMALY"));
        assert!(text.contains("[RECENT LOGS]"));
    }

    #[test]
    fn test_memory_sink_clones_share_entries() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        handle.note(AlertLevel::Info, "hello").unwrap();
        assert_eq!(sink.entries(), vec!["INFO - hello"]);
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
