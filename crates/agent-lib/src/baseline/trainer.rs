//! Offline fitting and training corpus I/O

use super::forest::{ForestParams, IsolationForest};
use super::model::BaselineModel;
use super::scaler::StandardScaler;
use crate::error::{InsufficientDataError, TrainError};
use crate::models::{FeatureVector, Snapshot, FEATURE_NAMES};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Fit a baseline with default forest parameters and the given contamination
pub fn fit(corpus: &[FeatureVector], contamination: f64) -> Result<BaselineModel, TrainError> {
    fit_with(
        corpus,
        &ForestParams {
            contamination,
            ..Default::default()
        },
    )
}

/// Fit a baseline with explicit forest parameters
pub fn fit_with(corpus: &[FeatureVector], params: &ForestParams) -> Result<BaselineModel, TrainError> {
    if !(params.contamination > 0.0 && params.contamination <= 0.5) {
        return Err(TrainError::InvalidContamination(params.contamination));
    }

    check_finite(corpus)?;

    let scaler = StandardScaler::fit(corpus).ok_or(InsufficientDataError::EmptyCorpus)?;
    let rows: Vec<_> = corpus.iter().map(|fv| scaler.transform(fv)).collect();
    let forest =
        IsolationForest::fit(&rows, params.clone()).ok_or(InsufficientDataError::EmptyCorpus)?;

    // Same checks `BaselineModel::load` applies, so a saved fit always loads
    scaler.validate().map_err(TrainError::InvalidModel)?;
    forest.validate().map_err(TrainError::InvalidModel)?;

    info!(
        rows = corpus.len(),
        trees = forest.tree_count(),
        sample_size = forest.sample_size,
        contamination = params.contamination,
        offset = forest.offset,
        "Fitted baseline model"
    );

    Ok(BaselineModel::new(scaler, forest))
}

/// Read feature rows from a corpus CSV
///
/// Every feature column must be present; other columns are ignored.
pub fn read_corpus<R: Read>(reader: R) -> Result<Vec<FeatureVector>, TrainError> {
    let mut csv = csv::Reader::from_reader(reader);

    let headers = csv.headers()?.clone();
    let missing: Vec<String> = FEATURE_NAMES
        .iter()
        .filter(|name| !headers.iter().any(|h| h.trim() == **name))
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(InsufficientDataError::MissingColumns(missing).into());
    }

    let rows = csv
        .deserialize::<FeatureVector>()
        .collect::<Result<Vec<_>, _>>()?;
    if rows.is_empty() {
        return Err(InsufficientDataError::EmptyCorpus.into());
    }
    check_finite(&rows)?;
    Ok(rows)
}

/// First non-finite feature value, reported by 1-based data row
fn check_finite(corpus: &[FeatureVector]) -> Result<(), TrainError> {
    for (i, fv) in corpus.iter().enumerate() {
        if let Some(f) = fv.to_array().iter().position(|v| !v.is_finite()) {
            return Err(TrainError::NonFiniteValue {
                row: i + 1,
                column: FEATURE_NAMES[f],
            });
        }
    }
    Ok(())
}

/// Read a corpus CSV from disk
pub fn read_corpus_file(path: &Path) -> Result<Vec<FeatureVector>, TrainError> {
    read_corpus(File::open(path)?)
}

/// Appends snapshots to a corpus CSV
pub struct CorpusWriter<W: Write> {
    inner: csv::Writer<W>,
    rows: usize,
}

impl CorpusWriter<File> {
    pub fn create(path: &Path) -> Result<Self, TrainError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> CorpusWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: csv::Writer::from_writer(writer),
            rows: 0,
        }
    }

    pub fn append(&mut self, snapshot: &Snapshot) -> Result<(), TrainError> {
        let log_samples = serde_json::json!({
            "system_logs": snapshot.recent_logs,
            "top_processes": {
                "cpu": snapshot.top_processes,
                "memory": snapshot.top_memory_processes,
            },
        });
        if self.rows == 0 {
            let mut header = vec!["timestamp"];
            header.extend(FEATURE_NAMES);
            header.push("log_samples");
            self.inner.write_record(&header)?;
        }
        let mut record = vec![snapshot.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()];
        record.extend(snapshot.to_feature_vector().to_array().iter().map(format_value));
        record.push(log_samples.to_string());
        self.inner.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<(), TrainError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, TrainError> {
        self.inner
            .into_inner()
            .map_err(|e| TrainError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}

fn format_value(value: &f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", *value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    const CORPUS: &str = "\
timestamp,cpu_usage,memory_usage,disk_io_read,disk_io_write,network_io_sent,network_io_received,log_count,log_samples
2024-03-01 10:00:00,10.5,40.1,1000,500,2000,3000,0,{}
2024-03-01 10:00:01,11.0,40.3,1100,520,2100,3050,1,{}
2024-03-01 10:00:02,9.8,40.2,1150,530,2200,3100,0,{}
";

    #[test]
    fn test_read_corpus_ignores_extra_columns() {
        let rows = read_corpus(CORPUS.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].cpu_usage, 11.0);
        assert_eq!(rows[2].network_io_received, 3100.0);
    }

    #[test]
    fn test_read_corpus_reports_all_missing_columns() {
        let csv = "timestamp,cpu_usage,memory_usage,disk_io_read,disk_io_write,network_io_sent\n1,2,3,4,5,6\n";
        let err = read_corpus(csv.as_bytes()).unwrap_err();
        match err {
            TrainError::InsufficientData(InsufficientDataError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["network_io_received", "log_count"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_read_corpus_header_only_is_empty() {
        let header = CORPUS.lines().next().unwrap();
        let err = read_corpus(format!("{}\n", header).as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            TrainError::InsufficientData(InsufficientDataError::EmptyCorpus)
        ));
    }

    #[test]
    fn test_fit_empty_corpus_fails() {
        let err = fit(&[], 0.01).unwrap_err();
        assert!(matches!(
            err,
            TrainError::InsufficientData(InsufficientDataError::EmptyCorpus)
        ));
    }

    #[test]
    fn test_fit_rejects_contamination_out_of_range() {
        let rows = read_corpus(CORPUS.as_bytes()).unwrap();
        assert!(matches!(fit(&rows, 0.0), Err(TrainError::InvalidContamination(_))));
        assert!(matches!(fit(&rows, 0.6), Err(TrainError::InvalidContamination(_))));
        assert!(fit(&rows, 0.5).is_ok());
    }

    #[test]
    fn test_read_corpus_rejects_non_finite_values() {
        let csv = CORPUS.replacen("1100,520", "inf,520", 1);
        let err = read_corpus(csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            TrainError::NonFiniteValue {
                row: 2,
                column: "disk_io_read"
            }
        ));
    }

    #[test]
    fn test_fit_rejects_nan_and_never_saves_unloadable_model() {
        let mut rows = read_corpus(CORPUS.as_bytes()).unwrap();
        rows[0].log_count = f64::NAN;
        assert!(matches!(
            fit(&rows, 0.1),
            Err(TrainError::NonFiniteValue {
                row: 1,
                column: "log_count"
            })
        ));

        // A finite corpus round-trips through save and load
        let dir = tempfile::TempDir::new().unwrap();
        rows[0].log_count = 0.0;
        fit(&rows, 0.1).unwrap().save(dir.path()).unwrap();
        assert!(BaselineModel::load(dir.path()).is_ok());
    }

    #[test]
    fn test_fit_uses_seeded_params() {
        let rows = read_corpus(CORPUS.as_bytes()).unwrap();
        let a = fit(&rows, 0.1).unwrap();
        let b = fit(&rows, 0.1).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.forest.tree_count(), 100);
        assert_eq!(a.forest.sample_size, 3);
    }

    #[test]
    fn test_corpus_writer_output_reads_back() {
        let mut writer = CorpusWriter::new(Vec::new());
        let snapshot = fixtures::snapshot();
        writer.append(&snapshot).unwrap();
        writer.append(&snapshot).unwrap();
        assert_eq!(writer.rows(), 2);

        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("timestamp,cpu_usage,memory_usage"));
        assert!(text.contains("system_logs"));
        assert!(text.contains("2024-03-01 12:30:45"));

        let rows = read_corpus(bytes.as_slice()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], snapshot.to_feature_vector());
    }

    #[test]
    fn test_corpus_log_samples_json_shape() {
        let mut writer = CorpusWriter::new(Vec::new());
        writer.append(&fixtures::snapshot()).unwrap();
        let bytes = writer.into_inner().unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let record = reader.records().next().unwrap().unwrap();
        let samples: serde_json::Value = serde_json::from_str(&record[8]).unwrap();
        assert_eq!(samples["system_logs"].as_array().unwrap().len(), 2);
        assert_eq!(samples["top_processes"]["cpu"][1]["name"], "cargo");
        assert!(samples["top_processes"]["memory"].is_array());
    }
}
