//! Error taxonomy for the detector
//!
//! `ModelLoadError` and `InsufficientDataError` are fatal to the process that
//! raises them. `CollectionError` and `EmissionError` are always recovered
//! locally by the sampler and the detection loop respectively.

use std::path::PathBuf;
use thiserror::Error;

/// Baseline artifact could not be loaded
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read model artifact {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model artifact schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("model artifact is invalid: {0}")]
    Invalid(String),
}

/// Training corpus cannot support a fit
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InsufficientDataError {
    #[error("training corpus is empty")]
    EmptyCorpus,

    #[error("training corpus is missing feature columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Offline training failure
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),

    #[error("contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),

    #[error("training corpus row {row} has a non-finite {column}")]
    NonFiniteValue { row: usize, column: &'static str },

    #[error("fitted model failed validation: {0}")]
    InvalidModel(String),

    #[error("failed to parse training corpus: {0}")]
    Corpus(#[from] csv::Error),

    #[error("failed to serialize model artifact: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Partial failure while assembling a snapshot
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("process {0} no longer exists")]
    NoSuchProcess(u32),

    #[error("access denied to process {0}")]
    AccessDenied(u32),

    #[error("log query failed: {0}")]
    LogQuery(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alert could not be written to a sink
#[derive(Debug, Error)]
pub enum EmissionError {
    #[error("alert sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("alert sink is closed")]
    Closed,
}
