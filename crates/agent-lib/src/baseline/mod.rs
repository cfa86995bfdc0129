//! Learned model of normal host behavior
//!
//! A [`BaselineModel`] pairs a [`StandardScaler`] with an
//! [`IsolationForest`]. Both are fitted offline by [`fit`] and persisted as
//! two JSON artifacts; the detector loads them once at startup and only
//! scores afterwards.

mod forest;
mod model;
mod scaler;
mod trainer;

pub use forest::{average_path_length, ForestParams, IsolationForest, Node, Row};
pub use model::{
    artifact_paths, BaselineModel, Scorer, FOREST_FILE, SCALER_FILE, SCHEMA_VERSION,
};
pub use scaler::StandardScaler;
pub use trainer::{fit, fit_with, read_corpus, read_corpus_file, CorpusWriter};
