//! Persisted baseline: scaler and forest loaded together from `model_dir`

use super::forest::IsolationForest;
use super::scaler::StandardScaler;
use crate::error::{ModelLoadError, TrainError};
use crate::models::{FeatureVector, Verdict, FEATURE_NAMES};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Artifact layout version written by this build
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the normalizer artifact
pub const SCALER_FILE: &str = "feature_scaler.json";

/// File name of the scorer artifact
pub const FOREST_FILE: &str = "isolation_forest.json";

/// Anything that turns a feature vector into a verdict
///
/// Implementations are read-only after construction so a single instance can
/// be shared across tasks.
pub trait Scorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Verdict;

    /// Continuous margin behind the verdict, when the scorer has one
    fn decision(&self, _features: &FeatureVector) -> Option<f64> {
        None
    }
}

/// Common header of both artifact files
#[derive(Debug, Deserialize)]
struct ArtifactHeader {
    schema_version: u32,
    feature_names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Artifact<T> {
    schema_version: u32,
    feature_names: Vec<String>,
    model: T,
}

impl<T> Artifact<T> {
    fn new(model: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            model,
        }
    }
}

/// Normalizer plus scorer fitted on the same corpus
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineModel {
    pub scaler: StandardScaler,
    pub forest: IsolationForest,
}

impl BaselineModel {
    pub fn new(scaler: StandardScaler, forest: IsolationForest) -> Self {
        Self { scaler, forest }
    }

    /// Load both artifacts from `dir`
    pub fn load(dir: &Path) -> Result<Self, ModelLoadError> {
        let scaler: StandardScaler = read_artifact(&dir.join(SCALER_FILE))?;
        let forest: IsolationForest = read_artifact(&dir.join(FOREST_FILE))?;

        scaler.validate().map_err(ModelLoadError::Invalid)?;
        forest.validate().map_err(ModelLoadError::Invalid)?;

        info!(
            dir = %dir.display(),
            trees = forest.tree_count(),
            sample_size = forest.sample_size,
            contamination = forest.params.contamination,
            "Loaded baseline model"
        );

        Ok(Self { scaler, forest })
    }

    /// Write both artifacts into `dir`, creating it if needed
    pub fn save(&self, dir: &Path) -> Result<(), TrainError> {
        fs::create_dir_all(dir)?;
        write_artifact(&dir.join(SCALER_FILE), &Artifact::new(&self.scaler))?;
        write_artifact(&dir.join(FOREST_FILE), &Artifact::new(&self.forest))?;
        Ok(())
    }

    /// Signed margin from the decision boundary; negative means anomalous
    pub fn decision(&self, features: &FeatureVector) -> f64 {
        self.forest.decision_function(&self.scaler.transform(features))
    }
}

impl Scorer for BaselineModel {
    fn score(&self, features: &FeatureVector) -> Verdict {
        if BaselineModel::decision(self, features) < 0.0 {
            Verdict::Anomaly
        } else {
            Verdict::Normal
        }
    }

    fn decision(&self, features: &FeatureVector) -> Option<f64> {
        Some(BaselineModel::decision(self, features))
    }
}

/// Paths of the two artifacts inside `dir`
pub fn artifact_paths(dir: &Path) -> [PathBuf; 2] {
    [dir.join(SCALER_FILE), dir.join(FOREST_FILE)]
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ModelLoadError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ModelLoadError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(ModelLoadError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let corrupt = |source| ModelLoadError::Corrupt {
        path: path.to_path_buf(),
        source,
    };

    // Check the header before the body so a version bump is reported as such
    let header: ArtifactHeader = serde_json::from_slice(&bytes).map_err(corrupt)?;
    if header.schema_version != SCHEMA_VERSION {
        return Err(ModelLoadError::SchemaMismatch {
            expected: format!("schema_version {}", SCHEMA_VERSION),
            found: format!("schema_version {}", header.schema_version),
        });
    }
    if header.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
        return Err(ModelLoadError::SchemaMismatch {
            expected: FEATURE_NAMES.join(","),
            found: header.feature_names.join(","),
        });
    }

    let artifact: Artifact<T> = serde_json::from_slice(&bytes).map_err(corrupt)?;
    debug!(path = %path.display(), "Read model artifact");
    Ok(artifact.model)
}

fn write_artifact<T: Serialize>(path: &Path, artifact: &Artifact<T>) -> Result<(), TrainError> {
    let temp_path = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(artifact)?;

    let mut file = File::create(&temp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    debug!(path = %path.display(), bytes = json.len(), "Wrote model artifact");
    Ok(())
}
