//! Show a persisted baseline model

use anyhow::{Context, Result};
use colored::Colorize;
use hostwatch_lib::baseline::{artifact_paths, BaselineModel, SCHEMA_VERSION};
use hostwatch_lib::FEATURE_NAMES;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_table, OutputFormat};

/// Row for the per-feature normalizer table
#[derive(Tabled, Serialize)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Scale")]
    scale: String,
}

#[derive(Serialize)]
struct ModelSummary {
    model_dir: String,
    schema_version: u32,
    trees: usize,
    nodes: usize,
    sample_size: usize,
    max_samples: usize,
    contamination: f64,
    seed: u64,
    offset: f64,
    features: Vec<FeatureRow>,
}

pub fn show_model(model_dir: &Path, format: OutputFormat) -> Result<()> {
    let model = BaselineModel::load(model_dir)
        .with_context(|| format!("Failed to load model from {}", model_dir.display()))?;

    let summary = summarize(model_dir, &model);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Table => {
            println!("{}", "Baseline Model".bold());
            println!("{}", "=".repeat(50));
            for path in artifact_paths(model_dir) {
                println!("Artifact:       {}", path.display().to_string().cyan());
            }
            println!("Schema version: {}", summary.schema_version);
            println!();

            println!("{}", "Isolation Forest".bold());
            println!("{}", "-".repeat(50));
            println!("Trees:          {}", summary.trees);
            println!("Nodes:          {}", summary.nodes);
            println!(
                "Sample size:    {} (max_samples {})",
                summary.sample_size, summary.max_samples
            );
            println!("Contamination:  {}", summary.contamination);
            println!("Random seed:    {}", summary.seed);
            println!("Offset:         {:.6}", summary.offset);
            println!();

            println!("{}", "Standard Scaler".bold());
            print_table(&summary.features, format);
        }
    }

    Ok(())
}

fn summarize(model_dir: &Path, model: &BaselineModel) -> ModelSummary {
    let forest = &model.forest;
    let features = FEATURE_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| FeatureRow {
            feature: name.to_string(),
            mean: format!("{:.4}", model.scaler.mean[i]),
            scale: format!("{:.4}", model.scaler.scale[i]),
        })
        .collect();

    ModelSummary {
        model_dir: model_dir.display().to_string(),
        schema_version: SCHEMA_VERSION,
        trees: forest.tree_count(),
        nodes: forest.node_count(),
        sample_size: forest.sample_size,
        max_samples: forest.params.max_samples,
        contamination: forest.params.contamination,
        seed: forest.params.seed,
        offset: forest.offset,
        features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostwatch_lib::FeatureVector;
    use tempfile::TempDir;

    #[test]
    fn test_summary_lists_every_feature() {
        let dir = TempDir::new().unwrap();
        let corpus: Vec<FeatureVector> = (0..50)
            .map(|i| FeatureVector {
                cpu_usage: 10.0 + (i % 4) as f64,
                memory_usage: 50.0,
                ..Default::default()
            })
            .collect();
        let model = hostwatch_lib::baseline::fit(&corpus, 0.05).unwrap();
        model.save(dir.path()).unwrap();

        let loaded = BaselineModel::load(dir.path()).unwrap();
        let summary = summarize(dir.path(), &loaded);

        assert_eq!(summary.trees, 100);
        assert_eq!(summary.sample_size, 50);
        assert_eq!(summary.features.len(), FEATURE_NAMES.len());
        assert_eq!(summary.features[1].feature, "memory_usage");
        assert_eq!(summary.features[1].mean, "50.0000");
        // Constant column keeps unit scale
        assert_eq!(summary.features[1].scale, "1.0000");
        assert!(summary.nodes >= summary.trees);
    }

    #[test]
    fn test_show_model_reports_missing_artifacts() {
        let dir = TempDir::new().unwrap();
        let err = show_model(dir.path(), OutputFormat::Json).unwrap_err();
        assert!(format!("{:#}", err).contains("model artifact not found"));
    }
}
