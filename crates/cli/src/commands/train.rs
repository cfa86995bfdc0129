//! Baseline fitting

use anyhow::{Context, Result};
use colored::Colorize;
use hostwatch_lib::baseline::{self, artifact_paths, ForestParams};
use serde::Serialize;
use std::path::Path;

use crate::output::{print_success, OutputFormat};

#[derive(Serialize)]
struct TrainSummary {
    corpus: String,
    rows: usize,
    model_dir: String,
    trees: usize,
    sample_size: usize,
    contamination: f64,
    offset: f64,
    artifacts: Vec<String>,
}

/// Fit a baseline on the corpus at `corpus` and persist it into `model_dir`
pub fn train_model(
    corpus: &Path,
    model_dir: &Path,
    params: &ForestParams,
    format: OutputFormat,
) -> Result<()> {
    let rows = baseline::read_corpus_file(corpus)
        .with_context(|| format!("Failed to read training corpus {}", corpus.display()))?;

    let model = baseline::fit_with(&rows, params).context("Failed to fit baseline model")?;
    model
        .save(model_dir)
        .with_context(|| format!("Failed to save model to {}", model_dir.display()))?;

    let summary = TrainSummary {
        corpus: corpus.display().to_string(),
        rows: rows.len(),
        model_dir: model_dir.display().to_string(),
        trees: model.forest.tree_count(),
        sample_size: model.forest.sample_size,
        contamination: params.contamination,
        offset: model.forest.offset,
        artifacts: artifact_paths(model_dir)
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Table => {
            print_success(&format!(
                "Trained on {} samples from {}",
                summary.rows.to_string().bold(),
                summary.corpus
            ));
            println!("Trees:           {}", summary.trees);
            println!("Sample size:     {}", summary.sample_size);
            println!("Contamination:   {}", summary.contamination);
            println!("Offset:          {:.6}", summary.offset);
            for path in &summary.artifacts {
                println!("Saved:           {}", path.cyan());
            }
        }
    }

    Ok(())
}
