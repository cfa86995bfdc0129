//! Training corpus assembly

use anyhow::{bail, Context, Result};
use colored::Colorize;
use hostwatch_lib::baseline::CorpusWriter;
use hostwatch_lib::collector::{self, MetricSampler};
use hostwatch_lib::Snapshot;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::output::{print_info, print_success, print_warning};

/// Take `samples` snapshots and append them to a corpus CSV at `output`
///
/// Ctrl-C stops early; the rows taken so far are still flushed.
pub async fn collect_corpus(samples: usize, interval_secs: f64, output: &Path) -> Result<()> {
    if !(interval_secs.is_finite() && interval_secs >= 0.0) {
        bail!("--interval must be a non-negative number of seconds, got {}", interval_secs);
    }
    let interval = Duration::from_secs_f64(interval_secs);

    let mut writer = CorpusWriter::create(output)
        .with_context(|| format!("Failed to create corpus file {}", output.display()))?;
    let mut sampler = collector::create_sampler();

    print_info(&format!(
        "Collecting {} samples into {} (Ctrl-C to stop early)",
        samples,
        output.display()
    ));

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut interrupted = false;
    for i in 1..=samples {
        let snapshot = tokio::select! {
            biased;
            _ = &mut interrupt => {
                interrupted = true;
                break;
            }
            snapshot = sampler.sample() => snapshot,
        };

        writer
            .append(&snapshot)
            .with_context(|| format!("Failed to write sample {} to {}", i, output.display()))?;
        info!("{}", progress_line(i, &snapshot));

        let degraded = sampler.take_degraded_fields();
        if degraded > 0 {
            warn!(sample = i, degraded, "Snapshot fields degraded to placeholders");
        }

        if i < samples {
            tokio::select! {
                biased;
                _ = &mut interrupt => {
                    interrupted = true;
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", output.display()))?;

    if interrupted {
        print_warning(&format!(
            "Interrupted after {} of {} samples",
            writer.rows(),
            samples
        ));
    }
    print_success(&format!(
        "Wrote {} samples to {}",
        writer.rows().to_string().bold(),
        output.display()
    ));

    Ok(())
}

/// `Sample i: CPU=..% | Top Process: name`
fn progress_line(index: usize, snapshot: &Snapshot) -> String {
    let top = snapshot
        .top_processes
        .first()
        .map(|p| p.name.as_str())
        .unwrap_or("None");
    format!(
        "Sample {}: CPU={:.1}% | Top Process: {}",
        index, snapshot.cpu_usage, top
    )
}
