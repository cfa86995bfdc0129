//! Alert log summary

use anyhow::{Context, Result};
use colored::Colorize;
use hostwatch_lib::alert::analyzer::{self, AnalysisReport};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_percent, print_table, print_warning, OutputFormat};

/// Row for the most frequent processes table
#[derive(Tabled, Serialize)]
struct ProcessRow {
    #[tabled(rename = "Process")]
    name: String,
    #[tabled(rename = "Anomalies")]
    count: usize,
}

pub fn analyze_log(path: &Path, format: OutputFormat) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("Failed to open alert log {}", path.display()))?;
    let entries = analyzer::parse_alert_log(BufReader::new(file))
        .with_context(|| format!("Failed to read alert log {}", path.display()))?;
    let report = analyzer::analyze(&entries);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => print_report(path, &report),
    }

    Ok(())
}

fn print_report(path: &Path, report: &AnalysisReport) {
    println!("{}", "Alert Log Analysis".bold());
    println!("{}", "=".repeat(50));
    println!("Log:            {}", path.display().to_string().cyan());
    println!("Entries:        {}", report.total_entries);
    println!(
        "Anomalies:      {} ({:.2}%)",
        anomaly_count(report.anomaly_count),
        report.anomaly_rate
    );

    if report.anomaly_count == 0 {
        println!();
        print_warning("No anomalies recorded");
        return;
    }

    println!();
    println!("{}", "Resource usage during anomalies".bold());
    println!("{}", "-".repeat(50));
    println!(
        "CPU:            mean {} | max {}",
        format_percent(report.cpu_mean),
        format_percent(report.cpu_max)
    );
    println!(
        "RAM:            mean {} | max {}",
        format_percent(report.ram_mean),
        format_percent(report.ram_max)
    );
    println!();

    println!("{}", "Most frequent processes".bold());
    let rows: Vec<ProcessRow> = report
        .top_processes
        .iter()
        .map(|(name, count)| ProcessRow {
            name: name.clone(),
            count: *count,
        })
        .collect();
    print_table(&rows, OutputFormat::Table);
}

fn anomaly_count(count: usize) -> String {
    if count > 0 {
        count.to_string().red().bold().to_string()
    } else {
        count.to_string().green().to_string()
    }
}
