use crate::domain::performance::{MetricRow, MetricsTable, WideMetrics};
use crate::domain::results::ResultTable;
use crate::domain::session::SessionLog;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Console and JSON reporting for benchmark sessions and metric tables.
pub struct BenchmarkReporter {
    output_dir: PathBuf,
}

impl BenchmarkReporter {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let path = output_dir.as_ref().to_path_buf();
        if !path.exists() {
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create benchmark output directory {}", path.display()))?;
        }
        Ok(Self { output_dir: path })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn print_session_summary(&self, table: &ResultTable, session: &SessionLog) {
        println!("\n{}", "=".repeat(100));
        println!("📊 BENCHMARK SESSION {}", session.id);
        println!("{}", "=".repeat(100));
        println!(
            "Rows: {} | Methods: {} (ran {}) | Layers: {} | Mode: {}{}",
            table.n_rows(),
            table.n_methods(),
            session.results.len(),
            table.layer_names().len(),
            if session.parameters.parallel {
                format!("parallel x{}", session.parameters.workers)
            } else {
                "sequential".to_string()
            },
            if session.parameters.incremental { " (incremental)" } else { "" }
        );
        println!("{}", "-".repeat(100));
        println!("{:<24} | {:<20} | {:<10} | {:<12}", "Method", "Callable", "Status", "Package");
        println!("{}", "-".repeat(100));

        for info in table.method_info() {
            let status = match session.results.get(&info.id) {
                None => "reused",
                Some(outcomes) if outcomes.values().any(|o| o.is_error()) => "failed",
                Some(_) => "ok",
            };
            println!(
                "{:<24} | {:<20} | {:<10} | {:<12}",
                info.id,
                info.callable,
                status,
                info.package.as_deref().unwrap_or("-")
            );
        }
        println!("{}", "=".repeat(100));

        let failures = session.failures();
        if !failures.is_empty() {
            println!("\n⚠️  FAILURES:");
            println!("{}", "-".repeat(80));
            for (method, step, detail) in failures {
                println!("  {} [{}] ({:?}): {}", method, step, detail.origin, detail.message);
            }
            println!("{}", "-".repeat(80));
        }
    }

    pub fn print_metrics(&self, metrics: &MetricsTable) {
        match metrics {
            MetricsTable::Wide(wide) => print_wide(wide),
            MetricsTable::Tidy(rows) => print_tidy(rows),
        }
    }

    /// Writes `value` as pretty JSON to a timestamped file and returns its path.
    pub fn export_json<T: Serialize>(&self, prefix: &str, value: &T) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
        let filename = format!("{}_{}.json", prefix, Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.output_dir.join(filename);
        fs::write(&path, json).with_context(|| format!("Failed to write report {}", path.display()))?;

        println!("📝 Report saved to: {}", path.display());
        Ok(path)
    }
}

fn print_wide(wide: &WideMetrics) {
    if wide.rows.is_empty() {
        println!("⚠️ No metric values to report.");
        return;
    }

    let header: Vec<String> = wide.columns.iter().map(|c| format!("{:>14}", c)).collect();
    let width = 24 + header.len() * 17;
    println!("\n{}", "=".repeat(width));
    println!("{:<24} | {}", "Method", header.join(" | "));
    println!("{}", "-".repeat(width));
    for row in &wide.rows {
        let cells: Vec<String> = row.values.iter().map(|v| format_cell(*v)).collect();
        println!("{:<24} | {}", row.method, cells.join(" | "));
    }
    println!("{}", "=".repeat(width));
}

fn print_tidy(rows: &[MetricRow]) {
    if rows.is_empty() {
        println!("⚠️ No metric values to report.");
        return;
    }

    println!("\n{}", "=".repeat(90));
    println!("{:<24} | {:<12} | {:<12} | {:<20} | {:>10}", "Method", "Layer", "Metric", "Params", "Value");
    println!("{}", "-".repeat(90));
    for row in rows {
        let params: Vec<String> = row.params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!(
            "{:<24} | {:<12} | {:<12} | {:<20} | {}",
            row.method,
            row.layer,
            row.metric,
            params.join(","),
            format_cell(row.value)
        );
    }
    println!("{}", "=".repeat(90));
}

fn format_cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:>14.4}", v),
        None => format!("{:>14}", "NA"),
    }
}
