//! JSON report files.

use std::path::{Path, PathBuf};

use schemabench_engine::BenchmarkReport;

/// Default report location: `results/benchmark-<UTC timestamp>.json`.
pub fn default_report_path(report: &BenchmarkReport) -> PathBuf {
    PathBuf::from(format!(
        "results/benchmark-{}.json",
        report.started_at.format("%Y%m%dT%H%M%SZ")
    ))
}

pub fn save_report(report: &BenchmarkReport, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a report and recompute every summary from its stored runs.
pub fn load_report(path: &Path) -> anyhow::Result<BenchmarkReport> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    let mut report: BenchmarkReport = serde_json::from_str(&text)?;
    for result in &mut report.results {
        result.recompute_summary();
    }
    Ok(report)
}
