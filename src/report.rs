//! Run output: one JSON line per paper plus a summary document.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::{BatchReport, MetricsSnapshot, PaperRecord, RunAnalysis};
use crate::error::Result;

/// Contents of `<output>.summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub rubric: String,
    pub engines: Vec<String>,
    pub metrics: MetricsSnapshot,
    pub analysis: RunAnalysis,
}

impl RunSummary {
    pub fn new(report: &BatchReport, rubric: impl Into<String>, engines: Vec<String>) -> Self {
        Self {
            run_id: report.run_id,
            generated_at: Utc::now(),
            rubric: rubric.into(),
            engines,
            metrics: report.metrics.clone(),
            analysis: RunAnalysis::from_records(&report.records),
        }
    }
}

/// `results.jsonl` → `results.summary.json`.
pub fn summary_path(output: &Path) -> PathBuf {
    output.with_extension("summary.json")
}

pub fn write_records(path: &Path, records: &[PaperRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}
