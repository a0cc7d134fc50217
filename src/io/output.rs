use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CaseFailure, CaseIndex, Stage, Tagged};

/// Machine-readable summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_name: String,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_seconds: f64,
    pub total_cases: usize,
    pub merged_cases: usize,
    pub failed_cases: usize,
    /// One entry per case, in case list order
    pub cases: Vec<CaseReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub index: CaseIndex,
    pub case: String,
    pub status: CaseStatus,
    /// Slot in the merged tensors, when merged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Merged,
    Failed,
}

impl RunReport {
    /// Build a report from merged cases (in slot order) and failures
    pub fn new<T>(
        run_name: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        merged: &[Tagged<T>],
        failures: &[CaseFailure],
    ) -> Self {
        let mut cases: Vec<CaseReport> = merged
            .iter()
            .enumerate()
            .map(|(slot, tagged)| CaseReport {
                index: tagged.index(),
                case: tagged.case.path.display().to_string(),
                status: CaseStatus::Merged,
                slot: Some(slot),
                stage: None,
                reason: None,
            })
            .chain(failures.iter().map(|failure| CaseReport {
                index: failure.case.index,
                case: failure.case.path.display().to_string(),
                status: CaseStatus::Failed,
                slot: None,
                stage: Some(failure.stage),
                reason: Some(failure.error.to_string()),
            }))
            .collect();
        cases.sort_by_key(|c| c.index);

        let elapsed = (finished_at - started_at).num_milliseconds() as f64 / 1000.0;

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            run_name: run_name.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            elapsed_seconds: elapsed,
            total_cases: cases.len(),
            merged_cases: merged.len(),
            failed_cases: failures.len(),
            cases,
        }
    }

    /// Write to a JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write JSON")?;
        Ok(())
    }
}
