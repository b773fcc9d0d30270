//! Final merge: concatenate every worker's output for a file into one
//! ordered CSV, guarded by the configured merge condition (spec.md §4.4
//! Merge).

use crate::errors::OrchestratorError;
use batchforge_common::{FileStatus, ManifestEntry, MergeCondition};
use std::path::{Path, PathBuf};

/// Whether the merge condition is satisfied given per-range completion.
pub fn should_merge(condition: MergeCondition, completed: usize, total: usize) -> bool {
    match condition {
        MergeCondition::AllSuccess => completed == total && total > 0,
        MergeCondition::AnySuccess => completed > 0,
        MergeCondition::Always => true,
    }
}

/// Concatenate the CSVs at `inputs` (in range order, which is already
/// RowID order by construction) and stable-sort by `sort_by`, writing the
/// result to `output_path`. Missing inputs are skipped, not fatal — a
/// partial merge is still useful under `any_success`/`always`.
pub fn merge_outputs(inputs: &[PathBuf], output_path: &Path, sort_by: &str) -> Result<bool, OrchestratorError> {
    let mut headers: Option<csv::StringRecord> = None;
    let mut rows: Vec<csv::StringRecord> = Vec::new();

    for input in inputs {
        if !input.exists() {
            continue;
        }
        let mut reader = csv::Reader::from_path(input).map_err(|e| OrchestratorError::Other(e.into()))?;
        if headers.is_none() {
            headers = Some(reader.headers().map_err(|e| OrchestratorError::Other(e.into()))?.clone());
        }
        for record in reader.records() {
            rows.push(record.map_err(|e| OrchestratorError::Other(e.into()))?);
        }
    }

    let Some(headers) = headers else {
        return Ok(false);
    };
    let sort_idx = headers.iter().position(|h| h == sort_by);
    if let Some(idx) = sort_idx {
        rows.sort_by_key(|r| r.get(idx).and_then(|v| v.parse::<i64>().ok()).unwrap_or(i64::MAX));
    }

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| OrchestratorError::Other(e.into()))?;
    }
    let mut writer = csv::Writer::from_path(output_path).map_err(|e| OrchestratorError::Other(e.into()))?;
    writer.write_record(&headers).map_err(|e| OrchestratorError::Other(e.into()))?;
    for row in &rows {
        writer.write_record(row).map_err(|e| OrchestratorError::Other(e.into()))?;
    }
    writer.flush().map_err(|e| OrchestratorError::Other(e.into()))?;
    Ok(true)
}

/// Status an entry should carry after attempting its merge, given how
/// many of its ranges actually completed.
pub fn entry_status_after_attempt(entry: &ManifestEntry, completed: usize) -> FileStatus {
    if completed == entry.row_ranges.len() {
        FileStatus::Completed
    } else if completed > 0 {
        FileStatus::CompletedWithFailures
    } else {
        FileStatus::InputMissing
    }
}
