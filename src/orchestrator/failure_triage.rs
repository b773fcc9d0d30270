//! Failure triage: when a worker fails, the operator chooses to Retry,
//! Merge what succeeded, or Save the failure for later (spec.md §4.4
//! Failure triage). Every failure is also appended to `failed_ranges.json`
//! so it survives across runs, even if the operator picks Save.

use crate::errors::OrchestratorError;
use batchforge_common::atomic::write_atomic;
use batchforge_common::Range;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageChoice {
    Retry,
    Merge,
    Save,
}

impl TriageChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "R" => Some(Self::Retry),
            "M" => Some(Self::Merge),
            "S" => Some(Self::Save),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRange {
    pub run_id: String,
    pub label: String,
    pub range: Range,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

fn failed_ranges_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("failed_ranges.json")
}

/// Load the append-only failure log, or an empty list if none exists yet.
pub fn load_failed_ranges(logs_dir: &Path) -> Result<Vec<FailedRange>, OrchestratorError> {
    let path = failed_ranges_path(logs_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path).map_err(|e| OrchestratorError::Other(e.into()))?;
    serde_json::from_str(&content).map_err(|e| OrchestratorError::Other(e.into()))
}

/// Append one failure record, never truncating prior runs' entries.
pub fn append_failed_range(logs_dir: &Path, failure: FailedRange) -> Result<(), OrchestratorError> {
    let mut existing = load_failed_ranges(logs_dir)?;
    existing.push(failure);
    let bytes = serde_json::to_vec_pretty(&existing).map_err(|e| OrchestratorError::Other(e.into()))?;
    write_atomic(&failed_ranges_path(logs_dir), &bytes).map_err(|e| OrchestratorError::Other(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_case_insensitive_single_letters() {
        assert_eq!(TriageChoice::parse("r"), Some(TriageChoice::Retry));
        assert_eq!(TriageChoice::parse("M"), Some(TriageChoice::Merge));
        assert_eq!(TriageChoice::parse(" s "), Some(TriageChoice::Save));
        assert_eq!(TriageChoice::parse("x"), None);
    }

    #[test]
    fn append_then_load_accumulates_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let failure = FailedRange {
            run_id: "run1".into(),
            label: "reviews".into(),
            range: Range::new(2, 35, 67),
            error: "timeout".into(),
            recorded_at: Utc::now(),
        };
        append_failed_range(dir.path(), failure.clone()).unwrap();
        append_failed_range(dir.path(), failure).unwrap();

        let loaded = load_failed_ranges(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn load_with_no_file_yet_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_failed_ranges(dir.path()).unwrap().is_empty());
    }
}
