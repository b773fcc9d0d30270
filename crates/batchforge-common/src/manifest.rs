//! The per-run manifest: plan + progress record that survives orchestrator
//! exit and enables `--resume`/`--monitor-only` (spec.md §3, §4.4).

use crate::atomic::write_atomic;
use crate::errors::ManifestError;
use crate::job_config::JobConfig;
use crate::range::Range;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Completed,
    CompletedWithFailures,
    InputMissing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub label: String,
    pub input_file: PathBuf,
    pub status: FileStatus,
    pub row_ranges: Vec<Range>,
    pub expected_outputs: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_output: Option<PathBuf>,
    pub last_updated: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn pending(label: String, input_file: PathBuf, row_ranges: Vec<Range>, expected_outputs: Vec<PathBuf>) -> Self {
        Self {
            label,
            input_file,
            status: FileStatus::Pending,
            row_ranges,
            expected_outputs,
            merged_output: None,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub config: JobConfig,
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(run_id: impl Into<String>, config: JobConfig) -> Self {
        Self {
            run_id: run_id.into(),
            config,
            files: Vec::new(),
        }
    }

    pub fn path(logs_dir: &Path, run_id: &str) -> PathBuf {
        logs_dir.join(run_id).join("run_manifest.json")
    }

    /// Created on orchestrator start if absent; otherwise loaded as-is so
    /// a resumed run sees its original plan and per-file progress.
    pub fn load_or_create(logs_dir: &Path, run_id: &str, config: &JobConfig) -> Result<Self, ManifestError> {
        let path = Self::path(logs_dir, run_id);
        if !path.exists() {
            return Ok(Self::new(run_id, config.clone()));
        }
        Self::load(logs_dir, run_id)
    }

    pub fn load(logs_dir: &Path, run_id: &str) -> Result<Self, ManifestError> {
        let path = Self::path(logs_dir, run_id);
        let content = std::fs::read_to_string(&path)
            .map_err(|source| ManifestError::ReadFailed { path: path.clone(), source })?;
        serde_json::from_str(&content).map_err(|source| ManifestError::ParseFailed { path, source })
    }

    pub fn save(&self, logs_dir: &Path) -> Result<(), ManifestError> {
        let path = Self::path(logs_dir, &self.run_id);
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| ManifestError::WriteFailed {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, source),
        })?;
        write_atomic(&path, &bytes).map_err(|source| ManifestError::WriteFailed { path, source })
    }

    pub fn entry(&self, label: &str) -> Option<&ManifestEntry> {
        self.files.iter().find(|f| f.label == label)
    }

    /// Insert a new entry, or replace the existing one for the same label
    /// (used when the plan is recomputed, e.g. a fresh non-resumed run).
    pub fn upsert_entry(&mut self, entry: ManifestEntry) {
        if let Some(existing) = self.files.iter_mut().find(|f| f.label == entry.label) {
            *existing = entry;
        } else {
            self.files.push(entry);
        }
    }

    pub fn mark_status(
        &mut self,
        label: &str,
        status: FileStatus,
        merged_output: Option<PathBuf>,
    ) -> Result<(), ManifestError> {
        let entry = self
            .files
            .iter_mut()
            .find(|f| f.label == label)
            .ok_or_else(|| ManifestError::EntryNotFound(label.to_string()))?;
        entry.status = status;
        if merged_output.is_some() {
            entry.merged_output = merged_output;
        }
        entry.last_updated = Utc::now();
        Ok(())
    }

    pub fn pending_or_incomplete(&self) -> Vec<&ManifestEntry> {
        self.files
            .iter()
            .filter(|f| !matches!(f.status, FileStatus::Completed))
            .collect()
    }
}
