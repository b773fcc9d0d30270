//! Per-worker status: written only by the owning worker, read by the
//! orchestrator (or a `--monitor-only` invocation). spec.md §3, §9.

use crate::atomic::write_atomic;
use crate::errors::WorkerStatusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Initializing,
    Running,
    Completed,
    Failed,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Completed | WorkerState::Failed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThroughputMetrics {
    pub rows_per_sec: Option<f64>,
    pub tokens_per_sec: Option<f64>,
    pub avg_tokens_per_row: Option<f64>,
    pub tokens_total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: u32,
    pub run_id: String,
    pub state: WorkerState,
    pub row_start: i64,
    pub row_end: i64,
    pub current_row: i64,
    pub rows_processed: u64,
    pub total_rows: u64,
    pub progress_pct: f64,
    pub api_calls: u64,
    pub rows_per_sec: Option<f64>,
    pub tokens_per_sec: Option<f64>,
    pub avg_tokens_per_row: Option<f64>,
    pub tokens_total: Option<u64>,
    pub errors: u64,
    pub last_error: Option<String>,
    pub output_file: Option<PathBuf>,
    pub checkpoints: Vec<PathBuf>,
    pub eta_seconds: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl WorkerStatus {
    pub fn new(worker_id: u32, run_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            worker_id,
            run_id: run_id.into(),
            state: WorkerState::Initializing,
            row_start: 0,
            row_end: 0,
            current_row: 0,
            rows_processed: 0,
            total_rows: 0,
            progress_pct: 0.0,
            api_calls: 0,
            rows_per_sec: None,
            tokens_per_sec: None,
            avg_tokens_per_row: None,
            tokens_total: None,
            errors: 0,
            last_error: None,
            output_file: None,
            checkpoints: Vec::new(),
            eta_seconds: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        }
    }

    pub fn file_path(status_dir: &Path, run_id: &str, worker_id: u32) -> PathBuf {
        status_dir.join(run_id).join(format!("worker_{worker_id}.json"))
    }

    pub fn load(status_dir: &Path, run_id: &str, worker_id: u32) -> Result<Self, WorkerStatusError> {
        let path = Self::file_path(status_dir, run_id, worker_id);
        let content = std::fs::read_to_string(&path)
            .map_err(|source| WorkerStatusError::ReadFailed { path: path.clone(), source })?;
        serde_json::from_str(&content).map_err(|source| WorkerStatusError::ParseFailed { path, source })
    }

    /// Read every `worker_*.json` file under `status_dir/{run_id}`. Entries
    /// that fail to parse (e.g. mid-write window) are skipped rather than
    /// failing the whole aggregation, per spec.md §5's torn-read tolerance.
    pub fn load_all(status_dir: &Path, run_id: &str) -> Vec<WorkerStatus> {
        let dir = status_dir.join(run_id);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut statuses: Vec<WorkerStatus> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("worker_") && n.ends_with(".json"))
            })
            .filter_map(|e| {
                let content = std::fs::read_to_string(e.path()).ok()?;
                serde_json::from_str::<WorkerStatus>(&content).ok()
            })
            .collect();
        statuses.sort_by_key(|s| s.worker_id);
        statuses
    }

    pub fn save(&self, status_dir: &Path) -> Result<(), WorkerStatusError> {
        let path = Self::file_path(status_dir, &self.run_id, self.worker_id);
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|source| WorkerStatusError::WriteFailed {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source),
            })?;
        write_atomic(&path, &bytes).map_err(|source| WorkerStatusError::WriteFailed { path, source })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        if self.total_rows > 0 {
            self.progress_pct = ((self.rows_processed as f64 / self.total_rows as f64) * 100.0 * 10.0).round() / 10.0;
        }
    }

    pub fn set_running(&mut self, row_start: i64, row_end: i64, total_rows: u64) {
        self.state = WorkerState::Running;
        self.row_start = row_start;
        self.row_end = row_end;
        self.total_rows = total_rows;
        self.current_row = row_start;
        self.touch();
    }

    pub fn set_progress(
        &mut self,
        current_row: i64,
        rows_processed: u64,
        api_calls: u64,
        eta_seconds: Option<f64>,
        metrics: Option<ThroughputMetrics>,
    ) {
        self.current_row = current_row;
        self.rows_processed = rows_processed;
        self.api_calls = api_calls;
        self.eta_seconds = eta_seconds;
        if let Some(m) = metrics {
            self.rows_per_sec = m.rows_per_sec;
            self.tokens_per_sec = m.tokens_per_sec;
            self.avg_tokens_per_row = m.avg_tokens_per_row;
            self.tokens_total = m.tokens_total;
        }
        self.touch();
    }

    pub fn add_checkpoint(&mut self, checkpoint_file: PathBuf) {
        self.checkpoints.push(checkpoint_file);
        self.touch();
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors += 1;
        self.last_error = Some(message.into());
        self.touch();
    }

    pub fn set_completed(&mut self, output_file: Option<PathBuf>, rows_processed: u64) {
        self.state = WorkerState::Completed;
        self.output_file = output_file;
        self.rows_processed = rows_processed;
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    pub fn set_failed(&mut self, message: impl Into<String>) {
        self.state = WorkerState::Failed;
        self.last_error = Some(message.into());
        self.failed_at = Some(Utc::now());
        self.touch();
    }
}
