//! Run summary: a markdown report written under `logs/summaries/` once a
//! run finishes, for the `--summary` CLI verb. Supplements spec.md from
//! `M_monitor.py`'s `finish()`/`_create_summary` (not itself named in the
//! distilled spec, but a natural counterpart to its manifest/status data).

use batchforge_common::{Manifest, WorkerStatus, WorkerState};
use std::path::{Path, PathBuf};

pub struct RunSummary {
    pub run_id: String,
    pub total_rows: u64,
    pub rows_processed: u64,
    pub api_calls: u64,
    pub errors: u64,
    pub workers_completed: usize,
    pub workers_failed: usize,
}

impl RunSummary {
    pub fn from_statuses(run_id: &str, statuses: &[WorkerStatus]) -> Self {
        Self {
            run_id: run_id.to_string(),
            total_rows: statuses.iter().map(|s| s.total_rows).sum(),
            rows_processed: statuses.iter().map(|s| s.rows_processed).sum(),
            api_calls: statuses.iter().map(|s| s.api_calls).sum(),
            errors: statuses.iter().map(|s| s.errors).sum(),
            workers_completed: statuses.iter().filter(|s| s.state == WorkerState::Completed).count(),
            workers_failed: statuses.iter().filter(|s| s.state == WorkerState::Failed).count(),
        }
    }

    fn status_line(&self) -> &'static str {
        if self.workers_failed == 0 && self.rows_processed == self.total_rows {
            "Completed successfully"
        } else {
            "Partially completed"
        }
    }

    pub fn render_markdown(&self) -> String {
        let mut out = format!("# Run Summary - {}\n\n", self.run_id);
        out.push_str("## Performance Metrics\n\n");
        out.push_str(&format!("- **Rows Processed:** {}/{}\n", self.rows_processed, self.total_rows));
        out.push_str(&format!("- **API Calls:** {}\n", self.api_calls));
        out.push_str(&format!("- **Workers Completed:** {}\n", self.workers_completed));
        out.push_str(&format!("- **Workers Failed:** {}\n", self.workers_failed));
        out.push_str(&format!("- **Errors Encountered:** {}\n\n", self.errors));
        out.push_str("## Status\n\n");
        out.push_str(&format!("{}\n", self.status_line()));
        out
    }

    pub fn path(logs_dir: &Path, run_id: &str) -> PathBuf {
        logs_dir.join("summaries").join(format!("summary_{run_id}.md"))
    }

    pub fn write(&self, logs_dir: &Path) -> std::io::Result<PathBuf> {
        let path = Self::path(logs_dir, &self.run_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.render_markdown())?;
        Ok(path)
    }
}

/// Build a summary for `--summary --run-id R` by reading every worker
/// status plus the run manifest (read only for existence/validation —
/// the counts themselves come from status files, the live source of truth).
pub fn build_summary(status_dir: &Path, logs_dir: &Path, run_id: &str) -> anyhow::Result<RunSummary> {
    let _manifest = Manifest::load(logs_dir, run_id)?;
    let statuses = WorkerStatus::load_all(status_dir, run_id);
    Ok(RunSummary::from_statuses(run_id, &statuses))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: u32, total: u64, processed: u64, state: WorkerState) -> WorkerStatus {
        let mut s = WorkerStatus::new(id, "run1");
        s.total_rows = total;
        s.rows_processed = processed;
        s.state = state;
        s
    }

    #[test]
    fn aggregates_across_all_workers() {
        let statuses = vec![
            status(1, 50, 50, WorkerState::Completed),
            status(2, 50, 30, WorkerState::Failed),
        ];
        let summary = RunSummary::from_statuses("run1", &statuses);
        assert_eq!(summary.total_rows, 100);
        assert_eq!(summary.rows_processed, 80);
        assert_eq!(summary.workers_completed, 1);
        assert_eq!(summary.workers_failed, 1);
    }

    #[test]
    fn status_line_reflects_full_completion() {
        let statuses = vec![status(1, 50, 50, WorkerState::Completed)];
        let summary = RunSummary::from_statuses("run1", &statuses);
        assert_eq!(summary.status_line(), "Completed successfully");
    }

    #[test]
    fn status_line_reflects_partial_completion() {
        let statuses = vec![status(1, 50, 50, WorkerState::Completed), status(2, 50, 10, WorkerState::Failed)];
        let summary = RunSummary::from_statuses("run1", &statuses);
        assert_eq!(summary.status_line(), "Partially completed");
    }

    #[test]
    fn write_creates_summaries_directory() {
        let dir = tempfile::tempdir().unwrap();
        let statuses = vec![status(1, 10, 10, WorkerState::Completed)];
        let summary = RunSummary::from_statuses("run1", &statuses);
        let path = summary.write(dir.path()).unwrap();
        assert!(path.exists());
        assert!(path.to_string_lossy().contains("summary_run1.md"));
    }
}
