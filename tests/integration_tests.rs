//! Integration tests for batchforge.
//!
//! Exercises the orchestrator binary end to end through its CLI surface:
//! dry-run planning, pause/resume flag toggling, and reattachment via
//! `--monitor-only`/`--summary` against a hand-built run directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn batchforge() -> Command {
    Command::cargo_bin("batchforge").unwrap()
}

fn write_input_csv(dir: &TempDir, name: &str, rows: usize) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut content = String::from("RowID,Message\n");
    for i in 1..=rows {
        content.push_str(&format!("{i},hello world {i}\n"));
    }
    fs::write(&path, content).unwrap();
    path
}

fn write_job_config(dir: &TempDir, input_path: &std::path::Path, workers: u32) -> std::path::PathBuf {
    let config_path = dir.path().join("job.yaml");
    let yaml = format!(
        r#"
project:
  name: demo
  version: v1
model:
  name: llama3
  batch_size: 5
parallelization:
  enabled: true
  workers: {workers}
  split_strategy: auto
input_queue:
  - path: {input}
    label: reviews
output:
  directory: {out}/output
  checkpoints:
    directory: {out}/checkpoints
monitoring:
  status_dir: {out}/status
  logs_dir: {out}/logs
merge:
  condition: all_success
  sort_by: RowID
error_handling:
  prompt_on_failure: false
  save_failed_ranges: true
"#,
        workers = workers,
        input = input_path.display(),
        out = dir.path().display(),
    );
    fs::write(&config_path, yaml).unwrap();
    config_path
}

mod cli_basics {
    use super::*;

    #[test]
    fn help_lists_every_documented_flag() {
        batchforge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--dry-run"))
            .stdout(predicate::str::contains("--workers"))
            .stdout(predicate::str::contains("--run-id"))
            .stdout(predicate::str::contains("--resume"))
            .stdout(predicate::str::contains("--summary"))
            .stdout(predicate::str::contains("--pause-run"))
            .stdout(predicate::str::contains("--resume-run"))
            .stdout(predicate::str::contains("--monitor-only"));
    }

    #[test]
    fn missing_config_file_is_a_clean_failure_not_a_panic() {
        let dir = TempDir::new().unwrap();
        batchforge()
            .current_dir(dir.path())
            .arg("nope.yaml")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error:"));
    }
}

mod dry_run {
    use super::*;

    #[test]
    fn dry_run_plans_ranges_without_spawning_workers() {
        let dir = TempDir::new().unwrap();
        let input = write_input_csv(&dir, "reviews.csv", 10);
        let config = write_job_config(&dir, &input, 3);

        batchforge()
            .arg(&config)
            .arg("--dry-run")
            .assert()
            .success()
            .stdout(predicate::str::contains("3 ranges planned"));

        // A dry run still commits the plan to the manifest.
        let logs_dir = dir.path().join("logs");
        let entries: Vec<_> = fs::read_dir(&logs_dir).unwrap().collect();
        assert!(!entries.is_empty());
    }

    #[test]
    fn dry_run_honors_workers_override() {
        let dir = TempDir::new().unwrap();
        let input = write_input_csv(&dir, "reviews.csv", 20);
        let config = write_job_config(&dir, &input, 2);

        batchforge()
            .arg(&config)
            .arg("--dry-run")
            .arg("--workers")
            .arg("5")
            .assert()
            .success()
            .stdout(predicate::str::contains("5 ranges planned"));
    }
}

mod pause_resume {
    use super::*;

    #[test]
    fn pause_run_then_resume_run_round_trips_the_flag() {
        let dir = TempDir::new().unwrap();
        let input = write_input_csv(&dir, "reviews.csv", 5);
        let config = write_job_config(&dir, &input, 1);
        let status_dir = dir.path().join("status");

        batchforge()
            .arg(&config)
            .arg("--pause-run")
            .arg("--run-id")
            .arg("run1")
            .assert()
            .success()
            .stdout(predicate::str::contains("paused run run1"));
        assert!(status_dir.join("run1").join("pause.flag").exists());

        batchforge()
            .arg(&config)
            .arg("--resume-run")
            .arg("--run-id")
            .arg("run1")
            .assert()
            .success()
            .stdout(predicate::str::contains("resumed run run1"));
        assert!(!status_dir.join("run1").join("pause.flag").exists());
    }

    #[test]
    fn pause_run_without_run_id_is_a_usage_error() {
        let dir = TempDir::new().unwrap();
        let input = write_input_csv(&dir, "reviews.csv", 5);
        let config = write_job_config(&dir, &input, 1);

        batchforge().arg(&config).arg("--pause-run").assert().failure();
    }
}

mod summary_and_monitor {
    use super::*;
    use batchforge_common::{WorkerState, WorkerStatus};

    fn write_status(status_dir: &std::path::Path, run_id: &str, worker_id: u32, state: WorkerState, total: u64, processed: u64) {
        let mut status = WorkerStatus::new(worker_id, run_id);
        status.state = state;
        status.total_rows = total;
        status.rows_processed = processed;
        status.save(status_dir).unwrap();
    }

    #[test]
    fn summary_reports_aggregate_progress_across_workers() {
        let dir = TempDir::new().unwrap();
        let input = write_input_csv(&dir, "reviews.csv", 10);
        let config = write_job_config(&dir, &input, 2);
        let status_dir = dir.path().join("status");

        write_status(&status_dir, "run1", 1, WorkerState::Completed, 5, 5);
        write_status(&status_dir, "run1", 2, WorkerState::Completed, 5, 5);

        batchforge()
            .arg(&config)
            .arg("--summary")
            .arg("--run-id")
            .arg("run1")
            .assert()
            .success()
            .stdout(predicate::str::contains("wrote summary to"));

        let summary_path = dir.path().join("logs").join("summaries").join("summary_run1.md");
        let content = fs::read_to_string(&summary_path).unwrap();
        assert!(content.contains("10/10"));
        assert!(content.contains("Completed successfully"));
    }

    #[test]
    fn monitor_only_reattaches_to_an_existing_run_without_spawning() {
        let dir = TempDir::new().unwrap();
        let input = write_input_csv(&dir, "reviews.csv", 5);
        let config = write_job_config(&dir, &input, 1);

        // Plan once (dry run, to populate the manifest) before reattaching.
        batchforge().arg(&config).arg("--dry-run").arg("--run-id").arg("run1").assert().success();

        let status_dir = dir.path().join("status");
        write_status(&status_dir, "run1", 1, WorkerState::Completed, 5, 5);

        batchforge()
            .arg(&config)
            .arg("--monitor-only")
            .arg("--run-id")
            .arg("run1")
            .assert()
            .success();
    }

    #[test]
    fn monitor_only_unknown_run_id_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let input = write_input_csv(&dir, "reviews.csv", 5);
        let config = write_job_config(&dir, &input, 1);

        batchforge()
            .arg(&config)
            .arg("--monitor-only")
            .arg("--run-id")
            .arg("nonexistent")
            .assert()
            .failure();
    }
}
