//! Worker lifecycle: load the assigned row range, drive the Processor
//! loop, report status, and emit a merged output file (spec.md §4.3).
//! Grounded on `W_worker.py`'s `Worker` class.

use crate::errors::{ProcessorError, WorkerError};
use crate::processor::{PromptsConfig, Processor, ProgressUpdate};
use crate::row::{read_csv, row_id, RowRecord};
use crate::serializer::Serializer;
use batchforge_common::{ModelClient, WorkerStatus};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerArgs {
    pub worker_id: u32,
    pub input_file: PathBuf,
    pub row_start: i64,
    pub row_end: i64,
    pub batch_size: usize,
    pub output_dir: PathBuf,
    pub output_name: String,
    pub checkpoint_dir: PathBuf,
    pub checkpoint_interval: u32,
    pub keep_merged: bool,
    pub status_dir: PathBuf,
    pub run_id: String,
    pub retries: u32,
    pub delay_secs: u64,
    pub pause_file: PathBuf,
}

pub struct Worker {
    args: WorkerArgs,
    processor: Processor,
    serializer: Serializer,
    status: WorkerStatus,
}

impl Worker {
    pub fn new(args: WorkerArgs, model: Arc<dyn ModelClient>, prompts_config: PromptsConfig) -> Result<Self, WorkerError> {
        let serializer = Serializer::new(args.checkpoint_dir.clone(), args.checkpoint_interval, args.keep_merged)
            .map_err(|source| WorkerError::InputLoadFailed { path: args.checkpoint_dir.clone(), source })?;
        let status = WorkerStatus::new(args.worker_id, args.run_id.clone());
        let processor = Processor::new(model, prompts_config, args.retries, Duration::from_secs(args.delay_secs));
        Ok(Self { args, processor, serializer, status })
    }

    /// Stable per-range identity used for checkpoint/output naming
    /// (spec.md §4.5: `{start}-{end}_w{worker_id}_{run_id}`).
    pub fn job_id(&self) -> String {
        format!("{}-{}_w{}_{}", self.args.row_start, self.args.row_end, self.args.worker_id, self.args.run_id)
    }

    /// Load the input file and slice it to this worker's range. If the
    /// input carries no `RowID`, one is synthesized from the file's
    /// global, 1-indexed position before slicing, so two workers never
    /// assign the same id to different rows (spec.md §9 Open Question).
    fn load_range(&self) -> Result<Vec<RowRecord>, WorkerError> {
        let all_rows = read_csv(&self.args.input_file)?;
        let has_row_id = all_rows.first().is_some_and(|r| row_id(r).is_some());

        let mut rows: Vec<RowRecord> = if has_row_id {
            all_rows.into_iter().collect()
        } else {
            all_rows
                .into_iter()
                .enumerate()
                .map(|(idx, mut row)| {
                    row.insert("RowID".to_string(), Value::Number(((idx + 1) as i64).into()));
                    row
                })
                .collect()
        };
        rows.retain(|r| row_id(r).is_some_and(|id| id >= self.args.row_start && id <= self.args.row_end));
        rows.sort_by_key(|r| row_id(r).unwrap_or(0));
        Ok(rows)
    }

    fn output_path(&self) -> PathBuf {
        self.args.output_dir.join(&self.args.output_name)
    }

    /// Drives the full range to completion. Returns the final status
    /// whether the worker succeeded or failed; worker-internal failures
    /// are reported through the status file, not propagated as panics,
    /// so a crashed worker still leaves a readable `failed` record
    /// wherever one can be written at all.
    pub fn run(&mut self) -> Result<WorkerStatus, WorkerError> {
        std::fs::create_dir_all(&self.args.output_dir).map_err(|source| WorkerError::InputLoadFailed { path: self.args.output_dir.clone(), source })?;
        self.status.save(&self.args.status_dir)?;

        let rows = match self.load_range() {
            Ok(rows) => rows,
            Err(err) => {
                self.status.set_failed(err.to_string());
                self.status.save(&self.args.status_dir)?;
                return Err(err);
            }
        };

        let job_id = self.job_id();
        let (remaining, _last_row_id, resumed) = self
            .serializer
            .get_resume_point(&job_id, rows.clone())
            .map_err(|e| WorkerError::from(ProcessorError::from(e)))?;
        if resumed {
            tracing::info!(worker_id = self.args.worker_id, job_id = %job_id, "resuming from checkpoint");
        }

        self.status.set_running(self.args.row_start, self.args.row_end, rows.len() as u64);
        self.status.save(&self.args.status_dir)?;

        let pause_file = self.args.pause_file.clone();
        let pause_probe = move || pause_file.exists();

        let mut status = self.status.clone();
        let status_dir = self.args.status_dir.clone();
        let already_processed = rows.len() as u64 - remaining.len() as u64;

        let run_result = self.processor.process_dataframe(
            &remaining,
            self.args.batch_size,
            &self.serializer,
            &job_id,
            &RowRecord::new(),
            pause_probe,
            |update: ProgressUpdate| {
                let current_row = already_processed + update.current_row;
                let total_rows = already_processed + update.total_rows;
                let eta_seconds = update
                    .metrics
                    .rows_per_sec
                    .filter(|r| *r > 0.0)
                    .map(|rate| (total_rows.saturating_sub(current_row)) as f64 / rate);
                status.set_progress(current_row as i64, current_row, update.api_calls, eta_seconds, Some(update.metrics));
                if let Err(err) = status.save(&status_dir) {
                    tracing::warn!(error = %err, "failed to persist worker status during progress update");
                }
            },
        );
        self.status = status;

        match run_result {
            Ok((_results, _api_calls)) => {
                let output_path = self.output_path();
                match self.serializer.merge_checkpoints(&job_id, &output_path) {
                    Ok(true) => {
                        self.status.set_completed(Some(output_path), rows.len() as u64);
                    }
                    Ok(false) => {
                        self.status.set_completed(None, 0);
                    }
                    Err(err) => {
                        self.status.set_failed(err.to_string());
                        self.status.save(&self.args.status_dir)?;
                        return Err(WorkerError::from(ProcessorError::Serializer(err)));
                    }
                }
                self.status.save(&self.args.status_dir)?;
                Ok(self.status.clone())
            }
            Err(err) => {
                self.status.set_failed(err.to_string());
                self.status.save(&self.args.status_dir)?;
                Err(WorkerError::from(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::PromptsConfig;
    use batchforge_common::{ChatMessage, ModelClientError, ModelResponse, TokenStats};

    struct StubClient;
    impl ModelClient for StubClient {
        fn chat(&self, _messages: &[ChatMessage], _json_format: bool) -> Result<ModelResponse, ModelClientError> {
            Ok(ModelResponse { content: r#"{"Sentiment":"Positive"}"#.to_string(), token_stats: TokenStats::default() })
        }
    }

    fn prompts_config() -> PromptsConfig {
        PromptsConfig {
            system_prompt: "classify".into(),
            prompt_fields: vec!["Message".into()],
            columns_to_code: vec!["Sentiment".into()],
            preserve_input_columns: vec!["RowID".into()],
            not_applicable_defaults: RowRecord::new(),
            primary_indicator_column: None,
            na_sentinel: "N".into(),
            na_default_value: "-".into(),
            categorical_rules: vec![],
            relationship_rules: vec![],
        }
    }

    fn args(dir: &std::path::Path) -> WorkerArgs {
        WorkerArgs {
            worker_id: 1,
            input_file: dir.join("input.csv"),
            row_start: 1,
            row_end: 3,
            batch_size: 2,
            output_dir: dir.join("output"),
            output_name: "part.csv".into(),
            checkpoint_dir: dir.join("checkpoints"),
            checkpoint_interval: 2,
            keep_merged: false,
            status_dir: dir.join("status"),
            run_id: "run1".into(),
            retries: 2,
            delay_secs: 0,
            pause_file: dir.join("pause.flag"),
        }
    }

    #[test]
    fn worker_processes_its_range_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.csv"), "RowID,Message\n1,a\n2,b\n3,c\n4,d\n").unwrap();

        let mut worker = Worker::new(args(dir.path()), Arc::new(StubClient), prompts_config()).unwrap();
        let status = worker.run().unwrap();

        assert_eq!(status.state, batchforge_common::WorkerState::Completed);
        assert_eq!(status.rows_processed, 3);
        let output = read_csv(&dir.path().join("output").join("part.csv")).unwrap();
        assert_eq!(output.len(), 3);
    }

    #[test]
    fn worker_synthesizes_row_id_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.csv"), "Message\na\nb\nc\nd\n").unwrap();

        let mut worker = Worker::new(args(dir.path()), Arc::new(StubClient), prompts_config()).unwrap();
        let status = worker.run().unwrap();

        assert_eq!(status.state, batchforge_common::WorkerState::Completed);
        assert_eq!(status.rows_processed, 3);
    }

    #[test]
    fn worker_resumes_from_an_existing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.csv"), "RowID,Message\n1,a\n2,b\n3,c\n").unwrap();
        let mut a = args(dir.path());
        a.row_end = 3;

        let serializer = Serializer::new(a.checkpoint_dir.clone(), a.checkpoint_interval, a.keep_merged).unwrap();
        let mut pre_row = RowRecord::new();
        pre_row.insert("RowID".into(), serde_json::json!("1"));
        pre_row.insert("Sentiment".into(), serde_json::json!("Positive"));
        let job_id_preview = format!("{}-{}_w{}_{}", a.row_start, a.row_end, a.worker_id, a.run_id);
        serializer.save_checkpoint(&[pre_row], &job_id_preview, 1, &RowRecord::new()).unwrap();

        let mut worker = Worker::new(a, Arc::new(StubClient), prompts_config()).unwrap();
        let status = worker.run().unwrap();
        assert_eq!(status.state, batchforge_common::WorkerState::Completed);

        let output = read_csv(&worker.output_path()).unwrap();
        assert_eq!(output.len(), 3);
    }

    #[test]
    fn worker_respects_an_already_set_pause_flag_then_completes_once_cleared() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.csv"), "RowID,Message\n1,a\n").unwrap();
        let mut a = args(dir.path());
        a.row_end = 1;
        std::fs::write(&a.pause_file, "").unwrap();
        let pause_file = a.pause_file.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = std::fs::remove_file(&pause_file);
        });

        let mut worker = Worker::new(a, Arc::new(StubClient), prompts_config()).unwrap();
        let status = worker.run().unwrap();
        assert_eq!(status.state, batchforge_common::WorkerState::Completed);
    }
}
