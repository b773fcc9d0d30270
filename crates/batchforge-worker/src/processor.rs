//! Row transformer: batched calls to `ModelClient`, bounded retry,
//! multi-stage JSON recovery, permissive validation (spec.md §4.2).
//! Grounded on `P_processor.py`.

use crate::errors::ProcessorError;
use crate::row::{get_str, row_id, RowRecord};
use crate::serializer::Serializer;
use crate::validation::{apply_categorical_rules, apply_primary_indicator, apply_relationship_rules, CategoricalRule, RelationshipRule};
use batchforge_common::{ChatMessage, ModelClient, ThroughputMetrics};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const NOT_APPLICABLE_SENTINEL: &str = "NOT_APPLICABLE";
pub const ERROR_MISSING_KEY: &str = "ERROR_MISSING_KEY";
pub const ERROR_BATCH_MISMATCH: &str = "ERROR_BATCH_MISMATCH";
pub const ERROR_ALL_RETRIES_FAILED: &str = "ERROR_ALL_RETRIES_FAILED";

/// Declarative prompt + validation configuration, loaded from the
/// `--prompts-config` JSON file (spec.md §4.3 entry inputs).
#[derive(Debug, Clone, Deserialize)]
pub struct PromptsConfig {
    pub system_prompt: String,
    /// Input columns rendered into the prompt alongside `RowID`.
    #[serde(default)]
    pub prompt_fields: Vec<String>,
    /// Output columns the model is asked to produce, in order.
    pub columns_to_code: Vec<String>,
    /// Input columns carried through unchanged into checkpoints/output.
    #[serde(default = "default_preserve_columns")]
    pub preserve_input_columns: Vec<String>,
    #[serde(default)]
    pub not_applicable_defaults: RowRecord,
    #[serde(default)]
    pub primary_indicator_column: Option<String>,
    #[serde(default = "default_na_sentinel")]
    pub na_sentinel: String,
    #[serde(default = "default_na_default")]
    pub na_default_value: String,
    #[serde(default)]
    pub categorical_rules: Vec<CategoricalRule>,
    #[serde(default)]
    pub relationship_rules: Vec<RelationshipRule>,
}

fn default_preserve_columns() -> Vec<String> {
    vec!["RowID".to_string()]
}
fn default_na_sentinel() -> String {
    "N".to_string()
}
fn default_na_default() -> String {
    "-".to_string()
}

#[derive(Debug, Default, Clone, Copy)]
struct Stats {
    total_tokens: u64,
    total_duration_ns: u64,
}

pub struct Processor {
    model: Arc<dyn ModelClient>,
    config: PromptsConfig,
    retries: u32,
    delay: Duration,
    stats: Stats,
}

/// One progress observation, emitted at checkpoints, at the configured
/// reporting cadence, and once at completion.
pub struct ProgressUpdate {
    pub current_row: u64,
    pub total_rows: u64,
    pub api_calls: u64,
    pub metrics: ThroughputMetrics,
}

impl Processor {
    pub fn new(model: Arc<dyn ModelClient>, config: PromptsConfig, retries: u32, delay: Duration) -> Self {
        Self { model, config, retries, delay, stats: Stats::default() }
    }

    fn record_stats(&mut self, response: &batchforge_common::ModelResponse) {
        if let Some(total) = response.token_stats.total_tokens {
            self.stats.total_tokens += total;
        } else {
            let prompt = response.token_stats.prompt_tokens.unwrap_or(0);
            let completion = response.token_stats.completion_tokens.unwrap_or(0);
            self.stats.total_tokens += prompt + completion;
        }
        if let Some(d) = response.token_stats.total_duration_ns {
            self.stats.total_duration_ns += d;
        }
    }

    fn build_metrics(&self, current_rows: u64, elapsed: Duration) -> ThroughputMetrics {
        let elapsed_secs = elapsed.as_secs_f64().max(1e-9);
        let rows_per_sec = current_rows as f64 / elapsed_secs;
        let duration_secs = self.stats.total_duration_ns as f64 / 1e9;
        let tokens_per_sec = if duration_secs > 0.0 { Some(self.stats.total_tokens as f64 / duration_secs) } else { None };
        let avg_tokens_per_row = if current_rows > 0 { Some(self.stats.total_tokens as f64 / current_rows as f64) } else { None };
        ThroughputMetrics {
            rows_per_sec: Some(rows_per_sec),
            tokens_per_sec,
            avg_tokens_per_row,
            tokens_total: Some(self.stats.total_tokens),
        }
    }

    fn render_row(&self, row: &RowRecord) -> String {
        let mut out = format!("RowID: {}\n", get_str(row, "RowID"));
        for field in &self.config.prompt_fields {
            out.push_str(&format!("{field}: {}\n", get_str(row, field)));
        }
        out
    }

    fn single_prompt(&self, row: &RowRecord) -> String {
        format!("Classify this row.\n\n{}", self.render_row(row))
    }

    fn batch_prompt(&self, rows: &[RowRecord]) -> String {
        let mut prompt = format!(
            "Classify these {} rows. Return a JSON ARRAY with one object per row in the EXACT order given.\n\n",
            rows.len()
        );
        for (idx, row) in rows.iter().enumerate() {
            prompt.push_str(&format!("[ROW {} of {}]\n{}\n", idx + 1, rows.len(), self.render_row(row)));
        }
        prompt.push_str(&format!("\nReturn a JSON array with EXACTLY {} objects in order.", rows.len()));
        prompt
    }

    fn call_model(&mut self, prompt: &str) -> Result<String, ProcessorError> {
        let messages = [ChatMessage::system(&self.config.system_prompt), ChatMessage::user(prompt)];
        let response = self.model.chat(&messages, true)?;
        self.record_stats(&response);
        Ok(response.content)
    }

    /// Copies `preserve_input_columns` (default `["RowID"]`) out of the
    /// original row, mirroring `prepare_checkpoint_data`'s re-join of
    /// `original_df[metadata_cols]` onto the model-derived columns before
    /// every checkpoint write (spec.md:228 checkpoint schema).
    fn preserved_columns(&self, original: &RowRecord) -> RowRecord {
        let mut row = RowRecord::new();
        for column in &self.config.preserve_input_columns {
            if let Some(value) = original.get(column) {
                row.insert(column.clone(), value.clone());
            }
        }
        row
    }

    fn extract_row(&self, original: &RowRecord, value: &Value, row_id_for_log: i64) -> RowRecord {
        let mut row = self.preserved_columns(original);
        let object = value.as_object();
        let first_column = self.config.columns_to_code.first();
        if let (Some(first), Some(obj)) = (first_column, object) {
            if obj.get(first).and_then(|v| v.as_str()) == Some(NOT_APPLICABLE_SENTINEL) {
                for (column, value) in &self.config.not_applicable_defaults {
                    row.insert(column.clone(), value.clone());
                }
                return row;
            }
        }
        for column in &self.config.columns_to_code {
            let value = object
                .and_then(|o| o.get(column))
                .cloned()
                .unwrap_or_else(|| Value::String(ERROR_MISSING_KEY.to_string()));
            row.insert(column.clone(), value);
        }
        self.validate(&mut row, row_id_for_log);
        row
    }

    fn validate(&self, row: &mut RowRecord, row_id: i64) {
        let primary = self
            .config
            .primary_indicator_column
            .clone()
            .or_else(|| self.config.columns_to_code.first().cloned());
        let Some(primary) = primary else { return };
        let others: Vec<String> = self.config.columns_to_code.iter().filter(|c| **c != primary).cloned().collect();
        let short_circuited = apply_primary_indicator(row, &primary, &self.config.na_sentinel, &others, &self.config.na_default_value, row_id);
        if short_circuited {
            return;
        }
        apply_relationship_rules(row, &self.config.relationship_rules, row_id);
        apply_categorical_rules(row, &self.config.categorical_rules, row_id);
    }

    fn error_row(&self, original: &RowRecord, sentinel: &str) -> RowRecord {
        let mut row = self.preserved_columns(original);
        for column in &self.config.columns_to_code {
            row.insert(column.clone(), Value::String(sentinel.to_string()));
        }
        row
    }

    /// Single-row protocol, also used as the per-row fallback after a
    /// batch exhausts its retries.
    pub fn process_single_row(&mut self, row: &RowRecord) -> RowRecord {
        let prompt = self.single_prompt(row);
        let rid = row_id(row).unwrap_or(0);

        for attempt in 1..=self.retries {
            match self.call_model(&prompt) {
                Ok(content) => match parse_model_json(&content) {
                    Some(values) if !values.is_empty() => return self.extract_row(row, &values[0], rid),
                    _ => {
                        tracing::warn!(row_id = rid, attempt, "could not parse model response as JSON");
                    }
                },
                Err(err) => {
                    tracing::warn!(row_id = rid, attempt, error = %err, "single-row attempt failed");
                }
            }
            if attempt < self.retries {
                std::thread::sleep(self.delay * attempt);
            }
        }
        tracing::error!(row_id = rid, "all retries failed for row");
        self.error_row(row, ERROR_ALL_RETRIES_FAILED)
    }

    /// Batch protocol: one `ModelClient` call covering every row in
    /// `rows`. Falls back to per-row processing (never back into batch
    /// mode) if every attempt fails.
    pub fn process_batch(&mut self, rows: &[RowRecord]) -> Vec<RowRecord> {
        let batch_size = rows.len();
        let prompt = self.batch_prompt(rows);

        for attempt in 1..=self.retries {
            match self.call_model(&prompt) {
                Ok(content) => {
                    if let Some(mut values) = parse_model_json(&content) {
                        reconcile_length(&mut values, batch_size);
                        return rows
                            .iter()
                            .zip(values.iter())
                            .map(|(row, value)| {
                                let rid = row_id(row).unwrap_or(0);
                                if value.as_str() == Some(ERROR_BATCH_MISMATCH) {
                                    return self.error_row(row, ERROR_BATCH_MISMATCH);
                                }
                                self.extract_row(row, value, rid)
                            })
                            .collect();
                    }
                    tracing::warn!(attempt, batch_size, "could not parse batch response as JSON");
                }
                Err(err) => {
                    tracing::warn!(attempt, batch_size, error = %err, "batch attempt failed");
                }
            }
            if attempt < self.retries {
                std::thread::sleep(self.delay * attempt);
            }
        }

        tracing::error!(batch_size, "batch failed all retries, falling back to per-row processing");
        rows.iter().map(|row| self.process_single_row(row)).collect()
    }

    /// Drives the full dataframe loop: batching, checkpointing, progress
    /// reporting, and cooperative pause (spec.md §4.2, §4.3 step 5).
    #[allow(clippy::too_many_arguments)]
    pub fn process_dataframe(
        &mut self,
        rows: &[RowRecord],
        batch_size: usize,
        serializer: &Serializer,
        job_id: &str,
        metadata: &RowRecord,
        mut pause_probe: impl FnMut() -> bool,
        mut on_progress: impl FnMut(ProgressUpdate),
    ) -> Result<(Vec<RowRecord>, u64), ProcessorError> {
        let total_rows = rows.len() as u64;
        let start = Instant::now();
        let mut results: Vec<RowRecord> = Vec::with_capacity(rows.len());
        let mut api_call_count: u64 = 0;
        let mut last_checkpoint_row: usize = 0;
        let mut checkpoint_counter: u32 = 0;
        let update_frequency = if total_rows > 0 { std::cmp::max(batch_size as u64, total_rows / 20).max(1) } else { 1 };

        for chunk in rows.chunks(batch_size.max(1)) {
            while pause_probe() {
                std::thread::sleep(Duration::from_secs(1));
            }

            let batch_results = if batch_size <= 1 {
                vec![self.process_single_row(&chunk[0])]
            } else {
                self.process_batch(chunk)
            };
            results.extend(batch_results);
            api_call_count += 1;

            let current_row_num = results.len() as u64;
            let metrics = self.build_metrics(current_row_num, start.elapsed());

            if serializer.should_checkpoint(current_row_num, total_rows) {
                let new_count = current_row_num as usize - last_checkpoint_row;
                if new_count > 0 {
                    let checkpoint_rows = &results[results.len() - new_count..];
                    checkpoint_counter += 1;
                    let mut checkpoint_metadata = metadata.clone();
                    checkpoint_metadata.insert("Rows_Per_Sec".to_string(), serde_json::json!(metrics.rows_per_sec));
                    checkpoint_metadata.insert("Tokens_Per_Sec".to_string(), serde_json::json!(metrics.tokens_per_sec));
                    checkpoint_metadata.insert("Avg_Tokens_Per_Row".to_string(), serde_json::json!(metrics.avg_tokens_per_row));
                    checkpoint_metadata.insert("Tokens_Total".to_string(), serde_json::json!(metrics.tokens_total));

                    let path = serializer.save_checkpoint(checkpoint_rows, job_id, checkpoint_counter, &checkpoint_metadata)?;
                    tracing::info!(job_id, checkpoint = checkpoint_counter, path = %path.display(), "checkpoint saved");
                    on_progress(ProgressUpdate { current_row: current_row_num, total_rows, api_calls: api_call_count, metrics: metrics.clone() });
                    last_checkpoint_row = current_row_num as usize;
                }
            }

            if total_rows > 0 && (current_row_num % update_frequency == 0 || current_row_num == total_rows) {
                on_progress(ProgressUpdate { current_row: current_row_num, total_rows, api_calls: api_call_count, metrics });
            }
        }

        Ok((results, api_call_count))
    }
}

/// Prefer whole-string JSON; recover via the largest `[...]` span, then
/// the largest `{...}` span wrapped into a one-element array.
pub fn parse_model_json(content: &str) -> Option<Vec<Value>> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(normalize_to_array(value));
    }
    if let Some(span) = bracket_span(trimmed, '[', ']') {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Some(normalize_to_array(value));
        }
    }
    if let Some(span) = bracket_span(trimmed, '{', '}') {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Some(vec![value]);
        }
    }
    None
}

fn normalize_to_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn bracket_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Always return exactly `batch_size` records: pad the tail with error
/// sentinels, or truncate.
pub fn reconcile_length(values: &mut Vec<Value>, batch_size: usize) {
    while values.len() < batch_size {
        values.push(Value::String(ERROR_BATCH_MISMATCH.to_string()));
    }
    values.truncate(batch_size);
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchforge_common::{ModelClientError, ModelResponse, TokenStats};
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<Result<String, String>>>,
    }

    impl ModelClient for ScriptedClient {
        fn chat(&self, _messages: &[ChatMessage], _json_format: bool) -> Result<ModelResponse, ModelClientError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ModelClientError::RequestFailed("exhausted script".into()));
            }
            match responses.remove(0) {
                Ok(content) => Ok(ModelResponse { content, token_stats: TokenStats::default() }),
                Err(msg) => Err(ModelClientError::RequestFailed(msg)),
            }
        }
    }

    fn config() -> PromptsConfig {
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

    fn row(id: i64, message: &str) -> RowRecord {
        let mut r = RowRecord::new();
        r.insert("RowID".into(), Value::String(id.to_string()));
        r.insert("Message".into(), Value::String(message.to_string()));
        r
    }

    #[test]
    fn parse_model_json_prefers_whole_string() {
        let parsed = parse_model_json(r#"[{"a":1}]"#).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn parse_model_json_recovers_array_span_from_noisy_text() {
        let parsed = parse_model_json("Sure! Here you go: [{\"a\":1},{\"a\":2}] hope that helps").unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn parse_model_json_recovers_single_object_wrapped_as_array() {
        let parsed = parse_model_json("noise {\"a\":1} trailing").unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn parse_model_json_returns_none_when_nothing_parses() {
        assert!(parse_model_json("not json at all").is_none());
    }

    #[test]
    fn reconcile_length_pads_with_sentinels() {
        let mut values = vec![Value::String("a".into()), Value::String("b".into()), Value::String("c".into())];
        reconcile_length(&mut values, 5);
        assert_eq!(values.len(), 5);
        assert_eq!(values[3], Value::String(ERROR_BATCH_MISMATCH.to_string()));
    }

    #[test]
    fn reconcile_length_truncates_excess() {
        let mut values: Vec<Value> = (0..7).map(|i| Value::String(i.to_string())).collect();
        reconcile_length(&mut values, 5);
        assert_eq!(values.len(), 5);
    }

    #[test]
    fn batch_length_recovery_scenario_from_spec() {
        let client = Arc::new(ScriptedClient { responses: Mutex::new(vec![Ok(r#"[{"Sentiment":"Positive"},{"Sentiment":"Negative"},{"Sentiment":"Neutral"}]"#.to_string())]) });
        let mut processor = Processor::new(client, config(), 3, Duration::from_millis(1));
        let rows: Vec<RowRecord> = (1..=5).map(|i| row(i, "hi")).collect();

        let results = processor.process_batch(&rows);
        assert_eq!(results.len(), 5);
        assert_eq!(results[3].get("Sentiment").and_then(|v| v.as_str()), Some(ERROR_BATCH_MISMATCH));
    }

    #[test]
    fn batch_falls_back_to_per_row_after_exhausting_retries() {
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(vec![
                Err("down".into()),
                Err("down".into()),
                Ok(r#"{"Sentiment":"Positive"}"#.to_string()),
                Ok(r#"{"Sentiment":"Negative"}"#.to_string()),
            ]),
        });
        let mut processor = Processor::new(client, config(), 2, Duration::from_millis(1));
        let rows = vec![row(1, "a"), row(2, "b")];

        let results = processor.process_batch(&rows);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].get("Sentiment").and_then(|v| v.as_str()), Some("Positive"));
    }

    #[test]
    fn process_dataframe_checkpoints_at_configured_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = Serializer::new(dir.path().to_path_buf(), 2, false).unwrap();
        let responses: Vec<Result<String, String>> = (0..2)
            .map(|_| Ok(r#"[{"Sentiment":"Positive"},{"Sentiment":"Negative"}]"#.to_string()))
            .collect();
        let client = Arc::new(ScriptedClient { responses: Mutex::new(responses) });
        let mut processor = Processor::new(client, config(), 3, Duration::from_millis(1));
        let rows: Vec<RowRecord> = (1..=4).map(|i| row(i, "hi")).collect();

        let (results, api_calls) = processor
            .process_dataframe(&rows, 2, &serializer, "job1", &RowRecord::new(), || false, |_| {})
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(api_calls, 2);
        assert_eq!(serializer.list_checkpoints("job1").len(), 2);
    }

    #[test]
    fn not_applicable_short_circuits_to_defaults() {
        let mut cfg = config();
        cfg.not_applicable_defaults.insert("Sentiment".into(), Value::String("-".into()));
        let client = Arc::new(ScriptedClient { responses: Mutex::new(vec![Ok(r#"{"Sentiment":"NOT_APPLICABLE"}"#.to_string())]) });
        let mut processor = Processor::new(client, cfg, 3, Duration::from_millis(1));

        let result = processor.process_single_row(&row(1, "n/a"));
        assert_eq!(result.get("Sentiment").and_then(|v| v.as_str()), Some("-"));
    }
}
