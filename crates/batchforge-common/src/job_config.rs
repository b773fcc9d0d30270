//! `JobConfig`: the immutable, typed configuration value consumed by the
//! core (spec.md §3, §6). Produced by config loading / the interactive
//! front-end; this crate only defines its shape.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_delay")]
    pub delay: u64,
    /// Base URL of the OpenAI-chat-completions-shaped inference endpoint
    /// the worker's `HttpModelClient` talks to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> usize {
    15
}
fn default_retries() -> u32 {
    3
}
fn default_delay() -> u64 {
    5
}
fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_model_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_workers")]
    pub workers: u32,
    #[serde(default)]
    pub split_strategy: SplitStrategy,
    #[serde(default)]
    pub manual_ranges: Option<Vec<(i64, i64)>>,
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::Auto
    }
}

fn default_true() -> bool {
    true
}
fn default_workers() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputQueueEntry {
    pub path: PathBuf,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub directory: PathBuf,
    #[serde(default = "default_checkpoint_interval")]
    pub interval: u32,
    /// Keep `CheckpointPart` files after a successful merge instead of
    /// deleting them (spec.md §4.1: deleted only on successful merge and
    /// only if `keep_merged=false`).
    #[serde(default)]
    pub keep_merged: bool,
}

fn default_checkpoint_interval() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    #[serde(default = "default_naming_pattern")]
    pub naming_pattern: String,
    pub checkpoints: CheckpointConfig,
}

fn default_naming_pattern() -> String {
    "{project}_{version}_{label}_{date}".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub status_dir: PathBuf,
    pub logs_dir: PathBuf,
    #[serde(default = "default_dashboard_refresh")]
    pub dashboard_refresh: u64,
}

fn default_dashboard_refresh() -> u64 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeCondition {
    AllSuccess,
    AnySuccess,
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_true")]
    pub auto_merge: bool,
    #[serde(default = "default_merge_condition")]
    pub condition: MergeCondition,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
}

fn default_merge_condition() -> MergeCondition {
    MergeCondition::AllSuccess
}
fn default_sort_by() -> String {
    "RowID".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    #[serde(default = "default_max_worker_retries")]
    pub max_worker_retries: u32,
    #[serde(default = "default_true")]
    pub prompt_on_failure: bool,
    #[serde(default = "default_true")]
    pub save_failed_ranges: bool,
}

fn default_max_worker_retries() -> u32 {
    1
}

fn default_prompts_config() -> PathBuf {
    PathBuf::from("prompts.json")
}

/// Immutable after construction: loaded once from an external config file
/// and never mutated for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub project: ProjectConfig,
    pub model: ModelConfig,
    #[serde(default = "default_prompts_config")]
    pub prompts_config: PathBuf,
    pub parallelization: ParallelizationConfig,
    pub input_queue: Vec<InputQueueEntry>,
    pub output: OutputConfig,
    pub monitoring: MonitoringConfig,
    pub merge: MergeConfig,
    pub error_handling: ErrorHandlingConfig,
}

impl JobConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
project:
  name: bookings
  version: v2
model:
  name: llama3
parallelization:
  enabled: true
  workers: 4
  split_strategy: auto
input_queue:
  - path: input/reviews.csv
    label: reviews
output:
  directory: output/
  checkpoints:
    directory: checkpoints/
monitoring:
  status_dir: status/
  logs_dir: logs/
merge:
  sort_by: RowID
error_handling:
  max_worker_retries: 2
"#;

    #[test]
    fn parses_minimal_yaml_with_defaults_filled_in() {
        let cfg = JobConfig::from_yaml_str(MINIMAL_YAML).unwrap();
        assert_eq!(cfg.project.name, "bookings");
        assert_eq!(cfg.model.batch_size, 15);
        assert_eq!(cfg.model.retries, 3);
        assert_eq!(cfg.output.checkpoints.interval, 50);
        assert_eq!(cfg.merge.condition, MergeCondition::AllSuccess);
        assert_eq!(cfg.error_handling.max_worker_retries, 2);
        assert!(matches!(cfg.parallelization.split_strategy, SplitStrategy::Auto));
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = JobConfig::from_yaml_str(MINIMAL_YAML).unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        let reparsed = JobConfig::from_json_str(&json).unwrap();
        assert_eq!(reparsed.project.name, cfg.project.name);
    }
}
