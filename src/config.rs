//! Config loading: reads the job config file (YAML or JSON, by extension)
//! named on the command line into a `batchforge_common::JobConfig`.

use crate::errors::OrchestratorError;
use anyhow::Context;
use batchforge_common::JobConfig;
use std::path::Path;

pub fn load_job_config(path: &Path) -> Result<JobConfig, OrchestratorError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| OrchestratorError::ConfigReadFailed { path: path.to_path_buf(), source })?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    if is_json {
        JobConfig::from_json_str(&content)
            .context("failed to parse JSON config")
            .map_err(|source| OrchestratorError::ConfigParseFailed { path: path.to_path_buf(), source })
    } else {
        JobConfig::from_yaml_str(&content)
            .context("failed to parse YAML config")
            .map_err(|source| OrchestratorError::ConfigParseFailed { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
project: { name: demo, version: v1 }
model: { name: llama3 }
parallelization: { enabled: true, workers: 2, split_strategy: auto }
input_queue:
  - { path: in.csv, label: reviews }
output: { directory: out/, checkpoints: { directory: ckpt/ } }
monitoring: { status_dir: status/, logs_dir: logs/ }
merge: {}
error_handling: {}
"#;

    #[test]
    fn loads_yaml_config_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(&path, YAML).unwrap();

        let config = load_job_config(&path).unwrap();
        assert_eq!(config.project.name, "demo");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_job_config(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigReadFailed { .. }));
    }
}
