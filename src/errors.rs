//! Typed error hierarchy for the orchestrator binary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to read config file at {path}: {source}")]
    ConfigReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}")]
    ConfigParseFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("no run found with id {0}")]
    RunNotFound(String),

    #[error(transparent)]
    Manifest(#[from] batchforge_common::ManifestError),

    #[error(transparent)]
    WorkerStatus(#[from] batchforge_common::WorkerStatusError),

    #[error(transparent)]
    Common(#[from] batchforge_common::CommonError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_error_converts_via_from() {
        let inner = batchforge_common::ManifestError::ParseFailed {
            path: PathBuf::from("run_manifest.json"),
            source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        };
        let err: OrchestratorError = inner.into();
        assert!(err.to_string().contains("manifest") || err.to_string().contains("parse"));
    }
}
