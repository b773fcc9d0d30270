use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializerError {
    #[error("failed to read checkpoint part {path}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write checkpoint part {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error on {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("checkpoint error")]
    Serializer(#[from] SerializerError),

    #[error("model client error")]
    Model(#[from] batchforge_common::ModelClientError),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to load input file {path}")]
    InputLoadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error reading {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("prompts config error at {path}")]
    PromptsConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Status(#[from] batchforge_common::WorkerStatusError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
