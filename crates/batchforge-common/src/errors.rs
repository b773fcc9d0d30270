//! Shared error hierarchy, split per subsystem.
//!
//! Mirrors the host CLI's split (one `thiserror` enum per concern, wired
//! together with `#[source]`/`#[from]`) rather than one catch-all error type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("workers must be at least 1")]
    InvalidWorkerCount,

    #[error("range [{start}, {end}] is inverted")]
    InvalidRange { start: i64, end: i64 },

    #[error("manual split strategy requires at least one configured range")]
    NoManualRanges,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum WorkerStatusError {
    #[error("failed to read worker status at {path}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse worker status at {path}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write worker status at {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest at {path}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest at {path}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write manifest at {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no manifest entry for label {0:?}")]
    EntryNotFound(String),
}
