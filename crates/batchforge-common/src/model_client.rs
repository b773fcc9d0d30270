//! `ModelClient`: the only interface the Processor depends on. The LLM
//! call itself, tokenization, model selection, and prompt construction
//! are all out of scope here (spec.md §1) — this is the seam.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Token/duration figures sourced from the model's response when present;
/// `None` fields simply mean the backing model did not report them.
#[derive(Debug, Clone, Default)]
pub struct TokenStats {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub total_duration_ns: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: String,
    pub token_stats: TokenStats,
}

#[derive(Debug, Error)]
pub enum ModelClientError {
    #[error("model request failed: {0}")]
    RequestFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Synchronous request/response with retry-on-failure left to the caller
/// (the Processor owns the retry policy; spec.md §4.2).
pub trait ModelClient: Send + Sync {
    fn chat(&self, messages: &[ChatMessage], json_format: bool) -> Result<ModelResponse, ModelClientError>;
}
