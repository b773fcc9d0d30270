//! Synchronous HTTP `ModelClient` for an OpenAI-chat-completions-shaped
//! inference endpoint. The LLM backend itself is out of scope (spec.md
//! §1); this is just the transport the Processor calls through.

use anyhow::Context;
use batchforge_common::{ChatMessage, ModelClient, ModelClientError, ModelResponse, TokenStats};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct HttpModelClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

pub struct HttpModelClient {
    client: reqwest::blocking::Client,
    config: HttpModelClientConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

impl HttpModelClient {
    pub fn new(config: HttpModelClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client for model inference endpoint")?;
        Ok(Self { client, config })
    }
}

impl ModelClient for HttpModelClient {
    fn chat(&self, messages: &[ChatMessage], json_format: bool) -> Result<ModelResponse, ModelClientError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            response_format: json_format.then_some(ResponseFormat { kind: "json_object" }),
        };

        let started = Instant::now();
        let mut request = self.client.post(format!("{}/chat/completions", self.config.base_url)).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .send()
            .map_err(|e| ModelClientError::RequestFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| ModelClientError::RequestFailed(e.to_string()))?;

        let parsed: ChatResponse = response.json().map_err(|e| ModelClientError::RequestFailed(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelClientError::RequestFailed("model response had no choices".to_string()))?;

        let usage = parsed.usage.unwrap_or_default();
        Ok(ModelResponse {
            content: choice.message.content,
            token_stats: TokenStats {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                total_duration_ns: Some(started.elapsed().as_nanos() as u64),
            },
        })
    }
}
