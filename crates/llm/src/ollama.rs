use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{LlmClient, LlmError, LlmResponse, TokenUsage};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Client for Ollama's non-streaming `/api/generate` endpoint.
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, model: String) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            temperature: None,
            max_tokens: None,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Abort requests that take longer than `timeout`. Unbounded by default.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(self)
    }

    fn build_request_body<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        let options = if self.temperature.is_some() || self.max_tokens.is_some() {
            Some(GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            })
        } else {
            None
        };
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(url = %url, model = %self.model, prompt_len = prompt.len(), "Calling Ollama");

        let response = self
            .http_client
            .post(&url)
            .json(&self.build_request_body(prompt))
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let usage = match (body.prompt_eval_count, body.eval_count) {
            (Some(prompt_tokens), Some(completion_tokens)) => Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
            }),
            _ => None,
        };

        Ok(LlmResponse {
            content: body.response,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
