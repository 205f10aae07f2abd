use std::sync::Arc;
use std::time::Duration;

use devbot_common::{DevbotError, Result};
use serde::{Deserialize, Serialize};

use crate::client::LlmClient;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "DEVBOT_LLM_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `ollama` or `openai`
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    /// Server base URL, without the endpoint path
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-request timeout; requests wait indefinitely when unset
    pub timeout_secs: Option<u64>,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "deepseek-coder:6.7b".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: None,
        }
    }
}

impl LlmConfig {
    /// Configured key, else `DEVBOT_LLM_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let timeout = config.timeout_secs.map(Duration::from_secs);

    let client: Arc<dyn LlmClient> = match config.provider.as_str() {
        "ollama" => {
            let mut client = OllamaClient::new(config.api_url.clone(), config.model.clone())
                .with_sampling(config.temperature, config.max_tokens);
            if let Some(timeout) = timeout {
                client = client.with_timeout(timeout)?;
            }
            Arc::new(client)
        }
        "openai" => {
            let mut client = OpenAiClient::new(
                config.api_url.clone(),
                config.model.clone(),
                config.resolve_api_key(),
            )
            .with_sampling(config.temperature, config.max_tokens);
            if let Some(timeout) = timeout {
                client = client.with_timeout(timeout)?;
            }
            Arc::new(client)
        }
        other => {
            return Err(DevbotError::Config(format!(
                "Unknown LLM provider: {other}"
            )));
        }
    };

    Ok(client)
}
