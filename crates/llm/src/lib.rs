pub mod client;
pub mod config;
pub mod ollama;
pub mod openai;

pub use client::{LlmClient, LlmError, LlmResponse, TokenUsage};
pub use config::{build_llm_client, LlmConfig};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
