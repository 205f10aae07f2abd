//! Error types for DevBot.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevbotError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DevbotError>;
