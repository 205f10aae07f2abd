//! Chat orchestration for devbot.
//!
//! A turn retrieves context, renders the prompt, asks the model, writes the
//! exchange to long-term memory and appends it to the chat history.

pub mod config;
pub mod history;
pub mod prompt;
pub mod service;

pub use config::{Backend, DevbotConfig, HistoryConfig, IngestConfig, ServerConfig, StoreConfig};
pub use history::{HistoryRecord, HistoryStore, InMemoryHistoryStore, PostgresHistoryStore};
pub use prompt::{build_prompt, NO_CONTEXT};
pub use service::{build_history, build_store, ChatService, ChatTurn};
