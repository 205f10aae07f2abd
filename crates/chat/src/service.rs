//! One chat turn: retrieve, prompt, generate, remember.

use std::sync::Arc;

use devbot_common::{DevbotError, Result};
use devbot_llm::{build_llm_client, LlmClient};
use devbot_memory::{
    build_embedder, Embedder, InMemoryStore, PostgresStore, RetrievalService, SemanticStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{Backend, DevbotConfig, HistoryConfig, StoreConfig};
use crate::history::{HistoryRecord, HistoryStore, InMemoryHistoryStore, PostgresHistoryStore};
use crate::prompt::build_prompt;

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub question: String,
    /// Model output, or an inline `[LLM Error ..]` / `[Connection Error] ..`
    pub answer: String,
    /// Context handed to the model, in prompt order
    pub context: Vec<String>,
}

/// Wires retrieval, the model and chat history together.
#[derive(Clone)]
pub struct ChatService {
    retrieval: RetrievalService,
    llm: Arc<dyn LlmClient>,
    history: Arc<dyn HistoryStore>,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        retrieval: RetrievalService,
        llm: Arc<dyn LlmClient>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            retrieval,
            llm,
            history,
            history_limit: HistoryConfig::default().default_limit,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Build every backend named in `config`.
    pub async fn from_config(config: &DevbotConfig) -> anyhow::Result<Self> {
        let embedder = build_embedder(&config.retrieval)?;
        let store = build_store(&config.store, embedder.clone()).await?;
        let history = build_history(&config.history).await?;
        let llm = build_llm_client(&config.llm)?;

        info!(
            model = %llm.model_name(),
            embedder = %embedder.model_name(),
            store = ?config.store.backend,
            history = ?config.history.backend,
            "Chat service ready"
        );

        let retrieval = RetrievalService::new(store, embedder, config.retrieval.clone());
        Ok(Self::new(retrieval, llm, history).with_history_limit(config.history.default_limit))
    }

    pub fn retrieval(&self) -> &RetrievalService {
        &self.retrieval
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Answer `question` for `user`.
    ///
    /// Never fails: retrieval problems give an empty context, model problems
    /// give an error string as the answer, and memory or history write
    /// problems are logged. The answer is written to memory even when it
    /// is an error string.
    #[instrument(skip(self, question, active_collections), fields(active = active_collections.len()))]
    pub async fn chat(&self, user: &str, question: &str, active_collections: &[String]) -> ChatTurn {
        let context = self
            .retrieval
            .retrieve_context(question, active_collections)
            .await;
        debug!(chunks = context.len(), "Context retrieved");

        let prompt = build_prompt(&context, question);
        let raw_answer = self.llm.answer(&prompt).await;

        self.retrieval.log_to_memory(question, &raw_answer).await;

        let answer = raw_answer.trim().to_string();
        if let Err(e) = self
            .history
            .append(&HistoryRecord::new(user, question, answer.as_str()))
            .await
        {
            warn!(error = %e, "Failed to append chat history");
        }

        ChatTurn {
            user: user.to_string(),
            question: question.to_string(),
            answer,
            context,
        }
    }

    /// Recent exchanges for `user`, oldest first.
    pub async fn recent_history(
        &self,
        user: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>> {
        self.history
            .recent(user, limit.unwrap_or(self.history_limit))
            .await
    }
}

/// Open the configured semantic store.
pub async fn build_store(
    config: &StoreConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn SemanticStore>> {
    match config.backend {
        Backend::Memory => Ok(Arc::new(InMemoryStore::new(embedder))),
        Backend::Postgres => {
            let url = config.resolve_database_url().ok_or_else(|| {
                DevbotError::Config(
                    "store backend 'postgres' needs store.database_url or DATABASE_URL".into(),
                )
            })?;
            let store = PostgresStore::connect(&url, config.max_connections, embedder).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Open the configured history store.
pub async fn build_history(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>> {
    match config.backend {
        Backend::Memory => Ok(Arc::new(InMemoryHistoryStore::new())),
        Backend::Postgres => {
            let url = config.resolve_database_url().ok_or_else(|| {
                DevbotError::Config(
                    "history backend 'postgres' needs history.database_url or DATABASE_URL".into(),
                )
            })?;
            let store = PostgresHistoryStore::connect(&url, config.max_connections).await?;
            Ok(Arc::new(store))
        }
    }
}
