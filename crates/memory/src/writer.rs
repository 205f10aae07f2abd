//! Writes finished exchanges back into long-term memory.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::store::{NewDocument, SemanticStore, StoreResult};
use crate::types::MemoryEntry;

/// `source` metadata on every remembered exchange.
pub const MEMORY_SOURCE: &str = "chat";

/// What a memory write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryWrite {
    /// Question or answer was blank
    Skipped,
    /// A new entry was inserted
    Stored { id: String },
    /// The identical exchange was already remembered
    AlreadyPresent { id: String },
}

/// Persists question/answer pairs as content-addressed memory entries.
#[derive(Clone)]
pub struct MemoryWriter {
    store: Arc<dyn SemanticStore>,
    embedder: Arc<dyn Embedder>,
    memory_collection: String,
}

impl MemoryWriter {
    pub fn new(
        store: Arc<dyn SemanticStore>,
        embedder: Arc<dyn Embedder>,
        memory_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            memory_collection: memory_collection.into(),
        }
    }

    /// Write an exchange, reporting failures to the caller.
    pub async fn try_log(&self, question: &str, answer: &str) -> StoreResult<MemoryWrite> {
        let Some(entry) = MemoryEntry::from_exchange(question, answer) else {
            return Ok(MemoryWrite::Skipped);
        };

        let embedding = self.embedder.embed(&entry.text).await?;
        let collection = self
            .store
            .get_or_create_collection(&self.memory_collection)
            .await?;

        let document = NewDocument::new(entry.id.clone(), entry.text)
            .with_metadata(json!({ "source": MEMORY_SOURCE }))
            .with_embedding(embedding);

        let inserted = collection.add(vec![document]).await?;
        if inserted == 0 {
            debug!(id = %entry.id, "Exchange already in memory");
            Ok(MemoryWrite::AlreadyPresent { id: entry.id })
        } else {
            debug!(id = %entry.id, "Stored exchange in memory");
            Ok(MemoryWrite::Stored { id: entry.id })
        }
    }

    /// Write an exchange; failures are logged and dropped.
    pub async fn log_to_memory(&self, question: &str, answer: &str) {
        if let Err(e) = self.try_log(question, answer).await {
            warn!(error = %e, "Failed to log exchange to memory");
        }
    }
}
