//! Shared entry point for retrieval, memory writes and ingestion.

use std::sync::Arc;

use tracing::info;

use crate::embedding::{Embedder, EmbeddingError, EmbeddingService};
use crate::hashing::HashingEmbedder;
use crate::ingest::Ingestor;
use crate::retrieval::ContextRetriever;
use crate::store::SemanticStore;
use crate::types::{EmbeddingProvider, MemoryConfig};
use crate::writer::MemoryWriter;

/// Build the embedder selected by `config`.
///
/// The fastembed model is not loaded here; it initializes on first use.
pub fn build_embedder(config: &MemoryConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.embedding_provider {
        EmbeddingProvider::Fastembed => {
            info!(model = %config.embedding_model, "Using fastembed embeddings");
            let service =
                EmbeddingService::from_config(&config.embedding_model, config.embedding_dim)?;
            Ok(Arc::new(service))
        }
        EmbeddingProvider::Hashing => {
            info!(dim = config.embedding_dim, "Using hashing embeddings");
            Ok(Arc::new(HashingEmbedder::new(config.embedding_dim)))
        }
    }
}

/// Owns the store handle and retrieval settings.
///
/// Cheap to clone; every component it hands out shares the same store.
#[derive(Clone)]
pub struct RetrievalService {
    store: Arc<dyn SemanticStore>,
    embedder: Arc<dyn Embedder>,
    config: MemoryConfig,
}

impl RetrievalService {
    pub fn new(
        store: Arc<dyn SemanticStore>,
        embedder: Arc<dyn Embedder>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn store(&self) -> Arc<dyn SemanticStore> {
        self.store.clone()
    }

    pub fn retriever(&self) -> ContextRetriever {
        ContextRetriever::new(
            self.store.clone(),
            self.config.memory_collection.clone(),
            self.config.tutorial_collection.clone(),
        )
    }

    pub fn writer(&self) -> MemoryWriter {
        MemoryWriter::new(
            self.store.clone(),
            self.embedder.clone(),
            self.config.memory_collection.clone(),
        )
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.store.clone(), self.embedder.clone(), &self.config)
    }

    /// Context texts for `query` using the configured `top_k`.
    pub async fn retrieve_context(&self, query: &str, active_collections: &[String]) -> Vec<String> {
        self.retriever()
            .retrieve_context(query, self.config.top_k, active_collections)
            .await
    }

    pub async fn log_to_memory(&self, question: &str, answer: &str) {
        self.writer().log_to_memory(question, answer).await
    }
}
