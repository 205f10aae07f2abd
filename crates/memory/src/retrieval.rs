//! Context retrieval across uploaded documents, memory and the tutorial.
//!
//! Sources are concatenated in priority order and never re-ranked against
//! each other:
//!
//! 1. active document collections, most recently uploaded first
//! 2. the memory collection, always
//! 3. the tutorial collection, only when 1 and 2 produced nothing
//!
//! `top_k` caps each collection separately, so a turn with several sources
//! can receive more than `top_k` chunks in total.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{SemanticStore, StoreError};
use crate::types::Chunk;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("search in collection '{collection}' failed: {source}")]
    Search {
        collection: String,
        #[source]
        source: StoreError,
    },
}

/// Builds the ordered context for a query.
#[derive(Clone)]
pub struct ContextRetriever {
    store: Arc<dyn SemanticStore>,
    memory_collection: String,
    tutorial_collection: String,
}

impl ContextRetriever {
    pub fn new(
        store: Arc<dyn SemanticStore>,
        memory_collection: impl Into<String>,
        tutorial_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            memory_collection: memory_collection.into(),
            tutorial_collection: tutorial_collection.into(),
        }
    }

    /// Retrieve context, surfacing the first search failure.
    pub async fn try_retrieve(
        &self,
        query: &str,
        top_k: usize,
        active_collections: &[String],
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let mut chunks = Vec::new();

        for collection in active_collections.iter().rev() {
            chunks.extend(self.search(collection, query, top_k).await?);
        }

        chunks.extend(self.search(&self.memory_collection, query, top_k).await?);

        if chunks.is_empty() {
            debug!("No document or memory context, falling back to tutorial");
            chunks.extend(self.search(&self.tutorial_collection, query, top_k).await?);
        }

        debug!(
            chunks = chunks.len(),
            active = active_collections.len(),
            "Retrieved context"
        );
        Ok(chunks)
    }

    /// Retrieve context texts; any failure yields an empty context.
    pub async fn retrieve_context(
        &self,
        query: &str,
        top_k: usize,
        active_collections: &[String],
    ) -> Vec<String> {
        match self.try_retrieve(query, top_k, active_collections).await {
            Ok(chunks) => chunks.into_iter().map(|c| c.text).collect(),
            Err(e) => {
                warn!(error = %e, "Context retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let wrap = |source: StoreError| RetrievalError::Search {
            collection: collection.to_string(),
            source,
        };

        let handle = self
            .store
            .get_or_create_collection(collection)
            .await
            .map_err(wrap)?;
        let hits = handle.query(query, top_k).await.map_err(wrap)?;

        Ok(hits
            .into_iter()
            .map(|hit| Chunk::new(hit.text, collection).with_score(hit.score))
            .collect())
    }
}
