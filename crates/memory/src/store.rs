//! Semantic store abstraction and the in-memory implementation.
//!
//! A store hands out named [`Collection`]s. Each collection is an
//! independent similarity index: documents are added under caller-chosen
//! ids and queried by text. Adding an id that already exists leaves the
//! stored document untouched, which is what makes content-addressed writes
//! idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::embedding::{Embedder, EmbeddingError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("semantic store unavailable: {0}")]
    Unavailable(String),

    #[error("collection not found: {0}")]
    CollectionMissing(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for devbot_common::DevbotError {
    fn from(err: StoreError) -> Self {
        devbot_common::DevbotError::Memory(err.to_string())
    }
}

/// A document to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: String,
    pub document: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Precomputed embedding; computed by the collection when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl NewDocument {
    pub fn new(id: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
            metadata: serde_json::Value::Null,
            embedding: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A document as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
}

/// One similarity-search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}

/// A named, independently indexed set of documents.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `top_k` documents nearest to `text`, most similar first.
    async fn query(&self, text: &str, top_k: usize) -> StoreResult<Vec<QueryHit>>;

    /// Insert documents. Ids already present are skipped.
    ///
    /// Returns how many documents were newly inserted.
    async fn add(&self, documents: Vec<NewDocument>) -> StoreResult<usize>;

    /// Documents with the given ids, or every document when `ids` is `None`.
    async fn get(&self, ids: Option<&[String]>) -> StoreResult<Vec<StoredDocument>>;

    async fn count(&self) -> StoreResult<usize>;
}

/// Vector similarity search over named collections.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    async fn get_or_create_collection(&self, name: &str) -> StoreResult<Arc<dyn Collection>>;

    /// Drop a collection and its documents.
    ///
    /// Fails with [`StoreError::CollectionMissing`] when it does not exist.
    async fn delete_collection(&self, name: &str) -> StoreResult<()>;

    async fn list_collections(&self) -> StoreResult<Vec<String>>;
}

/// Cosine similarity; `None` for mismatched, empty or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Rank `(record, embedding)` pairs against a query embedding.
///
/// Ties keep insertion order. Records whose similarity is undefined sort
/// last with a score of zero.
pub(crate) fn rank<'a, I>(query: &[f32], records: I, top_k: usize) -> Vec<QueryHit>
where
    I: IntoIterator<Item = (&'a StoredDocument, &'a [f32])>,
{
    let mut hits: Vec<QueryHit> = records
        .into_iter()
        .map(|(doc, embedding)| QueryHit {
            id: doc.id.clone(),
            text: doc.document.clone(),
            metadata: doc.metadata.clone(),
            score: cosine_similarity(query, embedding).unwrap_or(0.0),
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_k);
    hits
}

/// Fill in missing embeddings and validate their dimension.
pub(crate) async fn prepare_embeddings(
    embedder: &dyn Embedder,
    documents: &mut [NewDocument],
) -> StoreResult<()> {
    let missing: Vec<usize> = documents
        .iter()
        .enumerate()
        .filter(|(_, d)| d.embedding.is_none())
        .map(|(i, _)| i)
        .collect();

    if !missing.is_empty() {
        let texts: Vec<String> = missing
            .iter()
            .map(|&i| documents[i].document.clone())
            .collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(StoreError::Backend(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                texts.len()
            )));
        }
        for (i, vector) in missing.into_iter().zip(vectors) {
            documents[i].embedding = Some(vector);
        }
    }

    let dim = embedder.dimension();
    for doc in documents.iter() {
        if doc.id.trim().is_empty() {
            return Err(StoreError::InvalidInput("document id must not be empty".into()));
        }
        let len = doc.embedding.as_ref().map(|e| e.len()).unwrap_or(0);
        if len != dim {
            return Err(StoreError::InvalidInput(format!(
                "document '{}' has a {}-dim embedding, expected {}",
                doc.id, len, dim
            )));
        }
    }
    Ok(())
}

#[derive(Default)]
struct Records {
    docs: Vec<(StoredDocument, Vec<f32>)>,
    index: HashMap<String, usize>,
}

/// A collection living entirely in process memory.
pub struct InMemoryCollection {
    name: String,
    embedder: Arc<dyn Embedder>,
    records: RwLock<Records>,
}

impl InMemoryCollection {
    fn new(name: &str, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            name: name.to_string(),
            embedder,
            records: RwLock::new(Records::default()),
        }
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, text: &str, top_k: usize) -> StoreResult<Vec<QueryHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(text).await?;
        let records = self.records.read().await;
        let hits = rank(
            &query,
            records.docs.iter().map(|(doc, emb)| (doc, emb.as_slice())),
            top_k,
        );
        debug!(collection = %self.name, hits = hits.len(), "Queried collection");
        Ok(hits)
    }

    async fn add(&self, mut documents: Vec<NewDocument>) -> StoreResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        prepare_embeddings(self.embedder.as_ref(), &mut documents).await?;

        let mut records = self.records.write().await;
        let mut inserted = 0;
        for doc in documents {
            if records.index.contains_key(&doc.id) {
                debug!(collection = %self.name, id = %doc.id, "Document already present");
                continue;
            }
            let embedding = doc.embedding.unwrap_or_default();
            let position = records.docs.len();
            records.index.insert(doc.id.clone(), position);
            records.docs.push((
                StoredDocument {
                    id: doc.id,
                    document: doc.document,
                    metadata: doc.metadata,
                },
                embedding,
            ));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn get(&self, ids: Option<&[String]>) -> StoreResult<Vec<StoredDocument>> {
        let records = self.records.read().await;
        let docs = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| records.index.get(id))
                .map(|&i| records.docs[i].0.clone())
                .collect(),
            None => records.docs.iter().map(|(doc, _)| doc.clone()).collect(),
        };
        Ok(docs)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().await.docs.len())
    }
}

/// Ephemeral store; nothing survives the process.
pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, Arc<InMemoryCollection>>>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SemanticStore for InMemoryStore {
    async fn get_or_create_collection(&self, name: &str) -> StoreResult<Arc<dyn Collection>> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidInput("collection name must not be empty".into()));
        }
        if let Some(existing) = self.collections.read().await.get(name) {
            return Ok(existing.clone());
        }
        let mut collections = self.collections.write().await;
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryCollection::new(name, self.embedder.clone())))
            .clone();
        Ok(collection)
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        match self.collections.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::CollectionMissing(name.to_string())),
        }
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashingEmbedder;
    use serde_json::json;

    fn store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(HashingEmbedder::new(128)))
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
    }

    #[tokio::test]
    async fn get_or_create_returns_same_collection() {
        let store = store();
        let a = store.get_or_create_collection("docs").await.unwrap();
        a.add(vec![NewDocument::new("1", "hello world")]).await.unwrap();
        let b = store.get_or_create_collection("docs").await.unwrap();
        assert_eq!(b.count().await.unwrap(), 1);
        assert_eq!(store.list_collections().await.unwrap(), vec!["docs"]);
    }

    #[tokio::test]
    async fn add_skips_existing_ids() {
        let store = store();
        let c = store.get_or_create_collection("memory").await.unwrap();
        assert_eq!(c.add(vec![NewDocument::new("x", "first")]).await.unwrap(), 1);
        assert_eq!(c.add(vec![NewDocument::new("x", "second")]).await.unwrap(), 0);

        let docs = c.get(Some(&["x".to_string()])).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document, "first");
    }

    #[tokio::test]
    async fn query_orders_by_similarity_and_caps() {
        let store = store();
        let c = store.get_or_create_collection("tutorial").await.unwrap();
        c.add(vec![
            NewDocument::new("a", "Dictionaries map keys to values."),
            NewDocument::new("b", "Use open() to open a file in Python.")
                .with_metadata(json!({"source": "tutorial"})),
            NewDocument::new("c", "Lists are ordered sequences."),
        ])
        .await
        .unwrap();

        let hits = c.query("how do I open a file", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[0].metadata["source"], "tutorial");
        assert!(hits[0].score >= hits[1].score);

        assert!(c.query("anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_wrong_dimension_embedding() {
        let store = store();
        let c = store.get_or_create_collection("docs").await.unwrap();
        let err = c
            .add(vec![NewDocument::new("1", "text").with_embedding(vec![1.0; 3])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        assert_eq!(c.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_missing_collection_errors() {
        let store = store();
        assert!(matches!(
            store.delete_collection("nope").await,
            Err(StoreError::CollectionMissing(_))
        ));
        store.get_or_create_collection("tutorial").await.unwrap();
        store.delete_collection("tutorial").await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_without_ids_returns_all_in_insertion_order() {
        let store = store();
        let c = store.get_or_create_collection("docs").await.unwrap();
        c.add(vec![NewDocument::new("2", "two"), NewDocument::new("1", "one")])
            .await
            .unwrap();
        let ids: Vec<String> = c.get(None).await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }
}
