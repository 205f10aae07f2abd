//! Retrieval types and configuration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Static fallback corpus.
pub const TUTORIAL_COLLECTION: &str = "tutorial";

/// Continuously growing log of past question/answer pairs.
pub const MEMORY_COLLECTION: &str = "memory";

/// Prefix shared by every per-upload document collection.
pub const DOCUMENT_COLLECTION_PREFIX: &str = "document-";

/// A unit of retrieved text together with the collection it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text
    pub text: String,

    /// Name of the collection the chunk was retrieved from
    pub source: String,

    /// Similarity to the query, when the store reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// One past question/answer pair, addressed by the hash of its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// `memory-<sha256 hex>` of [`MemoryEntry::text`]
    pub id: String,

    /// Canonical `Q: ...\nA: ...` text
    pub text: String,
}

impl MemoryEntry {
    /// Build the canonical entry for an exchange.
    ///
    /// Returns `None` when either side is empty after trimming.
    pub fn from_exchange(question: &str, answer: &str) -> Option<Self> {
        let question = question.trim();
        let answer = answer.trim();
        if question.is_empty() || answer.is_empty() {
            return None;
        }

        let text = format!("Q: {question}\nA: {answer}");
        Some(Self {
            id: memory_entry_id(&text),
            text,
        })
    }
}

/// Content identifier for a memory entry.
///
/// Identical text always yields the identical id, across runs.
pub fn memory_entry_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("memory-{:x}", hasher.finalize())
}

/// Which embedding function backs the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Neural sentence embeddings via fastembed
    #[default]
    Fastembed,
    /// Deterministic hashed term frequencies, no model download
    Hashing,
}

/// Configuration for retrieval, memory and ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Nearest chunks requested from each collection
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Name of the long-term memory collection
    #[serde(default = "default_memory_collection")]
    pub memory_collection: String,

    /// Name of the fallback tutorial collection
    #[serde(default = "default_tutorial_collection")]
    pub tutorial_collection: String,

    /// Embedding backend
    #[serde(default)]
    pub embedding_provider: EmbeddingProvider,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Maximum characters per ingested chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_memory_collection() -> String {
    MEMORY_COLLECTION.into()
}

fn default_tutorial_collection() -> String {
    TUTORIAL_COLLECTION.into()
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".into()
}

fn default_embedding_dim() -> usize {
    384 // MiniLM dimension
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            memory_collection: default_memory_collection(),
            tutorial_collection: default_tutorial_collection(),
            embedding_provider: EmbeddingProvider::default(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}
