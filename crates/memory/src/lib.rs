//! Retrieval-augmented memory for the devbot assistant.
//!
//! Knowledge lives in named collections of a [`SemanticStore`]:
//!
//! - `tutorial`: a static corpus used only when nothing else matches
//! - `memory`: every past question/answer pair, content-addressed so the
//!   same exchange is stored once
//! - `document-<stem>-<hex>`: one per uploaded file, active for the
//!   session that uploaded it
//!
//! ```text
//!   question ──► ContextRetriever ──► documents (newest first)
//!                                 ──► memory
//!                                 ──► tutorial (only if empty so far)
//!
//!   answer   ──► MemoryWriter ──► memory (id = sha256 of "Q: ..\nA: ..")
//! ```
//!
//! Two store backends exist: [`InMemoryStore`] for tests and throwaway
//! sessions, [`PostgresStore`] for persistence.

pub mod embedding;
pub mod hashing;
pub mod ingest;
pub mod postgres;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod types;
pub mod writer;

pub use embedding::{Embedder, EmbeddingError, EmbeddingService};
pub use hashing::HashingEmbedder;
pub use ingest::{IngestReport, Ingestor, TextSplitter};
pub use postgres::PostgresStore;
pub use retrieval::{ContextRetriever, RetrievalError};
pub use service::{build_embedder, RetrievalService};
pub use store::{
    Collection, InMemoryStore, NewDocument, QueryHit, SemanticStore, StoreError, StoreResult,
    StoredDocument,
};
pub use types::{
    Chunk, EmbeddingProvider, MemoryConfig, MemoryEntry, DOCUMENT_COLLECTION_PREFIX,
    MEMORY_COLLECTION, TUTORIAL_COLLECTION,
};
pub use writer::{MemoryWrite, MemoryWriter, MEMORY_SOURCE};
