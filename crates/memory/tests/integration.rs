//! End-to-end tests for retrieval, memory writes and ingestion.
//!
//! Everything runs against the in-memory store with hashing embeddings, so
//! no model download or database is needed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use devbot_common::DevbotError;
use devbot_memory::{
    Collection, ContextRetriever, Embedder, EmbeddingProvider, HashingEmbedder, InMemoryStore,
    MemoryConfig, NewDocument, QueryHit, RetrievalError, RetrievalService, SemanticStore,
    StoreError, StoreResult, StoredDocument,
};
use serde_json::json;
use tempfile::TempDir;

fn config() -> MemoryConfig {
    MemoryConfig {
        embedding_provider: EmbeddingProvider::Hashing,
        embedding_dim: 128,
        ..Default::default()
    }
}

fn service() -> RetrievalService {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
    let store = Arc::new(InMemoryStore::new(embedder.clone()));
    RetrievalService::new(store, embedder, config())
}

async fn seed(store: &dyn SemanticStore, collection: &str, texts: &[&str]) {
    let handle = store.get_or_create_collection(collection).await.unwrap();
    let docs = texts
        .iter()
        .enumerate()
        .map(|(i, t)| NewDocument::new(format!("{collection}-{i}"), *t))
        .collect();
    handle.add(docs).await.unwrap();
}

/// Wraps a store and records which collections were searched, in order.
struct RecordingStore {
    inner: InMemoryStore,
    queried: Arc<Mutex<Vec<String>>>,
}

struct RecordingCollection {
    inner: Arc<dyn Collection>,
    queried: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Collection for RecordingCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn query(&self, text: &str, top_k: usize) -> StoreResult<Vec<QueryHit>> {
        self.queried.lock().unwrap().push(self.inner.name().to_string());
        self.inner.query(text, top_k).await
    }

    async fn add(&self, documents: Vec<NewDocument>) -> StoreResult<usize> {
        self.inner.add(documents).await
    }

    async fn get(&self, ids: Option<&[String]>) -> StoreResult<Vec<StoredDocument>> {
        self.inner.get(ids).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }
}

#[async_trait]
impl SemanticStore for RecordingStore {
    async fn get_or_create_collection(&self, name: &str) -> StoreResult<Arc<dyn Collection>> {
        let inner = self.inner.get_or_create_collection(name).await?;
        Ok(Arc::new(RecordingCollection {
            inner,
            queried: self.queried.clone(),
        }))
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        self.inner.delete_collection(name).await
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.inner.list_collections().await
    }
}

fn recording_store() -> (Arc<RecordingStore>, Arc<Mutex<Vec<String>>>) {
    let queried = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(RecordingStore {
        inner: InMemoryStore::new(Arc::new(HashingEmbedder::new(128))),
        queried: queried.clone(),
    });
    (store, queried)
}

/// A store whose backend is down.
struct UnavailableStore;

#[async_trait]
impl SemanticStore for UnavailableStore {
    async fn get_or_create_collection(&self, _name: &str) -> StoreResult<Arc<dyn Collection>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete_collection(&self, _name: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn documents_searched_newest_first_then_memory() {
    let (store, queried) = recording_store();
    seed(store.as_ref(), "document-a-000001", &["alpha notes on lists"]).await;
    seed(store.as_ref(), "document-b-000002", &["beta notes on lists"]).await;
    seed(store.as_ref(), "memory", &["Q: lists?\nA: ordered"]).await;
    seed(store.as_ref(), "tutorial", &["tutorial on lists"]).await;

    let retriever = ContextRetriever::new(store.clone(), "memory", "tutorial");
    let active = vec!["document-a-000001".to_string(), "document-b-000002".to_string()];
    let chunks = retriever.try_retrieve("lists", 5, &active).await.unwrap();

    assert_eq!(
        *queried.lock().unwrap(),
        vec!["document-b-000002", "document-a-000001", "memory"]
    );
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["beta notes on lists", "alpha notes on lists", "Q: lists?\nA: ordered"]
    );
    assert_eq!(chunks[0].source, "document-b-000002");
}

#[tokio::test]
async fn memory_hits_suppress_tutorial() {
    let (store, queried) = recording_store();
    seed(store.as_ref(), "memory", &["Q: what is a dict?\nA: a mapping"]).await;
    seed(store.as_ref(), "tutorial", &["Dictionaries map keys to values."]).await;

    let retriever = ContextRetriever::new(store.clone(), "memory", "tutorial");
    let chunks = retriever.try_retrieve("dict", 5, &[]).await.unwrap();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source, "memory");
    assert!(!queried.lock().unwrap().contains(&"tutorial".to_string()));
}

#[tokio::test]
async fn tutorial_is_fallback_when_nothing_else_matches() {
    let svc = service();
    seed(
        svc.store().as_ref(),
        "tutorial",
        &["Use open() to open a file in Python.", "Lists are ordered."],
    )
    .await;

    let context = svc.retrieve_context("how do I open a file", &[]).await;
    assert_eq!(context.len(), 2);
    assert_eq!(context[0], "Use open() to open a file in Python.");
}

#[tokio::test]
async fn top_k_caps_each_collection_separately() {
    let (store, _) = recording_store();
    seed(store.as_ref(), "document-x-aaaaaa", &["one", "two", "three"]).await;
    seed(store.as_ref(), "memory", &["four", "five", "six"]).await;

    let retriever = ContextRetriever::new(store, "memory", "tutorial");
    let active = vec!["document-x-aaaaaa".to_string()];
    let chunks = retriever.try_retrieve("number", 2, &active).await.unwrap();

    assert_eq!(chunks.len(), 4);
    assert!(chunks[..2].iter().all(|c| c.source == "document-x-aaaaaa"));
    assert!(chunks[2..].iter().all(|c| c.source == "memory"));
}

#[tokio::test]
async fn empty_store_yields_empty_context() {
    let svc = service();
    assert!(svc.retrieve_context("anything", &[]).await.is_empty());
}

#[tokio::test]
async fn unavailable_store_degrades_to_empty_context() {
    let retriever = ContextRetriever::new(Arc::new(UnavailableStore), "memory", "tutorial");

    let err = retriever.try_retrieve("q", 5, &[]).await.unwrap_err();
    let RetrievalError::Search { collection, .. } = err;
    assert_eq!(collection, "memory");

    assert!(retriever.retrieve_context("q", 5, &[]).await.is_empty());
}

#[tokio::test]
async fn memory_write_failure_is_swallowed() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
    let svc = RetrievalService::new(Arc::new(UnavailableStore), embedder, config());

    assert!(svc.writer().try_log("q", "a").await.is_err());
    svc.log_to_memory("q", "a").await;
}

#[tokio::test]
async fn logged_exchange_becomes_context() {
    let svc = service();
    svc.log_to_memory("How do I reverse a list?", "Call reverse() on it.")
        .await;
    svc.log_to_memory("How do I reverse a list?", "Call reverse() on it.")
        .await;

    let context = svc.retrieve_context("reverse a list", &[]).await;
    assert_eq!(
        context,
        vec!["Q: How do I reverse a list?\nA: Call reverse() on it."]
    );
}

#[tokio::test]
async fn ingested_document_is_searchable_when_active() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.md");
    std::fs::write(
        &path,
        "Generators yield values lazily.\n\nDecorators wrap functions.",
    )
    .unwrap();

    let svc = service();
    let report = svc.ingestor().ingest_file(&path).await.unwrap();
    assert!(report.collection.starts_with("document-notes-"));
    assert_eq!(report.chunks, 1);

    let handle = svc
        .store()
        .get_or_create_collection(&report.collection)
        .await
        .unwrap();
    let docs = handle.get(None).await.unwrap();
    assert_eq!(docs[0].id, format!("{}-0", report.collection));
    assert_eq!(docs[0].metadata, json!({"source": "notes.md", "chunk_id": 0}));

    let active = vec![report.collection.clone()];
    let context = svc.retrieve_context("generators", &active).await;
    assert_eq!(context[0], "Generators yield values lazily.\n\nDecorators wrap functions.");
}

#[tokio::test]
async fn each_upload_gets_its_own_collection() {
    let svc = service();
    let ingestor = svc.ingestor();
    let a = ingestor.ingest_text("main.py", "print('a')").await.unwrap();
    let b = ingestor.ingest_text("main.py", "print('a')").await.unwrap();
    assert_ne!(a.collection, b.collection);
}

#[tokio::test]
async fn unsupported_and_missing_files_are_rejected() {
    let dir = TempDir::new().unwrap();
    let pdf = dir.path().join("paper.pdf");
    std::fs::write(&pdf, b"%PDF-1.4").unwrap();

    let ingestor = service().ingestor();
    assert!(matches!(
        ingestor.ingest_file(&pdf).await,
        Err(DevbotError::Ingest(_))
    ));
    assert!(matches!(
        ingestor.ingest_file(&dir.path().join("missing.txt")).await,
        Err(DevbotError::Ingest(_))
    ));
    assert!(matches!(
        ingestor.ingest_text("empty.txt", "   ").await,
        Err(DevbotError::Ingest(_))
    ));
}

#[tokio::test]
async fn long_document_is_chunked_within_limits() {
    let text = (0..400)
        .map(|i| format!("Sentence number {i} talks about Python"))
        .collect::<Vec<_>>()
        .join(". ");

    let svc = service();
    let report = svc.ingestor().ingest_text("long.txt", &text).await.unwrap();
    assert!(report.chunks > 1);

    let docs = svc
        .store()
        .get_or_create_collection(&report.collection)
        .await
        .unwrap()
        .get(None)
        .await
        .unwrap();
    assert_eq!(docs.len(), report.chunks);
    assert!(docs.iter().all(|d| d.document.chars().count() <= 1000));
}

#[tokio::test]
async fn tutorial_reindex_replaces_previous_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tutorial.md");
    let svc = service();
    let ingestor = svc.ingestor();

    std::fs::write(&path, "# Old\nstale\n# Older\nstaler\n# Oldest\nstalest").unwrap();
    assert_eq!(ingestor.index_tutorial(&path).await.unwrap().chunks, 3);

    std::fs::write(&path, "# Files\nUse open().\n## Modes\nr, w, a").unwrap();
    let report = ingestor.index_tutorial(&path).await.unwrap();
    assert_eq!(report.collection, "tutorial");
    assert_eq!(report.chunks, 2);

    let docs = svc
        .store()
        .get_or_create_collection("tutorial")
        .await
        .unwrap()
        .get(None)
        .await
        .unwrap();
    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["tutorial-0", "tutorial-1"]);
    assert_eq!(docs[1].document, "## Modes\nr, w, a");
    assert_eq!(docs[1].metadata, json!({"source": "tutorial", "chunk_id": 1}));
}
