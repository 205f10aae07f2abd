//! Embedding generation for vector search.
//!
//! [`Embedder`] is the seam every store and writer depends on. The default
//! implementation, [`EmbeddingService`], runs fastembed's all-MiniLM-L6-v2
//! model (384 dimensions); [`crate::hashing::HashingEmbedder`] is the
//! offline fallback.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, instrument};

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("Failed to generate embeddings: {0}")]
    Generation(String),

    #[error("Blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Text to fixed-length vector.
///
/// Implementations must be deterministic for identical input within a
/// process.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Model identifier, for logs and status.
    fn model_name(&self) -> &str;
}

/// Embedding service backed by fastembed.
///
/// The model is initialized on first use and shared across all embedding
/// calls.
pub struct EmbeddingService {
    model: EmbeddingModel,
    model_label: String,
    dimension: usize,
    /// Lazily initialized text embedding model
    engine: OnceCell<Arc<TextEmbedding>>,
}

impl EmbeddingService {
    /// Creates a new embedding service with the specified model.
    ///
    /// The model is not loaded until the first embedding call.
    pub fn new(model: EmbeddingModel) -> Self {
        let dimension = match model {
            EmbeddingModel::AllMiniLML6V2 => 384,
            EmbeddingModel::AllMiniLML6V2Q => 384,
            EmbeddingModel::AllMiniLML12V2 => 384,
            EmbeddingModel::AllMiniLML12V2Q => 384,
            EmbeddingModel::BGEBaseENV15 => 768,
            EmbeddingModel::BGEBaseENV15Q => 768,
            EmbeddingModel::BGELargeENV15 => 1024,
            EmbeddingModel::BGELargeENV15Q => 1024,
            EmbeddingModel::BGESmallENV15 => 384,
            EmbeddingModel::BGESmallENV15Q => 384,
            EmbeddingModel::NomicEmbedTextV1 => 768,
            EmbeddingModel::NomicEmbedTextV15 => 768,
            EmbeddingModel::NomicEmbedTextV15Q => 768,
            EmbeddingModel::JinaEmbeddingsV2BaseCode => 768,
            _ => 384,
        };

        Self {
            model_label: format!("{:?}", model),
            model,
            dimension,
            engine: OnceCell::new(),
        }
    }

    /// Creates an embedding service from a model name string.
    pub fn from_model_str(model_name: &str) -> Result<Self, EmbeddingError> {
        let model = match model_name {
            "all-MiniLM-L6-v2" | "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
            "all-MiniLM-L6-v2-q" | "AllMiniLML6V2Q" => EmbeddingModel::AllMiniLML6V2Q,
            "all-MiniLM-L12-v2" | "AllMiniLML12V2" => EmbeddingModel::AllMiniLML12V2,
            "bge-small-en-v1.5" | "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" | "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
            "nomic-embed-text-v1.5" | "NomicEmbedTextV15" => EmbeddingModel::NomicEmbedTextV15,
            "jina-embeddings-v2-base-code" | "JinaEmbeddingsV2BaseCode" => {
                EmbeddingModel::JinaEmbeddingsV2BaseCode
            }
            _ => {
                return Err(EmbeddingError::ModelInit(format!(
                    "Unknown embedding model: '{}'. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5, jina-embeddings-v2-base-code",
                    model_name
                )));
            }
        };
        let mut service = Self::new(model);
        service.model_label = model_name.to_string();
        Ok(service)
    }

    /// Creates an embedding service from config, validating dimension matches.
    pub fn from_config(model_name: &str, expected_dim: usize) -> Result<Self, EmbeddingError> {
        let service = Self::from_model_str(model_name)?;
        if service.dimension != expected_dim {
            return Err(EmbeddingError::ModelInit(format!(
                "Dimension mismatch: model '{}' produces {}-dim vectors but config specifies {}",
                model_name, service.dimension, expected_dim
            )));
        }
        Ok(service)
    }

    #[instrument(skip(self))]
    fn get_or_init_model(&self) -> Result<Arc<TextEmbedding>, EmbeddingError> {
        self.engine
            .get_or_try_init(|| {
                info!(model = %self.model_label, "Initializing embedding model");

                let mut options = InitOptions::new(self.model.clone());
                options.show_download_progress = true;
                let engine = TextEmbedding::try_new(options)
                    .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

                info!(
                    model = %self.model_label,
                    dimension = self.dimension,
                    "Embedding model initialized"
                );

                Ok(Arc::new(engine))
            })
            .cloned()
    }

    /// Loads the model ahead of the first request.
    #[instrument(skip(self))]
    pub async fn warmup(&self) -> Result<(), EmbeddingError> {
        if self.engine.get().is_some() {
            debug!("Model already initialized, skipping warmup");
            return Ok(());
        }
        self.get_or_init_model()?;
        Ok(())
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("Empty embedding result".into()))
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let engine = self.get_or_init_model()?;
        let texts = texts.to_vec();

        // fastembed is synchronous
        let embeddings = task::spawn_blocking(move || {
            engine
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await??;

        debug!(
            batch_size = embeddings.len(),
            dimension = embeddings.first().map(|e| e.len()).unwrap_or(0),
            "Generated embeddings"
        );

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_label
    }
}

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new(EmbeddingModel::AllMiniLML6V2)
    }
}
