//! Hashed term-frequency embeddings.
//!
//! Terms are bucketed with FNV-1a into a fixed number of dimensions and the
//! result is L2-normalized. Much weaker than neural embeddings, but needs
//! no model files, so it backs tests and air-gapped deployments.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::embedding::{Embedder, EmbeddingError};

/// Deterministic, dependency-free embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.len() >= 2)
            .map(|s| s.to_lowercase())
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut tf: HashMap<String, f32> = HashMap::new();
        let mut total = 0.0f32;
        for tok in Self::tokenize(text) {
            *tf.entry(tok).or_default() += 1.0;
            total += 1.0;
        }

        let mut vec = vec![0.0f32; self.dimension];
        if total == 0.0 {
            return vec;
        }

        for (term, count) in &tf {
            // longer terms carry more signal than short stopwords
            let weight = 1.0 + (term.len() as f32).ln();
            vec[Self::bucket(term, self.dimension)] += (count / total) * weight;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing-tf"
    }
}
