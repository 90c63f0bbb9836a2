//! Embedders: the external-service seam and a deterministic local stand-in.

use async_trait::async_trait;
use kindred_core::error::MemoryError;
use kindred_core::memory::Embedder;
use kindred_core::model::{EmbeddingRequest, ModelClient};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Feature-hashing bag-of-words embedder.
///
/// Deterministic across processes (fixed-key hasher), no I/O, no vendor.
/// Quality is far below a real embedding model, but similar texts still land
/// near each other, which is all local runs and tests need.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let mut vector = vec![0.0f32; self.dim];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            word.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dim as u64) as usize;
            // Second hash bit decides the sign, which keeps unrelated words
            // from piling into purely positive buckets.
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 1e-10 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Embedder backed by a [`ModelClient`] embedding endpoint.
pub struct ModelEmbedder {
    client: Arc<dyn ModelClient>,
    model: String,
}

impl ModelEmbedder {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ModelEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let response = self
            .client
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| MemoryError::RetrievalUnavailable(e.to_string()))?;
        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::EmbeddingFailed("empty embedding response".into()))
    }
}
