//! Embedding-based semantic scoring
//!
//! Provides the `Embedder` capability that backends implement and
//! `EmbeddingScorer`, which compares texts by cosine similarity.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::semantic::{SemanticScore, SemanticScorer};
use crate::error::MetricsError;

/// Default match threshold for [`EmbeddingScorer`]
pub const DEFAULT_EMBEDDING_THRESHOLD: f64 = 0.45;

/// Errors that can occur during embedding operations
#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Backend returned an empty embedding")]
    EmptyEmbedding,
}

/// Result type for embedder operations
pub type EmbedderResult<T> = Result<T, EmbedderError>;

impl From<EmbedderError> for MetricsError {
    fn from(error: EmbedderError) -> Self {
        MetricsError::EmbeddingBackendUnavailable(error.to_string())
    }
}

/// Trait for generating text embeddings
///
/// One embedder is shared by every pair in a run and must tolerate
/// concurrent calls.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch
    ///
    /// Default implementation calls `embed` sequentially; implementations
    /// should override for efficient batching.
    async fn embed_batch(&self, texts: &[&str]) -> EmbedderResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Compute cosine similarity between two embedding vectors
///
/// Returns a value in [-1, 1]; zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> EmbedderResult<f64> {
    if a.len() != b.len() {
        return Err(EmbedderError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(EmbedderError::EmptyEmbedding);
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        Ok(0.0)
    } else {
        Ok(dot / (norm_a * norm_b))
    }
}

/// Cosine similarity over backend embeddings
#[derive(Clone)]
pub struct EmbeddingScorer {
    embedder: Arc<dyn Embedder>,
    threshold: f64,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f64) -> Self {
        Self {
            embedder,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl std::fmt::Debug for EmbeddingScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingScorer")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SemanticScorer for EmbeddingScorer {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn score(&self, expected: &str, actual: &str) -> Result<SemanticScore, MetricsError> {
        // Nothing to embed on the response side
        if actual.trim().is_empty() {
            debug!("Empty response content, skipping embedding");
            return Ok(SemanticScore::new(self.name(), 0.0, self.threshold));
        }

        let vectors = self.embedder.embed_batch(&[expected, actual]).await?;
        let [expected_vec, actual_vec] = vectors.as_slice() else {
            return Err(EmbedderError::InvalidResponse(format!(
                "expected 2 embeddings, got {}",
                vectors.len()
            ))
            .into());
        };

        let similarity = cosine_similarity(expected_vec, actual_vec)?;
        debug!(similarity, threshold = self.threshold, "Embedding similarity");
        Ok(SemanticScore::new(self.name(), similarity, self.threshold))
    }
}
