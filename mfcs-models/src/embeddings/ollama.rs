//! Ollama embedding backend.
//!
//! Uses the batch `/api/embed` endpoint of a local Ollama instance.
//!
//! # Example
//!
//! ```ignore
//! use mfcs_models::OllamaEmbedder;
//!
//! let embedder = OllamaEmbedder::new("nomic-embed-text");  // Uses localhost:11434
//! let embedder = OllamaEmbedder::new("nomic-embed-text").base_url("http://gpu-box:11434");
//! ```

use async_trait::async_trait;
use mfcs_core::{Embedder, EmbedderError};
use mfcs_core::metrics::EmbedderResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::trim_base_url;
use crate::{Error, Result};

/// Default Ollama API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

// ────────────────────────────────────────────────────────────────────────────
// Ollama API Types
// ────────────────────────────────────────────────────────────────────────────

/// Request body for Ollama's `/api/embed` endpoint.
#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

/// Response from Ollama's `/api/embed` endpoint.
#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

// ────────────────────────────────────────────────────────────────────────────
// OllamaEmbedder
// ────────────────────────────────────────────────────────────────────────────

/// Embedder backed by a local Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    /// Create an embedder for `model` at the default URL.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), model)
    }

    pub fn with_client(client: reqwest::Client, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            client,
        }
    }

    /// Point at a different Ollama instance.
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base_url(base_url);
        self
    }

    pub fn url(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderApi {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(Error::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        debug!(model = %self.model, count = texts.len(), "Ollama embeddings received");
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>> {
        self.request(&[text])
            .await?
            .pop()
            .ok_or(EmbedderError::EmptyEmbedding)
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbedderResult<Vec<Vec<f32>>> {
        Ok(self.request(texts).await?)
    }
}
