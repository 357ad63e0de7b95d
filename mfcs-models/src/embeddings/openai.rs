//! OpenAI-compatible embedding backend.
//!
//! Works with any server exposing `POST {base}/embeddings` in the OpenAI
//! shape, which covers most hosted APIs and local gateways.

use async_trait::async_trait;
use mfcs_core::metrics::EmbedderResult;
use mfcs_core::types::ApiKey;
use mfcs_core::{Embedder, EmbedderError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::trim_base_url;
use crate::{Error, Result};

/// Default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ────────────────────────────────────────────────────────────────────────────
// OpenAI API Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl EmbeddingsResponse {
    /// Vectors in input order
    fn into_ordered(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            return Err(Error::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                self.data.len()
            )));
        }
        self.data.sort_by_key(|item| item.index);
        Ok(self.data.into_iter().map(|item| item.embedding).collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAiEmbedder
// ────────────────────────────────────────────────────────────────────────────

/// Embedder for OpenAI-compatible HTTP APIs.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    base_url: String,
    model: String,
    api_key: ApiKey,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(model: impl Into<String>, api_key: ApiKey) -> Self {
        Self::with_client(reqwest::Client::new(), model, api_key)
    }

    pub fn with_client(client: reqwest::Client, model: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key,
            client,
        }
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base_url(base_url);
        self
    }

    pub fn url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
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

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        debug!(model = %self.model, count = texts.len(), "Embeddings received");
        parsed.into_ordered(texts.len())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
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
