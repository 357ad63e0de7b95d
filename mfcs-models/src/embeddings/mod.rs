//! HTTP embedding backends.
//!
//! [`embedder_from_config`] turns an [`EmbeddingConfig`] (usually read from
//! the `[embedding]` table of a run config) into a shared embedder.

mod ollama;
mod openai;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use mfcs_core::Embedder;
use mfcs_core::types::ApiKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

/// Default request timeout for embedding calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which HTTP API to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }

    /// Model used when the config names none.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => "nomic-embed-text",
            Self::OpenAi => "text-embedding-3-small",
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn default_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
        }
    }
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding backend settings.
///
/// Every field is optional so layered config files can be merged field by
/// field; accessors apply the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<EmbeddingProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<ApiKey>,
    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl EmbeddingConfig {
    pub fn provider(&self) -> EmbeddingProvider {
        self.provider.unwrap_or_default()
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider().default_model())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Configured key, falling back to the provider's environment variable.
    pub fn resolve_api_key(&self) -> Option<ApiKey> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        let var = self
            .api_key_env
            .as_deref()
            .or_else(|| self.provider().default_key_env())?;
        env::var(var)
            .ok()
            .filter(|value| !value.is_empty())
            .map(ApiKey::new)
    }
}

/// Build the embedder described by `config`.
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let client = http_client(config.timeout())?;
    let provider = config.provider();
    debug!(provider = %provider, model = config.model(), "Building embedder");

    match provider {
        EmbeddingProvider::Ollama => {
            let mut embedder = OllamaEmbedder::with_client(client, config.model());
            if let Some(base_url) = &config.base_url {
                embedder = embedder.base_url(base_url);
            }
            Ok(Arc::new(embedder))
        }
        EmbeddingProvider::OpenAi => {
            let api_key = config
                .resolve_api_key()
                .ok_or_else(|| Error::CredentialsNotFound(provider.to_string()))?;
            let mut embedder = OpenAiEmbedder::with_client(client, config.model(), api_key);
            if let Some(base_url) = &config.base_url {
                embedder = embedder.base_url(base_url);
            }
            Ok(Arc::new(embedder))
        }
    }
}

/// Shared client with a per-request timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(Error::from)
}

pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
