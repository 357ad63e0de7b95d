//! Embedding backends for mfcs-bench.
//!
//! This crate provides:
//! - An Ollama backend for local embedding models
//! - An OpenAI-compatible backend for hosted embedding APIs
//! - [`EmbeddingConfig`] and a factory that picks a backend from it
//!
//! Both backends implement [`mfcs_core::Embedder`], so the metrics engine
//! can use them for embedding-based semantic scoring.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              EmbeddingScorer (core)           │
//! └──────────────────────────────────────────────┘
//!                        │ Arc<dyn Embedder>
//!                        ▼
//! ┌──────────────────────┐  ┌────────────────────┐
//! │    OllamaEmbedder    │  │   OpenAiEmbedder   │
//! │  POST /api/embed     │  │  POST /embeddings  │
//! └──────────────────────┘  └────────────────────┘
//! ```

mod error;

pub mod embeddings;

pub use embeddings::{
    EmbeddingConfig, EmbeddingProvider, OllamaEmbedder, OpenAiEmbedder, embedder_from_config,
};
pub use error::{Error, Result};
