//! Metrics engine
//!
//! Scores a [`FinalizedResponse`] against a test case's expected output.
//! Tool usage and semantic match gate success; response time and token
//! usage are recorded for reporting only.

mod embedding;
mod semantic;
mod tool_usage;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MetricsError;
use crate::parser::{FinalizedResponse, TokenUsage};
use crate::types::ExpectedOutput;

pub use embedding::{
    DEFAULT_EMBEDDING_THRESHOLD, Embedder, EmbedderError, EmbedderResult, EmbeddingScorer,
    cosine_similarity,
};
pub use semantic::{
    DEFAULT_JACCARD_THRESHOLD, JaccardScorer, SemanticScore, SemanticScorer, jaccard_similarity,
};
pub use tool_usage::{ToolUsageScore, score_tool_usage};

/// Scores for one response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricScores {
    /// `None` when the case has no tool expectation
    pub tool_usage: Option<ToolUsageScore>,
    /// `None` when the case has no semantic expectation
    pub semantic: Option<SemanticScore>,
    #[serde(rename = "response_time_secs", serialize_with = "crate::parser::as_secs_f64")]
    pub response_time: std::time::Duration,
    pub token_usage: TokenUsage,
    /// Passed checks over applicable checks, as a percentage
    pub accuracy: f64,
    pub success: bool,
}

impl MetricScores {
    fn from_checks(
        tool_usage: Option<ToolUsageScore>,
        semantic: Option<SemanticScore>,
        response: &FinalizedResponse,
    ) -> Self {
        let checks: Vec<bool> = tool_usage
            .iter()
            .map(|score| score.passed)
            .chain(semantic.iter().map(|score| score.matched))
            .collect();
        let passed = checks.iter().filter(|passed| **passed).count();

        let accuracy = if checks.is_empty() {
            100.0
        } else {
            passed as f64 / checks.len() as f64 * 100.0
        };

        Self {
            tool_usage,
            semantic,
            response_time: response.elapsed,
            token_usage: response.usage,
            accuracy,
            success: passed == checks.len(),
        }
    }
}

/// Which semantic scorer a run uses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SemanticMode {
    Jaccard { threshold: f64 },
    Embedding { threshold: f64 },
}

impl SemanticMode {
    pub fn threshold(&self) -> f64 {
        match self {
            Self::Jaccard { threshold } | Self::Embedding { threshold } => *threshold,
        }
    }
}

impl Default for SemanticMode {
    fn default() -> Self {
        Self::Jaccard {
            threshold: DEFAULT_JACCARD_THRESHOLD,
        }
    }
}

/// Applies the configured semantic scorer plus the tool usage check
#[derive(Clone)]
pub struct MetricsEngine {
    scorer: Arc<dyn SemanticScorer>,
}

impl MetricsEngine {
    pub fn new(scorer: Arc<dyn SemanticScorer>) -> Self {
        Self { scorer }
    }

    /// Engine using word-overlap scoring at the default threshold
    pub fn jaccard() -> Self {
        Self::new(Arc::new(JaccardScorer::default()))
    }

    /// Engine for the selected mode
    ///
    /// Embedding mode needs a backend; without one every semantic check
    /// would fail, so this is rejected up front.
    pub fn for_mode(
        mode: SemanticMode,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, MetricsError> {
        match (mode, embedder) {
            (SemanticMode::Jaccard { threshold }, _) => {
                Ok(Self::new(Arc::new(JaccardScorer::new(threshold))))
            }
            (SemanticMode::Embedding { threshold }, Some(embedder)) => {
                Ok(Self::new(Arc::new(EmbeddingScorer::new(embedder, threshold))))
            }
            (SemanticMode::Embedding { .. }, None) => Err(MetricsError::EmbeddingBackendUnavailable(
                "no embedding backend configured".to_string(),
            )),
        }
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// Score one response
    ///
    /// Fails only when the semantic scorer's backend cannot be reached.
    pub async fn evaluate(
        &self,
        response: &FinalizedResponse,
        expected: &ExpectedOutput,
    ) -> Result<MetricScores, MetricsError> {
        let tool_usage = score_tool_usage(&expected.contains_tool, response);

        let semantic = match expected.semantic_target() {
            Some(target) => Some(self.scorer.score(target, &response.content).await?),
            None => None,
        };

        let scores = MetricScores::from_checks(tool_usage, semantic, response);
        debug!(
            accuracy = scores.accuracy,
            success = scores.success,
            scorer = self.scorer.name(),
            "Scored response"
        );
        Ok(scores)
    }
}

impl std::fmt::Debug for MetricsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsEngine")
            .field("scorer", &self.scorer.name())
            .finish()
    }
}
