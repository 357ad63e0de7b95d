//! Semantic match scoring
//!
//! A run uses exactly one [`SemanticScorer`], chosen when the run is
//! configured and shared by every pair.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::MetricsError;

/// Default match threshold for [`JaccardScorer`]
pub const DEFAULT_JACCARD_THRESHOLD: f64 = 0.5;

/// Result of one semantic comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticScore {
    /// Name of the scorer that produced this score
    pub scorer: String,
    pub similarity: f64,
    pub threshold: f64,
    pub matched: bool,
}

impl SemanticScore {
    pub fn new(scorer: &str, similarity: f64, threshold: f64) -> Self {
        Self {
            scorer: scorer.to_string(),
            similarity,
            threshold,
            matched: similarity >= threshold,
        }
    }
}

/// Strategy for comparing expected and actual text
///
/// Implementations are shared across concurrently running pairs.
#[async_trait]
pub trait SemanticScorer: Send + Sync {
    /// Short identifier, e.g. "jaccard"
    fn name(&self) -> &str;

    /// Compare the expected text with the response content
    async fn score(&self, expected: &str, actual: &str) -> Result<SemanticScore, MetricsError>;
}

/// Word-set overlap scorer
#[derive(Debug, Clone, Copy)]
pub struct JaccardScorer {
    threshold: f64,
}

impl JaccardScorer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for JaccardScorer {
    fn default() -> Self {
        Self::new(DEFAULT_JACCARD_THRESHOLD)
    }
}

#[async_trait]
impl SemanticScorer for JaccardScorer {
    fn name(&self) -> &str {
        "jaccard"
    }

    async fn score(&self, expected: &str, actual: &str) -> Result<SemanticScore, MetricsError> {
        let similarity = jaccard_similarity(expected, actual);
        Ok(SemanticScore::new(self.name(), similarity, self.threshold))
    }
}

/// |A ∩ B| / |A ∪ B| over normalized word sets; two empty sets score 1.0
pub fn jaccard_similarity(expected: &str, actual: &str) -> f64 {
    let expected = word_set(expected);
    let actual = word_set(actual);

    let union = expected.union(&actual).count();
    if union == 0 {
        return 1.0;
    }
    let intersection = expected.intersection(&actual).count();
    intersection as f64 / union as f64
}

/// Lowercased words with punctuation stripped
fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}
