//! Per-pair outcome records and run summaries

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{ErrorKind, EvalError};
use crate::metrics::MetricScores;
use crate::parser::FinalizedResponse;

/// A pair's terminal error as it appears in reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EvalError> for PairError {
    fn from(error: &EvalError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// The result of evaluating one (model, test case) pair
///
/// Holds either a response with its scores or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub model_id: String,
    pub test_case_id: String,
    pub response: Option<FinalizedResponse>,
    pub scores: Option<MetricScores>,
    pub success: bool,
    pub error: Option<PairError>,
}

impl OutcomeRecord {
    pub fn scored(
        model_id: impl Into<String>,
        test_case_id: impl Into<String>,
        response: FinalizedResponse,
        scores: MetricScores,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            test_case_id: test_case_id.into(),
            success: scores.success,
            response: Some(response),
            scores: Some(scores),
            error: None,
        }
    }

    pub fn failed(
        model_id: impl Into<String>,
        test_case_id: impl Into<String>,
        error: &EvalError,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            test_case_id: test_case_id.into(),
            response: None,
            scores: None,
            success: false,
            error: Some(PairError::from(error)),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|error| error.kind)
    }
}

/// Aggregate counts over a set of records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    /// Scored but unsuccessful
    pub failed: usize,
    pub errored: usize,
    /// Mean accuracy of scored pairs; 0 when none were scored
    pub mean_accuracy: f64,
    /// Mean response time of scored pairs, in seconds
    pub mean_response_time_secs: f64,
    pub total_tokens: u64,
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
}

impl RunSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OutcomeRecord>) -> Self {
        let mut summary = Self::default();
        let mut accuracy_sum = 0.0;
        let mut time_sum = 0.0;

        for record in records {
            summary.total += 1;
            if let Some(error) = &record.error {
                summary.errored += 1;
                *summary.errors_by_kind.entry(error.kind).or_default() += 1;
                continue;
            }
            if record.success {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            if let Some(scores) = &record.scores {
                accuracy_sum += scores.accuracy;
                time_sum += scores.response_time.as_secs_f64();
                summary.total_tokens = summary
                    .total_tokens
                    .saturating_add(scores.token_usage.total_tokens);
            }
        }

        let scored = summary.passed + summary.failed;
        if scored > 0 {
            summary.mean_accuracy = accuracy_sum / scored as f64;
            summary.mean_response_time_secs = time_sum / scored as f64;
        }
        summary
    }

    /// One summary per model, in model identifier order
    pub fn per_model(records: &[OutcomeRecord]) -> BTreeMap<String, RunSummary> {
        let mut by_model: BTreeMap<&str, Vec<&OutcomeRecord>> = BTreeMap::new();
        for record in records {
            by_model.entry(&record.model_id).or_default().push(record);
        }
        by_model
            .into_iter()
            .map(|(model_id, records)| (model_id.to_string(), Self::from_records(records)))
            .collect()
    }

    /// Percentage of pairs that succeeded
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}
