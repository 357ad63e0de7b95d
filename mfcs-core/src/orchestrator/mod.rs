//! Evaluation orchestrator
//!
//! Runs every (model, test case) pair of a [`Suite`] concurrently, bounded
//! by a semaphore, and collects exactly one [`OutcomeRecord`] per pair. A
//! failure in one pair is recorded against that pair and never reaches its
//! siblings.
//!
//! ```text
//!            ┌──────────── Orchestrator::run ────────────┐
//!  Suite ──► │ spawn one task per pair ─► Semaphore      │
//!            │   task: Driver ─► StreamParser ─► Metrics │
//!            │   JoinHandle ─► collector (pair order)    │
//!            └───────────────────────────────────────────┘
//! ```

mod outcome;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{Driver, Invocation};
use crate::error::{EvalError, MetricsError};
use crate::metrics::{Embedder, MetricScores, MetricsEngine, SemanticMode};
use crate::parser::{Feed, FinalizedResponse, StreamParser};
use crate::types::Suite;

pub use outcome::{OutcomeRecord, PairError, RunSummary};

/// Default number of pairs evaluated at once
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Default per-pair deadline
pub const DEFAULT_PAIR_TIMEOUT: Duration = Duration::from_secs(30);

/// Run-time options for one evaluation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunOptions {
    /// Maximum pairs in flight; values below 1 are treated as 1
    pub concurrency: usize,
    /// Deadline for launching a driver and reading its response
    #[serde(rename = "pair_timeout_secs", serialize_with = "crate::parser::as_secs_f64")]
    pub pair_timeout: Duration,
    pub semantic: SemanticMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            pair_timeout: DEFAULT_PAIR_TIMEOUT,
            semantic: SemanticMode::default(),
        }
    }
}

/// Evaluates a suite against a driver
pub struct Orchestrator {
    driver: Arc<dyn Driver>,
    metrics: MetricsEngine,
    options: RunOptions,
}

impl Orchestrator {
    /// Build an orchestrator whose scorer follows `options.semantic`
    pub fn new(
        driver: Arc<dyn Driver>,
        options: RunOptions,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, MetricsError> {
        let metrics = MetricsEngine::for_mode(options.semantic, embedder)?;
        Ok(Self::with_metrics(driver, options, metrics))
    }

    /// Build an orchestrator with a preconfigured metrics engine
    pub fn with_metrics(driver: Arc<dyn Driver>, options: RunOptions, metrics: MetricsEngine) -> Self {
        Self {
            driver,
            metrics,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Evaluate every pair and return their records
    ///
    /// Records come back ordered by model identifier, then test case order,
    /// whatever order the pairs finished in. When `cancel` fires, pairs that
    /// have not finished are recorded as cancelled and their drivers are
    /// killed.
    pub async fn run(&self, suite: Arc<Suite>, cancel: CancellationToken) -> Vec<OutcomeRecord> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut handles = Vec::with_capacity(suite.pair_count());

        info!(
            app = %suite.app_name,
            models = suite.models.len(),
            test_cases = suite.test_cases.len(),
            concurrency = self.options.concurrency.max(1),
            scorer = self.metrics.scorer_name(),
            "Starting evaluation run"
        );

        for model_id in suite.models.keys() {
            for (case_index, case) in suite.test_cases.iter().enumerate() {
                let task = PairTask {
                    suite: Arc::clone(&suite),
                    model_id: model_id.clone(),
                    case_index,
                    driver: Arc::clone(&self.driver),
                    metrics: self.metrics.clone(),
                    timeout: self.options.pair_timeout,
                    semaphore: Arc::clone(&semaphore),
                    cancel: cancel.clone(),
                };
                let handle = tokio::spawn(task.run());
                handles.push((model_id.clone(), case.id.clone(), handle));
            }
        }

        let mut records = Vec::with_capacity(handles.len());
        for (model_id, test_case_id, handle) in handles {
            let record = match handle.await {
                Ok(record) => record,
                Err(e) => {
                    let reason = if e.is_panic() {
                        "pair task panicked"
                    } else {
                        "pair task was aborted"
                    };
                    warn!(model_id = %model_id, test_case_id = %test_case_id, "{}", reason);
                    OutcomeRecord::failed(
                        model_id,
                        test_case_id,
                        &EvalError::Internal(reason.to_string()),
                    )
                }
            };
            records.push(record);
        }

        let summary = RunSummary::from_records(&records);
        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            errored = summary.errored,
            "Evaluation run finished"
        );
        records
    }
}

/// Everything one spawned pair task owns
struct PairTask {
    suite: Arc<Suite>,
    model_id: String,
    case_index: usize,
    driver: Arc<dyn Driver>,
    metrics: MetricsEngine,
    timeout: Duration,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl PairTask {
    async fn run(self) -> OutcomeRecord {
        let case = &self.suite.test_cases[self.case_index];

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EvalError::Cancelled),
            result = self.evaluate() => result,
        };

        match result {
            Ok((response, scores)) => {
                info!(
                    model_id = %self.model_id,
                    test_case_id = %case.id,
                    success = scores.success,
                    accuracy = scores.accuracy,
                    elapsed_ms = response.elapsed.as_millis() as u64,
                    "Pair finished"
                );
                OutcomeRecord::scored(&self.model_id, &case.id, response, scores)
            }
            Err(e) => {
                warn!(
                    model_id = %self.model_id,
                    test_case_id = %case.id,
                    kind = %e.kind(),
                    error = %e,
                    "Pair failed"
                );
                OutcomeRecord::failed(&self.model_id, &case.id, &e)
            }
        }
    }

    async fn evaluate(&self) -> Result<(FinalizedResponse, MetricScores), EvalError> {
        let _permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EvalError::Internal("concurrency limiter closed".to_string()))?;

        let case = &self.suite.test_cases[self.case_index];
        let model = self
            .suite
            .models
            .get(&self.model_id)
            .ok_or_else(|| EvalError::Internal(format!("unknown model {}", self.model_id)))?;
        let invocation = Invocation::new(&self.suite, &self.model_id, model, case);

        let response = tokio::time::timeout(self.timeout, invoke(self.driver.as_ref(), &invocation))
            .await
            .map_err(|_| EvalError::Timeout(self.timeout))??;

        let scores = self
            .metrics
            .evaluate(&response, &case.expected_output)
            .await?;
        Ok((response, scores))
    }
}

/// Launch the driver and parse its output into one response
///
/// The driver output (and with it any child process) is dropped on every
/// exit path, including when this future is itself dropped.
async fn invoke(driver: &dyn Driver, invocation: &Invocation) -> Result<FinalizedResponse, EvalError> {
    let started = Instant::now();
    let mut output = driver.launch(invocation).await?;
    let mut parser = StreamParser::new();

    while let Some(item) = output.chunks.next().await {
        let text = item?;
        let feed = if output.stream {
            parser.push_line(&text)?
        } else {
            parser.push_payload(&text)?
        };
        if feed == Feed::Terminated {
            debug!(
                model_id = %invocation.model_id,
                test_case_id = %invocation.test_case_id,
                "Usage received, closing driver output"
            );
            break;
        }
    }
    drop(output);

    Ok(parser.finish(started.elapsed()))
}
