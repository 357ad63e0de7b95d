//! mfcs-core: Evaluation engine for the MFCS function-calling benchmark
//!
//! This crate provides the pieces that turn a benchmark suite into scored
//! results:
//!
//! - **Data model** - [`Suite`], [`TestCase`], [`ModelConfig`], [`ToolConfig`], [`AppConfig`]
//! - **Protocol stream parser** - [`StreamParser`] rebuilds a [`FinalizedResponse`] from driver chunks
//! - **Metrics engine** - [`MetricsEngine`] with pluggable [`SemanticScorer`]s (Jaccard or embeddings)
//! - **Driver boundary** - [`Driver`] trait, [`SubprocessDriver`] and the [`ScriptedDriver`] test double
//! - **Orchestrator** - [`Orchestrator`] runs every (model, test case) pair concurrently
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mfcs_core::{Orchestrator, RunOptions, RunSummary, SubprocessDriver, Suite};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example(suite: Suite) -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator =
//!         Orchestrator::new(Arc::new(SubprocessDriver::new()), RunOptions::default(), None)?;
//!     let records = orchestrator.run(Arc::new(suite), CancellationToken::new()).await;
//!     let summary = RunSummary::from_records(&records);
//!     println!("{} of {} pairs passed", summary.passed, summary.total);
//!     Ok(())
//! }
//! ```

pub mod driver;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod types;

// Re-export key types for convenience
pub use driver::{Driver, DriverOutput, Invocation, ScriptedDriver, ScriptedRun, SubprocessDriver};
pub use error::{DriverError, ErrorKind, EvalError, MetricsError, ParseError};
pub use metrics::{
    Embedder, EmbedderError, EmbeddingScorer, JaccardScorer, MetricScores, MetricsEngine,
    SemanticMode, SemanticScore, SemanticScorer,
};
pub use orchestrator::{Orchestrator, OutcomeRecord, PairError, RunOptions, RunSummary};
pub use parser::{FinalizedResponse, StreamParser, TokenUsage, ToolCall};
pub use types::{
    AppConfig, ExpectedOutput, ModelConfig, Suite, SuitePaths, TestCase, ToolConfig,
    ToolDefinition, ToolExpectation,
};
