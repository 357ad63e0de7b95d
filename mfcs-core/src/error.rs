//! Error types for mfcs-core

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error for one (model, test case) pair
///
/// Every variant is contained to the pair that produced it; the
/// orchestrator turns it into that pair's recorded error.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Pair timed out after {0:?}")]
    Timeout(Duration),

    #[error("Run cancelled before the pair finished")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// Serializable classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(ParseError::MalformedChunk { .. }) => ErrorKind::MalformedChunk,
            Self::Driver(DriverError::Read(_)) => ErrorKind::DriverIo,
            Self::Driver(_) => ErrorKind::DriverLaunchFailure,
            Self::Metrics(MetricsError::EmbeddingBackendUnavailable(_)) => {
                ErrorKind::EmbeddingBackendUnavailable
            }
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Errors from the protocol stream parser
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed chunk at line {line}: {message}")]
    MalformedChunk { line: usize, message: String },
}

/// Errors from launching or reading a driver
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Driver program not found: {program}")]
    NotFound { program: String },

    #[error("Failed to spawn driver process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Driver stdout was not captured")]
    StdoutUnavailable,

    #[error("Failed to read driver output: {0}")]
    Read(#[source] std::io::Error),
}

/// Errors from the metrics engine
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Embedding backend unavailable: {0}")]
    EmbeddingBackendUnavailable(String),
}

/// Error classification as it appears in outcome records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedChunk,
    DriverLaunchFailure,
    DriverIo,
    Timeout,
    EmbeddingBackendUnavailable,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedChunk => "malformed_chunk",
            Self::DriverLaunchFailure => "driver_launch_failure",
            Self::DriverIo => "driver_io",
            Self::Timeout => "timeout",
            Self::EmbeddingBackendUnavailable => "embedding_backend_unavailable",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
