use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use mfcs_core::RunOptions;
use mfcs_core::metrics::{DEFAULT_EMBEDDING_THRESHOLD, DEFAULT_JACCARD_THRESHOLD, SemanticMode};
use mfcs_core::orchestrator::{DEFAULT_CONCURRENCY, DEFAULT_PAIR_TIMEOUT};
use mfcs_models::EmbeddingConfig;
use serde::{Deserialize, Serialize};

/// Default apps file, keyed by application name
pub const DEFAULT_APPS_PATH: &str = "apps/config.json";
pub const DEFAULT_MODELS_PATH: &str = "apps/models.json";
pub const DEFAULT_TOOLS_PATH: &str = "apps/tools.json";
pub const DEFAULT_TEST_CASES_DIR: &str = "test_cases";
pub const DEFAULT_REPORTS_DIR: &str = "reports";

/// Semantic scorer selectable from config or the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SemanticKind {
    #[default]
    Jaccard,
    Embedding,
}

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawMfcsConfig {
    #[serde(default)]
    pub suite: RawSuiteConfig,

    #[serde(default)]
    pub run: RawRunConfig,

    #[serde(default)]
    pub report: RawReportConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSuiteConfig {
    pub apps: Option<PathBuf>,
    /// Application to run from the apps file
    pub app: Option<String>,
    pub models: Option<PathBuf>,
    pub tools: Option<PathBuf>,
    pub test_cases: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRunConfig {
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub semantic: Option<SemanticKind>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReportConfig {
    pub dir: Option<PathBuf>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Default)]
pub struct MfcsConfig {
    pub suite: SuiteConfig,
    pub run: RunConfig,
    pub report: ReportConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteConfig {
    pub apps: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    pub models: PathBuf,
    pub tools: PathBuf,
    pub test_cases: PathBuf,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            apps: PathBuf::from(DEFAULT_APPS_PATH),
            app: None,
            models: PathBuf::from(DEFAULT_MODELS_PATH),
            tools: PathBuf::from(DEFAULT_TOOLS_PATH),
            test_cases: PathBuf::from(DEFAULT_TEST_CASES_DIR),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub semantic: SemanticKind,
    /// Falls back to the selected scorer's default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: DEFAULT_PAIR_TIMEOUT.as_secs(),
            semantic: SemanticKind::default(),
            threshold: None,
        }
    }
}

impl RunConfig {
    pub fn semantic_mode(&self) -> SemanticMode {
        match self.semantic {
            SemanticKind::Jaccard => SemanticMode::Jaccard {
                threshold: self.threshold.unwrap_or(DEFAULT_JACCARD_THRESHOLD),
            },
            SemanticKind::Embedding => SemanticMode::Embedding {
                threshold: self.threshold.unwrap_or(DEFAULT_EMBEDDING_THRESHOLD),
            },
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            concurrency: self.concurrency,
            pair_timeout: Duration::from_secs(self.timeout_secs),
            semantic: self.semantic_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_REPORTS_DIR),
        }
    }
}
