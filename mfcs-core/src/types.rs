//! Benchmark data model
//!
//! Test cases, model/tool/app configuration, and the immutable [`Suite`]
//! bundle the orchestrator runs against. Everything here is loaded once
//! before dispatch and never mutated during a run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Test cases
// ────────────────────────────────────────────────────────────────────────────

/// The user-facing input of a test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInput {
    pub user: String,
}

/// A single benchmark query with its expectations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Identifier, usually the file name the case was loaded from
    #[serde(default)]
    pub id: String,
    pub input: TestInput,
    #[serde(default)]
    pub expected_output: ExpectedOutput,
    #[serde(default)]
    pub description: String,
    /// Where the case was loaded from, if it came from disk
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl TestCase {
    /// Create a test case with no expectations
    pub fn new(id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: TestInput { user: user.into() },
            expected_output: ExpectedOutput::default(),
            description: String::new(),
            path: None,
        }
    }

    /// Replace the expectations
    #[must_use]
    pub fn with_expected(mut self, expected_output: ExpectedOutput) -> Self {
        self.expected_output = expected_output;
        self
    }
}

/// What a response must contain for the case to pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_match: Option<String>,
    #[serde(default, skip_serializing_if = "ToolExpectation::is_absent")]
    pub contains_tool: ToolExpectation,
}

impl ExpectedOutput {
    /// The expected text, if there is a non-blank one
    pub fn semantic_target(&self) -> Option<&str> {
        self.semantic_match
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// Tool usage expectation
///
/// On the wire this is `contains_tool`: a tool name, a boolean, or absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<ContainsTool>", into = "Option<ContainsTool>")]
pub enum ToolExpectation {
    /// No expectation; the check is skipped
    #[default]
    Absent,
    /// `true`: any tool call satisfies it
    RequireAny,
    /// `false`: the response must not call a tool
    Forbidden,
    /// A call to exactly this tool (case-sensitive)
    RequireNamed(String),
}

impl ToolExpectation {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Wire form of `contains_tool`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContainsTool {
    Flag(bool),
    Name(String),
}

impl From<Option<ContainsTool>> for ToolExpectation {
    fn from(raw: Option<ContainsTool>) -> Self {
        match raw {
            None => Self::Absent,
            Some(ContainsTool::Flag(true)) => Self::RequireAny,
            Some(ContainsTool::Flag(false)) => Self::Forbidden,
            Some(ContainsTool::Name(name)) => Self::RequireNamed(name),
        }
    }
}

impl From<ToolExpectation> for Option<ContainsTool> {
    fn from(expectation: ToolExpectation) -> Self {
        match expectation {
            ToolExpectation::Absent => None,
            ToolExpectation::RequireAny => Some(ContainsTool::Flag(true)),
            ToolExpectation::Forbidden => Some(ContainsTool::Flag(false)),
            ToolExpectation::RequireNamed(name) => Some(ContainsTool::Name(name)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Model / tool / app configuration
// ────────────────────────────────────────────────────────────────────────────

/// A provider API key that never shows up in logs
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Use only when handing the key to a driver or an API.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Connection details for one model under test
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "base_url")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<ApiKey>,
    /// Provider-specific fields, passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_base: api_base.into(),
            api_key: None,
            extra: BTreeMap::new(),
        }
    }
}

/// One callable tool offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Ordered tool definitions; opaque to everything but name matching
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolConfig(pub Vec<ToolDefinition>);

impl ToolConfig {
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|tool| tool.name.as_str())
    }

    /// Position of the named tool, as drivers expect for `--tools_index`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|tool| tool.name == name)
    }
}

/// How to launch one driver application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub command: String,
    /// Argument template; see [`crate::driver::Invocation`] for placeholders
    #[serde(default)]
    pub args: Vec<String>,
    /// Whether the driver emits incremental chunks or one final payload
    #[serde(default)]
    pub stream: bool,
    /// Extra environment for the driver process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Paths the suite was loaded from, exposed to argument templates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuitePaths {
    pub models: Option<PathBuf>,
    pub tools: Option<PathBuf>,
    pub test_cases_dir: Option<PathBuf>,
}

/// Everything a run needs, loaded once and shared read-only across tasks
#[derive(Debug, Clone)]
pub struct Suite {
    pub app_name: String,
    pub app: AppConfig,
    /// Models in identifier order
    pub models: BTreeMap<String, ModelConfig>,
    pub tools: ToolConfig,
    pub test_cases: Vec<TestCase>,
    pub paths: SuitePaths,
}

impl Suite {
    /// Number of (model, test case) pairs the suite expands to
    pub fn pair_count(&self) -> usize {
        self.models.len() * self.test_cases.len()
    }
}
