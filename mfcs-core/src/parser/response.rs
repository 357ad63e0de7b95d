//! The finalized, immutable result of one driver session

use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Token usage of one response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// A fully assembled tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    /// Decoded arguments; `Null` when the buffer never decoded
    pub arguments: Value,
    /// Set when the argument fragments did not form valid JSON
    pub malformed: bool,
}

/// A model response reconstructed from protocol chunks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedResponse {
    pub reasoning_content: String,
    pub content: String,
    pub tool_call: Option<ToolCall>,
    pub usage: TokenUsage,
    /// False when the session ended without a usage chunk
    pub usage_reported: bool,
    /// Model name as reported by the driver, if any
    pub model: Option<String>,
    /// Number of chunks consumed
    pub chunk_count: usize,
    /// Distinct tool calls dropped because one was already finalized
    pub ignored_tool_calls: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
}

impl FinalizedResponse {
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_call.as_ref().map(|call| call.name.as_str())
    }
}

/// Serializes a [`Duration`] as fractional seconds.
pub(crate) fn as_secs_f64<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
