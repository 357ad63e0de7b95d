//! Wire format of driver output
//!
//! A driver writes one JSON object per line (streaming) or a single JSON
//! object (non-streaming). Every object has the same optional keys; a
//! chunk usually carries only one or two of them.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ParseError;

/// One unit of driver output
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProtocolChunk {
    /// Reasoning text delta
    pub reasoning_content: Option<String>,
    /// Content text delta
    pub content: Option<String>,
    /// OpenAI-style delta wrapper emitted by some drivers
    pub choice_delta: Option<ChoiceDelta>,
    /// Tool call, possibly one fragment of it
    pub tool_call: Option<ToolCallDelta>,
    /// Token accounting; always the last chunk of a session
    pub usage: Option<UsageReport>,
    /// Model name as reported by the driver
    pub model: Option<String>,
}

impl ProtocolChunk {
    /// A chunk carrying only a content delta
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    /// A chunk carrying only a reasoning delta
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning_content: Some(text.into()),
            ..Default::default()
        }
    }

    /// A chunk carrying only a tool call fragment
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            tool_call: Some(delta),
            ..Default::default()
        }
    }

    /// A terminal usage chunk
    pub fn usage(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            usage: Some(UsageReport {
                prompt_tokens,
                completion_tokens,
                total_tokens: Some(total_tokens),
            }),
            ..Default::default()
        }
    }

    /// The explicit end-of-message marker, if this chunk carries one
    pub fn finish_reason(&self) -> Option<&str> {
        self.choice_delta
            .as_ref()
            .and_then(|delta| delta.finish_reason.as_deref())
    }
}

/// Delta wrapper: `{"content": ..., "finish_reason": ...}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChoiceDelta {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

/// A tool call or a fragment of one
///
/// `arguments` is either a string fragment to be concatenated with the
/// other fragments of the same `call_id`, or an already-structured value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default, deserialize_with = "call_id_from_string_or_number")]
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<Value>,
}

impl ToolCallDelta {
    pub fn fragment(call_id: &str, name: Option<&str>, arguments: &str) -> Self {
        Self {
            call_id: Some(call_id.to_string()),
            name: name.map(str::to_string),
            arguments: Some(Value::String(arguments.to_string())),
        }
    }
}

/// Token counts reported by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UsageReport {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

fn call_id_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CallId {
        Text(String),
        Number(u64),
    }

    Ok(Option::<CallId>::deserialize(deserializer)?.map(|id| match id {
        CallId::Text(text) => text,
        CallId::Number(number) => number.to_string(),
    }))
}

/// Decode one line of streamed output
///
/// Blank lines yield `Ok(None)`. Anything else must be a JSON object whose
/// recognised keys have the right types.
pub fn parse_line(line: &str, line_number: usize) -> Result<Option<ProtocolChunk>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let malformed = |message: String| ParseError::MalformedChunk {
        line: line_number,
        message,
    };

    let value: Value = serde_json::from_str(trimmed).map_err(|e| malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(malformed(format!("expected a JSON object, got {}", kind_of(&value))));
    }

    ProtocolChunk::deserialize(value)
        .map(Some)
        .map_err(|e| malformed(e.to_string()))
}

/// Decode the complete output of a non-streaming driver
///
/// The payload is normally one JSON object, possibly pretty-printed. Drivers
/// that stream anyway are handled by falling back to one chunk per line.
pub fn parse_payload(payload: &str) -> Result<Vec<ProtocolChunk>, ParseError> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }

    if let Ok(Some(chunk)) = parse_line(payload, 1) {
        return Ok(vec![chunk]);
    }

    let mut chunks = Vec::new();
    for (index, line) in payload.lines().enumerate() {
        if let Some(chunk) = parse_line(line, index + 1)? {
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
