//! Incremental reconstruction of a response from protocol chunks
//!
//! [`StreamParser`] is fed chunks strictly in arrival order. Text deltas are
//! appended, tool-call argument fragments are buffered per `call_id`, and a
//! usage chunk ends the session. [`StreamParser::finish`] produces the one
//! [`FinalizedResponse`] for the session.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::response::{FinalizedResponse, TokenUsage, ToolCall};
use super::stream_json::{ProtocolChunk, ToolCallDelta, UsageReport, parse_line, parse_payload};
use crate::error::ParseError;

/// Whether the parser still accepts chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Keep feeding
    Continue,
    /// A usage chunk was seen; further chunks are ignored
    Terminated,
}

/// A tool call whose arguments may still be arriving
#[derive(Debug)]
struct PendingCall {
    call_id: String,
    name: String,
    buffer: String,
}

impl PendingCall {
    fn decode(self) -> ToolCall {
        let raw = self.buffer.trim();
        let (arguments, malformed) = if raw.is_empty() {
            (Value::Object(Default::default()), false)
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(arguments) => (arguments, false),
                Err(e) => {
                    warn!(
                        call_id = %self.call_id,
                        name = %self.name,
                        error = %e,
                        "Tool call arguments did not decode"
                    );
                    (Value::Null, true)
                }
            }
        };

        ToolCall {
            call_id: self.call_id,
            name: self.name,
            arguments,
            malformed,
        }
    }
}

#[derive(Debug, Default)]
enum ToolCallState {
    #[default]
    None,
    Pending(PendingCall),
    Finalized(ToolCall),
}

/// Accumulates one driver session into a [`FinalizedResponse`]
#[derive(Debug, Default)]
pub struct StreamParser {
    reasoning: String,
    content: String,
    model: Option<String>,
    tool: ToolCallState,
    ignored_call_ids: BTreeSet<String>,
    usage: Option<TokenUsage>,
    lines: usize,
    chunks: usize,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a usage chunk has been consumed
    pub fn is_terminated(&self) -> bool {
        self.usage.is_some()
    }

    /// Decode and apply one line of streamed output
    pub fn push_line(&mut self, line: &str) -> Result<Feed, ParseError> {
        self.lines += 1;
        match parse_line(line, self.lines)? {
            Some(chunk) => Ok(self.push(chunk)),
            None => Ok(self.feed_state()),
        }
    }

    /// Decode and apply the complete output of a non-streaming driver
    pub fn push_payload(&mut self, payload: &str) -> Result<Feed, ParseError> {
        for chunk in parse_payload(payload)? {
            if self.push(chunk) == Feed::Terminated {
                break;
            }
        }
        Ok(self.feed_state())
    }

    /// Apply one decoded chunk
    pub fn push(&mut self, chunk: ProtocolChunk) -> Feed {
        if self.is_terminated() {
            debug!("Ignoring chunk received after usage");
            return Feed::Terminated;
        }
        self.chunks += 1;

        if let Some(model) = chunk.model {
            self.model = Some(model);
        }
        if let Some(reasoning) = chunk.reasoning_content {
            self.reasoning.push_str(&reasoning);
        }
        if let Some(content) = chunk.content {
            self.content.push_str(&content);
        }

        let mut end_marker = false;
        if let Some(delta) = chunk.choice_delta {
            if let Some(content) = delta.content {
                self.content.push_str(&content);
            }
            end_marker = delta.finish_reason.is_some();
        }

        if let Some(call) = chunk.tool_call {
            self.apply_tool_call(call);
        }

        if end_marker {
            self.finalize_pending();
        }

        if let Some(usage) = chunk.usage {
            self.finalize_pending();
            self.usage = Some(usage_from_report(usage));
            return Feed::Terminated;
        }

        Feed::Continue
    }

    /// Close the session and build the response
    pub fn finish(mut self, elapsed: Duration) -> FinalizedResponse {
        self.finalize_pending();

        let tool_call = match self.tool {
            ToolCallState::Finalized(call) if call.name.is_empty() => {
                debug!(call_id = %call.call_id, "Dropping tool call that never named a tool");
                None
            }
            ToolCallState::Finalized(call) => Some(call),
            ToolCallState::None | ToolCallState::Pending(_) => None,
        };

        FinalizedResponse {
            reasoning_content: self.reasoning,
            content: self.content,
            tool_call,
            usage_reported: self.usage.is_some(),
            usage: self.usage.unwrap_or_default(),
            model: self.model,
            chunk_count: self.chunks,
            ignored_tool_calls: self.ignored_call_ids.len(),
            elapsed,
        }
    }

    fn feed_state(&self) -> Feed {
        if self.is_terminated() {
            Feed::Terminated
        } else {
            Feed::Continue
        }
    }

    fn apply_tool_call(&mut self, delta: ToolCallDelta) {
        // A different call_id closes whatever is still buffering
        let superseded = match (&self.tool, &delta.call_id) {
            (ToolCallState::Pending(pending), Some(call_id)) => *call_id != pending.call_id,
            _ => false,
        };
        if superseded {
            self.finalize_pending();
        }

        match &mut self.tool {
            ToolCallState::None => {
                let mut pending = PendingCall {
                    call_id: delta.call_id.unwrap_or_default(),
                    name: delta.name.unwrap_or_default(),
                    buffer: String::new(),
                };
                debug!(call_id = %pending.call_id, name = %pending.name, "Tool call started");
                match delta.arguments {
                    Some(Value::String(fragment)) => pending.buffer.push_str(&fragment),
                    Some(complete) => {
                        self.tool = ToolCallState::Finalized(ToolCall {
                            call_id: pending.call_id,
                            name: pending.name,
                            arguments: complete,
                            malformed: false,
                        });
                        return;
                    }
                    None => {}
                }
                self.tool = ToolCallState::Pending(pending);
            }
            ToolCallState::Pending(pending) => {
                if pending.name.is_empty() {
                    if let Some(name) = delta.name {
                        pending.name = name;
                    }
                }
                match delta.arguments {
                    Some(Value::String(fragment)) => pending.buffer.push_str(&fragment),
                    Some(complete) => {
                        let call = ToolCall {
                            call_id: std::mem::take(&mut pending.call_id),
                            name: std::mem::take(&mut pending.name),
                            arguments: complete,
                            malformed: false,
                        };
                        self.tool = ToolCallState::Finalized(call);
                    }
                    None => {}
                }
            }
            ToolCallState::Finalized(done) => match delta.call_id {
                Some(call_id) if call_id != done.call_id => {
                    if self.ignored_call_ids.insert(call_id.clone()) {
                        debug!(
                            call_id = %call_id,
                            kept = %done.call_id,
                            "Ignoring additional tool call"
                        );
                    }
                }
                _ => debug!(call_id = %done.call_id, "Ignoring fragment of finalized tool call"),
            },
        }
    }

    fn finalize_pending(&mut self) {
        self.tool = match std::mem::take(&mut self.tool) {
            ToolCallState::Pending(pending) => ToolCallState::Finalized(pending.decode()),
            other => other,
        };
    }
}

fn usage_from_report(report: UsageReport) -> TokenUsage {
    let total = report
        .total_tokens
        .unwrap_or(report.prompt_tokens.saturating_add(report.completion_tokens));
    TokenUsage::new(report.prompt_tokens, report.completion_tokens, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::stream_json::ChoiceDelta;

    fn finish(parser: StreamParser) -> FinalizedResponse {
        parser.finish(Duration::from_millis(5))
    }

    // ==================== Text Accumulation Tests ====================

    #[test]
    fn content_deltas_concatenate_in_order() {
        let mut parser = StreamParser::new();
        for piece in ["The ", "weather ", "is ", "sunny."] {
            assert_eq!(parser.push(ProtocolChunk::content(piece)), Feed::Continue);
        }
        let response = finish(parser);
        assert_eq!(response.content, "The weather is sunny.");
        assert_eq!(response.chunk_count, 4);
    }

    #[test]
    fn single_chunk_passes_through_unchanged() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::reasoning("  keep   spacing\n"));
        let response = finish(parser);
        assert_eq!(response.reasoning_content, "  keep   spacing\n");
    }

    #[test]
    fn reasoning_and_content_accumulate_separately() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::reasoning("think "));
        parser.push(ProtocolChunk::content("answer "));
        parser.push(ProtocolChunk::reasoning("more"));
        parser.push(ProtocolChunk::content("done"));
        let response = finish(parser);
        assert_eq!(response.reasoning_content, "think more");
        assert_eq!(response.content, "answer done");
    }

    #[test]
    fn choice_delta_content_appends_after_content() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk {
            content: Some("a".to_string()),
            choice_delta: Some(ChoiceDelta {
                content: Some("b".to_string()),
                finish_reason: None,
            }),
            ..Default::default()
        });
        assert_eq!(finish(parser).content, "ab");
    }

    #[test]
    fn multibyte_deltas_survive_concatenation() {
        let mut parser = StreamParser::new();
        parser.push_line(r#"{"content":"東京"}"#).unwrap();
        parser.push_line(r#"{"content":"の天気は☀️"}"#).unwrap();
        assert_eq!(finish(parser).content, "東京の天気は☀️");
    }

    // ==================== Usage / Termination Tests ====================

    #[test]
    fn usage_chunk_is_terminal_and_exact() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::content("hi"));
        assert_eq!(parser.push(ProtocolChunk::usage(10, 4, 14)), Feed::Terminated);
        assert_eq!(parser.push(ProtocolChunk::content(" ignored")), Feed::Terminated);

        let response = finish(parser);
        assert_eq!(response.content, "hi");
        assert_eq!(response.usage, TokenUsage::new(10, 4, 14));
        assert!(response.usage_reported);
    }

    #[test]
    fn missing_usage_finalizes_with_zero_usage() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::content("partial"));
        let response = finish(parser);
        assert_eq!(response.usage, TokenUsage::default());
        assert!(!response.usage_reported);
        assert_eq!(response.content, "partial");
    }

    #[test]
    fn empty_session_finalizes() {
        let response = finish(StreamParser::new());
        assert!(response.content.is_empty());
        assert!(response.tool_call.is_none());
        assert_eq!(response.chunk_count, 0);
    }

    #[test]
    fn usage_total_defaults_to_sum() {
        let mut parser = StreamParser::new();
        parser
            .push_line(r#"{"usage":{"prompt_tokens":7,"completion_tokens":3}}"#)
            .unwrap();
        assert_eq!(finish(parser).usage.total_tokens, 10);
    }

    #[test]
    fn usage_total_saturates_instead_of_overflowing() {
        let mut parser = StreamParser::new();
        parser
            .push_line(r#"{"usage":{"prompt_tokens":18446744073709551615,"completion_tokens":1}}"#)
            .unwrap();
        let usage = finish(parser).usage;
        assert_eq!(usage.prompt_tokens, u64::MAX);
        assert_eq!(usage.total_tokens, u64::MAX);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut parser = StreamParser::new();
        assert_eq!(parser.push_line("").unwrap(), Feed::Continue);
        assert_eq!(parser.push_line("   ").unwrap(), Feed::Continue);
        assert_eq!(finish(parser).chunk_count, 0);
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let mut parser = StreamParser::new();
        parser.push_line(r#"{"content":"ok"}"#).unwrap();
        parser.push_line("").unwrap();
        let err = parser.push_line("{broken").unwrap_err();
        assert!(matches!(err, ParseError::MalformedChunk { line: 3, .. }));
    }

    #[test]
    fn driver_model_name_is_kept() {
        let mut parser = StreamParser::new();
        parser
            .push_line(r#"{"model":"qwen","content":"x","usage":null}"#)
            .unwrap();
        assert_eq!(finish(parser).model.as_deref(), Some("qwen"));
    }

    // ==================== Tool Call Tests ====================

    #[test]
    fn tool_call_split_across_three_chunks() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment(
            "1",
            Some("get_weather"),
            "{\"loc",
        )));
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment("1", None, "ation\":\"")));
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment("1", None, "Tokyo\"}")));
        parser.push(ProtocolChunk::usage(1, 1, 2));

        let call = finish(parser).tool_call.unwrap();
        assert_eq!(call.call_id, "1");
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, serde_json::json!({"location": "Tokyo"}));
        assert!(!call.malformed);
    }

    #[test]
    fn tool_call_from_wire_lines() {
        let mut parser = StreamParser::new();
        let lines = [
            r#"{"tool_call":{"call_id":"1","name":"get_weather","arguments":"{\"loc"}}"#,
            r#"{"tool_call":{"call_id":"1","arguments":"ation\":\""}}"#,
            r#"{"tool_call":{"call_id":"1","arguments":"Tokyo\"}"}}"#,
            r#"{"usage":{"prompt_tokens":20,"completion_tokens":8,"total_tokens":28}}"#,
        ];
        for line in lines {
            parser.push_line(line).unwrap();
        }
        let response = finish(parser);
        assert_eq!(
            response.tool_call.unwrap().arguments,
            serde_json::json!({"location": "Tokyo"})
        );
        assert_eq!(response.usage, TokenUsage::new(20, 8, 28));
    }

    #[test]
    fn structured_arguments_finalize_immediately() {
        let mut parser = StreamParser::new();
        parser
            .push_line(r#"{"tool_call":{"call_id":"a","name":"search","arguments":{"q":"rust"}}}"#)
            .unwrap();
        let call = finish(parser).tool_call.unwrap();
        assert_eq!(call.arguments, serde_json::json!({"q": "rust"}));
    }

    #[test]
    fn undecodable_arguments_mark_call_malformed() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment(
            "1",
            Some("get_weather"),
            "{\"location\": \"Tok",
        )));
        let response = finish(parser);
        let call = response.tool_call.unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, Value::Null);
        assert!(call.malformed);
    }

    #[test]
    fn arguments_with_trailing_content_are_malformed() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment(
            "1",
            Some("f"),
            "{} extra",
        )));
        assert!(finish(parser).tool_call.unwrap().malformed);
    }

    #[test]
    fn call_without_arguments_gets_empty_object() {
        let mut parser = StreamParser::new();
        parser
            .push_line(r#"{"tool_call":{"call_id":"1","name":"list_files"}}"#)
            .unwrap();
        let call = finish(parser).tool_call.unwrap();
        assert_eq!(call.arguments, serde_json::json!({}));
        assert!(!call.malformed);
    }

    #[test]
    fn tool_call_without_name_is_dropped() {
        let mut parser = StreamParser::new();
        parser
            .push_line(r#"{"tool_call":{"call_id":"1","arguments":"{}"}}"#)
            .unwrap();
        parser
            .push_line(r#"{"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#)
            .unwrap();
        let response = finish(parser);
        assert!(response.tool_call.is_none());
        assert_eq!(response.tool_name(), None);
    }

    #[test]
    fn first_tool_call_wins() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment(
            "1",
            Some("get_weather"),
            "{\"location\":\"Paris\"}",
        )));
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment(
            "2",
            Some("search"),
            "{\"q\":",
        )));
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment("2", None, "\"x\"}")));

        let response = finish(parser);
        let call = response.tool_call.unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, serde_json::json!({"location": "Paris"}));
        assert_eq!(response.ignored_tool_calls, 1);
    }

    #[test]
    fn finish_reason_closes_pending_call() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment(
            "1",
            Some("get_weather"),
            "{\"location\":\"Oslo\"}",
        )));
        parser
            .push_line(r#"{"choice_delta":{"content":null,"finish_reason":"tool_calls"}}"#)
            .unwrap();
        // Late fragment for the closed call must not corrupt it
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment("1", None, "garbage")));

        let call = finish(parser).tool_call.unwrap();
        assert_eq!(call.arguments, serde_json::json!({"location": "Oslo"}));
        assert!(!call.malformed);
    }

    #[test]
    fn name_can_arrive_after_first_fragment() {
        let mut parser = StreamParser::new();
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment("1", None, "{")));
        parser.push(ProtocolChunk::tool_call(ToolCallDelta::fragment(
            "1",
            Some("get_weather"),
            "}",
        )));
        assert_eq!(finish(parser).tool_name(), Some("get_weather"));
    }

    // ==================== Payload Tests ====================

    #[test]
    fn non_streaming_payload_is_one_chunk() {
        let mut parser = StreamParser::new();
        let payload = r#"{"content":"Sunny in Tokyo","tool_call":{"call_id":"c","name":"get_weather","arguments":"{\"location\":\"Tokyo\"}"},"usage":{"prompt_tokens":5,"completion_tokens":6,"total_tokens":11}}"#;
        assert_eq!(parser.push_payload(payload).unwrap(), Feed::Terminated);

        let response = finish(parser);
        assert_eq!(response.content, "Sunny in Tokyo");
        assert_eq!(response.tool_name(), Some("get_weather"));
        assert_eq!(response.usage.total_tokens, 11);
        assert_eq!(response.chunk_count, 1);
    }
}
