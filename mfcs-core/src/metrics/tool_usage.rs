//! Tool usage correctness

use serde::Serialize;

use crate::parser::FinalizedResponse;
use crate::types::ToolExpectation;

/// Outcome of the tool usage check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolUsageScore {
    pub expected: ToolExpectation,
    /// Name of the tool the response called, if any
    pub actual: Option<String>,
    pub passed: bool,
}

/// Check the response's tool call against the expectation
///
/// Returns `None` when there is no expectation, so the check neither
/// passes nor fails. A malformed call still counts as a call by name.
pub fn score_tool_usage(
    expected: &ToolExpectation,
    response: &FinalizedResponse,
) -> Option<ToolUsageScore> {
    let actual = response.tool_name();
    let passed = match expected {
        ToolExpectation::Absent => return None,
        ToolExpectation::RequireAny => actual.is_some(),
        ToolExpectation::Forbidden => actual.is_none(),
        ToolExpectation::RequireNamed(name) => actual == Some(name.as_str()),
    };

    Some(ToolUsageScore {
        expected: expected.clone(),
        actual: actual.map(str::to_string),
        passed,
    })
}
