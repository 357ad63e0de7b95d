//! Protocol stream parser
//!
//! Turns raw driver output into one [`FinalizedResponse`] per session.

mod accumulator;
mod response;
pub mod stream_json;

pub use accumulator::{Feed, StreamParser};
pub(crate) use response::as_secs_f64;
pub use response::{FinalizedResponse, TokenUsage, ToolCall};
pub use stream_json::{ChoiceDelta, ProtocolChunk, ToolCallDelta, UsageReport};
