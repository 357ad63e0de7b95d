//! Driver invocation boundary
//!
//! A driver is the external program that puts one test query to one model
//! and writes protocol chunks to stdout. [`Invocation`] describes a single
//! launch; [`Driver`] performs it and hands back the raw output.

mod invocation;
mod mock;
mod subprocess;

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::DriverError;

pub use invocation::{ENV_API_BASE, ENV_API_KEY, ENV_MODEL, Invocation, expand_template};
pub use mock::{ScriptedDriver, ScriptedRun};
pub use subprocess::SubprocessDriver;

/// Raw driver output: one item per line when streaming, one item holding the
/// whole payload otherwise.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, DriverError>> + Send>>;

/// Output of a launched driver
///
/// Owns the underlying process (if any); dropping it terminates the driver.
pub struct DriverOutput {
    /// Whether items are individual lines or a single payload
    pub stream: bool,
    pub chunks: ChunkStream,
}

impl DriverOutput {
    pub fn new(stream: bool, chunks: ChunkStream) -> Self {
        Self { stream, chunks }
    }
}

impl std::fmt::Debug for DriverOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverOutput")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Launches driver programs
///
/// One driver is shared by all pairs of a run; each `launch` must be
/// independent of the others.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn launch(&self, invocation: &Invocation) -> Result<DriverOutput, DriverError>;
}
