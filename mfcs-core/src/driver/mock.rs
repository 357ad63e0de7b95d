//! Scripted driver for testing
//!
//! ScriptedDriver returns canned output per (model, test case) so the
//! orchestrator can be exercised without spawning processes: slow drivers,
//! drivers that never finish, and drivers that fail to launch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use super::{Driver, DriverOutput, Invocation};
use crate::error::DriverError;

/// Canned behaviour for one launch
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    /// Items to yield; `Err` becomes a read error
    items: Vec<Result<String, String>>,
    stream: bool,
    /// Pause before every item
    delay: Duration,
    /// Never end the stream after the last item
    hang: bool,
    fail_launch: bool,
}

impl ScriptedRun {
    /// Streamed output, one item per line
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: lines.into_iter().map(|line| Ok(line.into())).collect(),
            stream: true,
            ..Default::default()
        }
    }

    /// Non-streamed output: one payload
    pub fn payload(payload: impl Into<String>) -> Self {
        Self {
            items: vec![Ok(payload.into())],
            stream: false,
            ..Default::default()
        }
    }

    /// A driver that launches but never writes or exits
    pub fn hang() -> Self {
        Self {
            stream: true,
            hang: true,
            ..Default::default()
        }
    }

    /// A driver whose program cannot be started
    pub fn launch_failure() -> Self {
        Self {
            fail_launch: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep the stream open after the scripted items
    #[must_use]
    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Append a read error after the scripted items
    #[must_use]
    pub fn then_read_error(mut self, message: impl Into<String>) -> Self {
        self.items.push(Err(message.into()));
        self
    }
}

/// Decrements the live count when the output is dropped
struct LiveGuard {
    live: Arc<AtomicUsize>,
}

impl LiveGuard {
    fn enter(live: Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { live }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Driver returning scripted output
///
/// Runs are looked up by `(model_id, test_case_id)`, falling back to the
/// default run.
#[derive(Default)]
pub struct ScriptedDriver {
    runs: HashMap<(String, String), ScriptedRun>,
    default_run: ScriptedRun,
    launches: Mutex<Vec<(String, String)>>,
    live: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl ScriptedDriver {
    /// Every pair gets `run` unless scripted otherwise
    pub fn new(default_run: ScriptedRun) -> Self {
        Self {
            default_run,
            ..Default::default()
        }
    }

    /// Script the run for one pair
    #[must_use]
    pub fn with_run(mut self, model_id: &str, test_case_id: &str, run: ScriptedRun) -> Self {
        self.runs
            .insert((model_id.to_string(), test_case_id.to_string()), run);
        self
    }

    /// Pairs launched so far, in launch order
    pub fn launches(&self) -> Vec<(String, String)> {
        self.launches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Highest number of outputs alive at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Outputs currently alive
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn launch(&self, invocation: &Invocation) -> Result<DriverOutput, DriverError> {
        let key = (invocation.model_id.clone(), invocation.test_case_id.clone());
        let run = self.runs.get(&key).unwrap_or(&self.default_run).clone();

        self.launches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key);

        if run.fail_launch {
            return Err(DriverError::NotFound {
                program: invocation.program.clone(),
            });
        }

        let guard = LiveGuard::enter(self.live.clone(), &self.peak);
        let state = (run.items.into_iter(), guard);
        let (delay, hang) = (run.delay, run.hang);

        let chunks = stream::unfold(state, move |(mut items, guard)| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match items.next() {
                Some(Ok(line)) => Some((Ok(line), (items, guard))),
                Some(Err(message)) => Some((
                    Err(DriverError::Read(std::io::Error::other(message))),
                    (items, guard),
                )),
                None => {
                    if hang {
                        std::future::pending::<()>().await;
                    }
                    None
                }
            }
        });

        Ok(DriverOutput::new(run.stream, Box::pin(chunks)))
    }
}
