//! Driver that runs the model-under-test harness as a child process
//!
//! The child is owned by the returned chunk stream and is killed when the
//! stream is dropped, so a timed-out or cancelled pair never leaves an
//! orphaned process behind.

use std::process::Stdio;

use async_trait::async_trait;
use futures_util::stream;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Split};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use super::invocation::{ENV_API_KEY, Invocation};
use super::{Driver, DriverOutput};
use crate::error::DriverError;

/// Launches `AppConfig.command` once per pair
#[derive(Debug, Clone, Default)]
pub struct SubprocessDriver;

impl SubprocessDriver {
    pub fn new() -> Self {
        Self
    }

    /// Build the command for one invocation
    ///
    /// Kept separate from spawning so command construction can be verified
    /// without running anything.
    pub fn build_command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.envs(&invocation.env);
        if let Some(key) = &invocation.api_key {
            cmd.env(ENV_API_KEY, key.expose_secret());
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

#[async_trait]
impl Driver for SubprocessDriver {
    async fn launch(&self, invocation: &Invocation) -> Result<DriverOutput, DriverError> {
        let mut child = Self::build_command(invocation).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DriverError::NotFound {
                    program: invocation.program.clone(),
                }
            } else {
                DriverError::SpawnFailed(e)
            }
        })?;

        let stdout = child.stdout.take().ok_or(DriverError::StdoutUnavailable)?;

        if let Some(stderr) = child.stderr.take() {
            let model_id = invocation.model_id.clone();
            let test_case_id = invocation.test_case_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(model_id = %model_id, test_case_id = %test_case_id, "driver stderr: {}", line);
                }
            });
        }

        debug!(
            program = %invocation.program,
            model_id = %invocation.model_id,
            test_case_id = %invocation.test_case_id,
            stream = invocation.stream,
            "Driver launched"
        );

        let running = RunningDriver {
            child,
            label: format!("{}/{}", invocation.model_id, invocation.test_case_id),
        };

        let chunks = if invocation.stream {
            line_stream(running, stdout)
        } else {
            payload_stream(running, stdout)
        };
        Ok(DriverOutput::new(invocation.stream, chunks))
    }
}

/// A spawned child plus a label for log lines
struct RunningDriver {
    child: Child,
    label: String,
}

impl RunningDriver {
    /// Reap the child once its stdout is exhausted
    ///
    /// A non-zero exit is logged, not raised: whatever the driver printed is
    /// still scored.
    async fn reap(&mut self) {
        match self.child.wait().await {
            Ok(status) if status.success() => {
                debug!(pair = %self.label, "Driver exited cleanly");
            }
            Ok(status) => {
                warn!(pair = %self.label, code = ?status.code(), "Driver exited with non-zero status");
            }
            Err(e) => {
                warn!(pair = %self.label, error = %e, "Failed to wait for driver");
            }
        }
    }
}

struct LineState {
    driver: RunningDriver,
    lines: Split<BufReader<ChildStdout>>,
    done: bool,
}

/// One item per newline-delimited line; invalid UTF-8 is replaced
fn line_stream(driver: RunningDriver, stdout: ChildStdout) -> super::ChunkStream {
    let state = LineState {
        driver,
        lines: BufReader::new(stdout).split(b'\n'),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        match state.lines.next_segment().await {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes).into_owned();
                Some((Ok(line), state))
            }
            Ok(None) => {
                state.driver.reap().await;
                None
            }
            Err(e) => {
                state.done = true;
                Some((Err(DriverError::Read(e)), state))
            }
        }
    }))
}

/// A single item holding all of stdout
fn payload_stream(mut driver: RunningDriver, mut stdout: ChildStdout) -> super::ChunkStream {
    Box::pin(stream::once(async move {
        let mut bytes = Vec::new();
        stdout
            .read_to_end(&mut bytes)
            .await
            .map_err(DriverError::Read)?;
        driver.reap().await;
        Ok::<_, DriverError>(String::from_utf8_lossy(&bytes).into_owned())
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::ffi::OsStr;

    use super::*;
    use crate::types::ApiKey;

    fn invocation() -> Invocation {
        Invocation {
            model_id: "gpt".to_string(),
            test_case_id: "weather.json".to_string(),
            program: "python".to_string(),
            args: vec!["driver.py".to_string(), "--model_name".to_string(), "gpt".to_string()],
            env: BTreeMap::from([("MFCS_MODEL".to_string(), "gpt".to_string())]),
            api_key: Some(ApiKey::new("sk-test")),
            stream: true,
            query: "Weather?".to_string(),
        }
    }

    // ==================== build_command Tests ====================

    #[test]
    fn build_command_uses_program_and_args() {
        let cmd = SubprocessDriver::build_command(&invocation());
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "python");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(
            args,
            vec![OsStr::new("driver.py"), OsStr::new("--model_name"), OsStr::new("gpt")]
        );
    }

    #[test]
    fn build_command_sets_env_and_key() {
        let cmd = SubprocessDriver::build_command(&invocation());
        let envs: BTreeMap<_, _> = cmd.as_std().get_envs().collect();
        assert_eq!(envs[OsStr::new("MFCS_MODEL")], Some(OsStr::new("gpt")));
        assert_eq!(envs[OsStr::new(ENV_API_KEY)], Some(OsStr::new("sk-test")));
    }

    #[test]
    fn build_command_keeps_key_out_of_args() {
        let cmd = SubprocessDriver::build_command(&invocation());
        assert!(!cmd.as_std().get_args().any(|arg| arg == "sk-test"));
    }

    // ==================== launch Tests ====================

    #[tokio::test]
    async fn launch_missing_program_is_not_found() {
        let mut invocation = invocation();
        invocation.program = "mfcs-driver-that-does-not-exist".to_string();
        let err = SubprocessDriver::new().launch(&invocation).await.unwrap_err();
        match err {
            DriverError::NotFound { program } => {
                assert_eq!(program, "mfcs-driver-that-does-not-exist")
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
