//! Child process execution with concurrent stream draining.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RunnerError;

/// One process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Added to the inherited environment.
    pub env: BTreeMap<String, OsString>,
}

impl ProcessRequest {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, OsString>) -> Self {
        self.env = env;
        self
    }

    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }
}

/// Result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; -1 when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a process to completion, handing every output line to `on_line` in
/// arrival order. `on_line` is only ever called from the awaiting task.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        request: &ProcessRequest,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<ProcessOutcome, RunnerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

const LINE_CHANNEL_CAPACITY: usize = 256;

fn spawn_reader<R>(reader: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send((stream, line)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(?stream, error = %e, "output stream closed with error");
                    break;
                }
            }
        }
    });
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    timeout: Option<Duration>,
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill processes that run longer than `timeout`. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        request: &ProcessRequest,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<ProcessOutcome, RunnerError> {
        let start = Instant::now();
        let program = request.display_name();

        let mut child = Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let (tx, mut rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let drive = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            while let Some((stream, line)) = rx.recv().await {
                on_line(&line);
                let sink = match stream {
                    Stream::Stdout => &mut stdout,
                    Stream::Stderr => &mut stderr,
                };
                sink.push_str(&line);
                sink.push('\n');
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let finished = match self.timeout {
            Some(timeout) => {
                let outcome = tokio::time::timeout(timeout, drive).await;
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(program = %program, timeout_secs = timeout.as_secs(), "process timed out");
                        if let Err(e) = child.kill().await {
                            debug!(error = %e, "kill after timeout failed");
                        }
                        return Err(RunnerError::Timeout { program, timeout });
                    }
                }
            }
            None => drive.await,
        };
        let (status, stdout, stderr) =
            finished.map_err(|source| RunnerError::Io {
                program: program.clone(),
                source,
            })?;

        let outcome = ProcessOutcome {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(program = %program, exit_code = outcome.exit_code, duration_ms = outcome.duration_ms, "process finished");
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, cwd: &std::path::Path) -> ProcessRequest {
        ProcessRequest::new("sh", vec!["-c".to_string(), script.to_string()], cwd)
    }

    #[tokio::test]
    async fn test_streams_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        let outcome = TokioProcessRunner::new()
            .run(&sh("echo one; echo two; echo three", dir.path()), &mut |line: &str| {
                seen.push(line.to_string())
            })
            .await
            .expect("run");

        assert!(outcome.success());
        assert_eq!(seen, vec!["one", "two", "three"]);
        assert_eq!(outcome.stdout, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn test_captures_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = TokioProcessRunner::new()
            .run(&sh("echo oops >&2; exit 3", dir.path()), &mut |_: &str| {})
            .await
            .expect("run");

        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.stderr, "oops\n");
        assert!(outcome.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams_does_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        let script = "i=0; while [ $i -lt 5000 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done";
        let mut count = 0usize;
        let outcome = TokioProcessRunner::new()
            .run(&sh(script, dir.path()), &mut |_: &str| count += 1)
            .await
            .expect("run");

        assert!(outcome.success());
        assert_eq!(count, 10_000);
    }

    #[tokio::test]
    async fn test_env_and_cwd_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = BTreeMap::new();
        env.insert("TEXFORGE_TEST_VALUE".to_string(), OsString::from("42"));
        let request = sh("echo $TEXFORGE_TEST_VALUE; touch marker", dir.path()).with_env(env);

        let outcome = TokioProcessRunner::new()
            .run(&request, &mut |_: &str| {})
            .await
            .expect("run");

        assert_eq!(outcome.stdout.trim(), "42");
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = ProcessRequest::new("texforge-no-such-binary", Vec::new(), dir.path());
        let err = TokioProcessRunner::new()
            .run(&request, &mut |_: &str| {})
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let err = TokioProcessRunner::new()
            .with_timeout(Duration::from_millis(200))
            .run(&sh("sleep 5", dir.path()), &mut |_: &str| {})
            .await
            .expect_err("should time out");
        assert!(matches!(err, RunnerError::Timeout { .. }));
    }
}
