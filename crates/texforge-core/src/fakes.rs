//! Scripted process runner for tests.
//!
//! `ScriptedRunner` replays canned steps instead of spawning processes.
//! Primary-engine calls consume the main script in order; auxiliary tool
//! calls consume that tool's queue from [`ScriptedRunner::with_tool`] and
//! succeed silently once it is empty.
//! A step can write or delete files in the request's working directory
//! before its output lines are delivered, mimicking the sidecar files a
//! real engine leaves behind.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RunnerError;
use crate::runner::{ProcessOutcome, ProcessRequest, ProcessRunner};
use crate::tools::is_aux_binary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Spawn,
    Timeout,
}

/// One canned process execution.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStep {
    exit_code: i32,
    stdout: Vec<String>,
    stderr: Vec<String>,
    writes: Vec<(String, String)>,
    removes: Vec<String>,
    failure: Option<Failure>,
}

impl ScriptedStep {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn spawn_failure() -> Self {
        Self {
            failure: Some(Failure::Spawn),
            ..Self::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            failure: Some(Failure::Timeout),
            ..Self::default()
        }
    }

    /// Emit a line on stdout.
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.stdout.push(line.into());
        self
    }

    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stdout.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn stderr_line(mut self, line: impl Into<String>) -> Self {
        self.stderr.push(line.into());
        self
    }

    /// Write `contents` to `name` (relative to the working directory).
    pub fn writes(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.writes.push((name.into(), contents.into()));
        self
    }

    /// Create an empty file, e.g. a trigger sidecar.
    pub fn touches(self, name: impl Into<String>) -> Self {
        self.writes(name, "")
    }

    pub fn removes(mut self, name: impl Into<String>) -> Self {
        self.removes.push(name.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct ScriptedRunner {
    primary: Mutex<VecDeque<ScriptedStep>>,
    tools: Mutex<HashMap<String, VecDeque<ScriptedStep>>>,
    calls: Mutex<Vec<ProcessRequest>>,
}

impl ScriptedRunner {
    pub fn new(primary: Vec<ScriptedStep>) -> Self {
        Self {
            primary: Mutex::new(primary.into()),
            ..Self::default()
        }
    }

    /// Script the next call of the tool whose executable is named `name`.
    pub fn with_tool(self, name: &str, step: ScriptedStep) -> Self {
        self.tools
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(step);
        self
    }

    /// Every request received, in order.
    pub fn calls(&self) -> Vec<ProcessRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests whose executable is named `name`.
    pub fn calls_to(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.display_name() == name)
            .count()
    }

    /// Primary steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.primary.lock().unwrap().len()
    }

    fn next_step(&self, name: &str) -> Option<ScriptedStep> {
        if is_aux_binary(name) {
            let mut tools = self.tools.lock().unwrap();
            let step = tools.get_mut(name).and_then(VecDeque::pop_front);
            return Some(step.unwrap_or_default());
        }
        self.primary.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        request: &ProcessRequest,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<ProcessOutcome, RunnerError> {
        self.calls.lock().unwrap().push(request.clone());
        let program = request.display_name();

        let Some(step) = self.next_step(&program) else {
            return Err(RunnerError::Spawn {
                program,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "script exhausted"),
            });
        };

        match step.failure {
            Some(Failure::Spawn) => {
                return Err(RunnerError::Spawn {
                    program,
                    source: std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        "scripted spawn failure",
                    ),
                })
            }
            Some(Failure::Timeout) => {
                return Err(RunnerError::Timeout {
                    program,
                    timeout: Duration::from_secs(1),
                })
            }
            None => {}
        }

        for (name, contents) in &step.writes {
            std::fs::write(request.cwd.join(name), contents).map_err(|source| RunnerError::Io {
                program: program.clone(),
                source,
            })?;
        }
        for name in &step.removes {
            std::fs::remove_file(request.cwd.join(name)).map_err(|source| RunnerError::Io {
                program: program.clone(),
                source,
            })?;
        }

        let mut stdout = String::new();
        for line in &step.stdout {
            on_line(line);
            stdout.push_str(line);
            stdout.push('\n');
        }
        let mut stderr = String::new();
        for line in &step.stderr {
            on_line(line);
            stderr.push_str(line);
            stderr.push('\n');
        }

        Ok(ProcessOutcome {
            exit_code: step.exit_code,
            stdout,
            stderr,
            duration_ms: 0,
        })
    }
}
