//! Convergence-driven build loop.
//!
//! One iteration is one primary pass. After a clean pass, auxiliary tools
//! run when their trigger files appear (each at most once per build); a
//! first-time auxiliary run or a rerun phrase in the log forces another
//! pass. The loop stops at the first failure or when the rerun budget is
//! spent. The wrapper backend reruns internally, so it gets a single pass.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use texforge_log::{read_log, rerun_reason, DiagnosticMessage, LogParser, MessageCounts};
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::engine::{Backend, EngineCommand, EngineFeatures};
use crate::error::{BuildError, Result, RunnerError};
use crate::obs;
use crate::runner::{ProcessOutcome, ProcessRequest, ProcessRunner};
use crate::tools::{aux_invocation, planned_tools, AuxTool, BinaryCache, ToolOverrides};

/// Default number of primary passes before giving up.
pub const DEFAULT_RERUN_BUDGET: u32 = 5;

/// One execution of an auxiliary tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuxiliaryRun {
    pub tool: AuxTool,
    pub trigger_file: PathBuf,
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl AuxiliaryRun {
    fn failure_message(&self) -> DiagnosticMessage {
        let details = self
            .stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|line| !line.trim().is_empty())
            .map(String::from)
            .collect();
        DiagnosticMessage::synthetic_error(format!(
            "{} failed with exit code {}",
            self.tool, self.return_code
        ))
        .with_details(details)
    }
}

/// One primary pass and the slice of `BuildResult::messages` it produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassReport {
    pub pass: u32,
    pub return_code: i32,
    pub messages: Range<usize>,
    pub duration_ms: u64,
}

/// How the build ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    Converged,
    CompileFailed,
    AuxiliaryFailed,
    /// A later process could not be spawned or timed out.
    Aborted,
    BudgetExhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildResult {
    pub build_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Exit code of the process that decided the outcome; -1 when that
    /// process never produced one.
    pub return_code: i32,
    pub outcome: BuildOutcome,
    pub converged: bool,
    pub pass_count: u32,
    pub command: EngineCommand,
    /// Every message from every pass, followed by any synthetic errors.
    pub messages: Vec<DiagnosticMessage>,
    pub passes: Vec<PassReport>,
    pub aux_runs: Vec<AuxiliaryRun>,
}

impl BuildResult {
    pub fn succeeded(&self) -> bool {
        self.converged && self.return_code == 0
    }

    pub fn counts(&self) -> MessageCounts {
        MessageCounts::tally(&self.messages)
    }

    /// Messages produced by a single pass (1-based).
    pub fn pass_messages(&self, pass: u32) -> &[DiagnosticMessage] {
        self.passes
            .iter()
            .find(|report| report.pass == pass)
            .and_then(|report| self.messages.get(report.messages.clone()))
            .unwrap_or_default()
    }

    /// Path of the produced document, present only on success.
    pub fn artifact(&self) -> Option<&std::path::Path> {
        self.succeeded().then_some(self.command.artifact_path.as_path())
    }
}

/// Accumulates state across passes of one build.
struct BuildState {
    build_id: Uuid,
    started_at: DateTime<Utc>,
    clock: Instant,
    messages: Vec<DiagnosticMessage>,
    passes: Vec<PassReport>,
    aux_runs: Vec<AuxiliaryRun>,
}

impl BuildState {
    fn new() -> Self {
        Self {
            build_id: Uuid::new_v4(),
            started_at: Utc::now(),
            clock: Instant::now(),
            messages: Vec::new(),
            passes: Vec::new(),
            aux_runs: Vec::new(),
        }
    }

    fn finish(self, command: &EngineCommand, outcome: BuildOutcome, return_code: i32) -> BuildResult {
        let pass_count = self.passes.len() as u32;
        let converged = outcome == BuildOutcome::Converged;
        let duration_ms = self.clock.elapsed().as_millis() as u64;
        obs::emit_build_finished(converged, pass_count, return_code, duration_ms);
        BuildResult {
            build_id: self.build_id,
            started_at: self.started_at,
            duration_ms,
            return_code,
            outcome,
            converged,
            pass_count,
            command: command.clone(),
            messages: self.messages,
            passes: self.passes,
            aux_runs: self.aux_runs,
        }
    }
}

pub struct ConvergenceDriver<'a> {
    runner: &'a dyn ProcessRunner,
    cache: &'a BinaryCache,
    overrides: &'a ToolOverrides,
    env: BTreeMap<String, OsString>,
}

impl<'a> ConvergenceDriver<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        cache: &'a BinaryCache,
        overrides: &'a ToolOverrides,
    ) -> Self {
        Self {
            runner,
            cache,
            overrides,
            env: BTreeMap::new(),
        }
    }

    /// Environment handed to every spawned process.
    pub fn with_env(mut self, env: BTreeMap<String, OsString>) -> Self {
        self.env = env;
        self
    }

    /// Run passes until the document converges, something fails, or
    /// `rerun_budget` passes have been spent.
    ///
    /// Fails only when the first primary pass cannot be spawned.
    pub async fn run(
        &self,
        command: &EngineCommand,
        features: &EngineFeatures,
        rerun_budget: u32,
    ) -> Result<BuildResult> {
        let state = BuildState::new();
        let span = obs::build_span(
            &state.build_id.to_string(),
            &command.document.display().to_string(),
        );
        self.drive(state, command, features, rerun_budget)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        mut state: BuildState,
        command: &EngineCommand,
        features: &EngineFeatures,
        rerun_budget: u32,
    ) -> Result<BuildResult> {
        obs::emit_build_started(command.program(), rerun_budget);

        let cwd = command.working_dir();
        let stem = command.stem();
        let tools = planned_tools(features, self.cache, self.overrides);
        let mut already_ran: HashSet<AuxTool> = HashSet::new();
        let mut last_code = 0;

        for pass in 1..=rerun_budget {
            let request = ProcessRequest::new(
                command.program(),
                command.args().to_vec(),
                cwd.clone(),
            )
            .with_env(self.env.clone());

            let start = state.messages.len();
            let outcome = match self.primary_pass(&request, &mut state.messages).await {
                Ok(outcome) => outcome,
                Err(RunnerError::Spawn { program, source }) if pass == 1 => {
                    return Err(BuildError::Spawn {
                        tool: program.clone(),
                        source: RunnerError::Spawn { program, source },
                    });
                }
                Err(err) => {
                    state.passes.push(PassReport {
                        pass,
                        return_code: -1,
                        messages: start..state.messages.len(),
                        duration_ms: 0,
                    });
                    state
                        .messages
                        .push(DiagnosticMessage::synthetic_error(err.to_string()));
                    return Ok(state.finish(command, BuildOutcome::Aborted, -1));
                }
            };

            let produced = state.messages.len() - start;
            obs::emit_pass_finished(pass, outcome.exit_code, produced, outcome.duration_ms);
            state.passes.push(PassReport {
                pass,
                return_code: outcome.exit_code,
                messages: start..state.messages.len(),
                duration_ms: outcome.duration_ms,
            });
            last_code = outcome.exit_code;

            if !outcome.success() {
                return Ok(state.finish(command, BuildOutcome::CompileFailed, outcome.exit_code));
            }
            if command.backend == Backend::Wrapper {
                return Ok(state.finish(command, BuildOutcome::Converged, 0));
            }

            let mut ran_now = false;
            for tool in &tools {
                let trigger = tool.find_trigger(&cwd, &stem);
                let seen = already_ran.contains(tool);
                obs::emit_aux_decision(
                    tool.binary(),
                    trigger.as_deref().and_then(|p| p.to_str()),
                    seen,
                );
                let Some(trigger) = trigger else { continue };
                if seen {
                    continue;
                }
                already_ran.insert(*tool);

                match self.run_aux(*tool, &stem, &cwd, trigger).await {
                    Ok(run) => {
                        obs::emit_aux_finished(tool.binary(), run.return_code);
                        let code = run.return_code;
                        if code != 0 {
                            state.messages.push(run.failure_message());
                            state.aux_runs.push(run);
                            return Ok(state.finish(command, BuildOutcome::AuxiliaryFailed, code));
                        }
                        state.aux_runs.push(run);
                        ran_now = true;
                    }
                    Err(err) => {
                        state.messages.push(DiagnosticMessage::synthetic_error(format!(
                            "{tool}: {err}"
                        )));
                        return Ok(state.finish(command, BuildOutcome::AuxiliaryFailed, -1));
                    }
                }
            }

            if ran_now {
                obs::emit_rerun_requested(pass, "auxiliary tool ran");
                continue;
            }

            let log_text = read_log(&command.log_path).unwrap_or_else(|e| {
                debug!(error = %e, "log unavailable, scanning captured output");
                outcome.stdout.clone()
            });
            match rerun_reason(&log_text) {
                Some(reason) => obs::emit_rerun_requested(pass, reason),
                None => return Ok(state.finish(command, BuildOutcome::Converged, 0)),
            }
        }

        let passes = state.passes.len();
        state.messages.push(DiagnosticMessage::synthetic_error(format!(
            "document did not converge within {passes} passes (rerun budget {rerun_budget})"
        )));
        Ok(state.finish(command, BuildOutcome::BudgetExhausted, last_code))
    }

    /// One primary pass with its output streamed through a fresh parser.
    async fn primary_pass(
        &self,
        request: &ProcessRequest,
        messages: &mut Vec<DiagnosticMessage>,
    ) -> std::result::Result<ProcessOutcome, RunnerError> {
        let mut parser = LogParser::new();
        let outcome = self
            .runner
            .run(request, &mut |line: &str| {
                messages.extend(parser.process_line(line))
            })
            .await;
        messages.extend(parser.finalize());
        outcome
    }

    async fn run_aux(
        &self,
        tool: AuxTool,
        stem: &str,
        cwd: &std::path::Path,
        trigger: PathBuf,
    ) -> std::result::Result<AuxiliaryRun, RunnerError> {
        let invocation = aux_invocation(tool, stem, self.cache, self.overrides);
        let request = ProcessRequest::new(invocation.program, invocation.args, cwd)
            .with_env(self.env.clone());
        let outcome = self.runner.run(&request, &mut |_: &str| {}).await?;
        Ok(AuxiliaryRun {
            tool,
            trigger_file: trigger,
            return_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        })
    }
}
