//! Text and JSON rendering of build results and parsed logs.

use std::fmt::Write as _;

use serde::Serialize;
use texforge_core::{BuildOutcome, BuildPlan, BuildResult, DiagnosticMessage, MessageCounts, Severity};

/// Output format for reports on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Text,
    Json,
}

const INDENT: &str = "  ";

/// Messages as an indented tree, one level per inclusion depth.
pub fn message_tree(messages: &[DiagnosticMessage], min_severity: Severity) -> String {
    let mut out = String::new();
    for message in messages.iter().filter(|m| m.severity >= min_severity) {
        let indent = INDENT.repeat(message.depth);
        let _ = writeln!(out, "{indent}{}: {}", message.severity, message.summary);
        for detail in &message.details {
            let _ = writeln!(out, "{indent}{INDENT}| {detail}");
        }
    }
    out
}

pub fn counts_line(counts: &MessageCounts) -> String {
    format!(
        "{} error(s), {} warning(s), {} info message(s)",
        counts.errors, counts.warnings, counts.infos
    )
}

fn outcome_label(outcome: BuildOutcome) -> &'static str {
    match outcome {
        BuildOutcome::Converged => "converged",
        BuildOutcome::CompileFailed => "compile failed",
        BuildOutcome::AuxiliaryFailed => "auxiliary tool failed",
        BuildOutcome::Aborted => "aborted",
        BuildOutcome::BudgetExhausted => "rerun budget exhausted",
    }
}

pub fn build_report(result: &BuildResult, min_severity: Severity) -> String {
    let mut out = message_tree(&result.messages, min_severity);
    if !out.is_empty() {
        out.push('\n');
    }
    for run in &result.aux_runs {
        let _ = writeln!(
            out,
            "ran {} ({}) -> exit {}",
            run.tool,
            run.trigger_file.display(),
            run.return_code
        );
    }
    let status = if result.succeeded() { "succeeded" } else { "failed" };
    let _ = writeln!(
        out,
        "build {status} ({}): {} pass(es), {}, {} ms",
        outcome_label(result.outcome),
        result.pass_count,
        counts_line(&result.counts()),
        result.duration_ms
    );
    if let Some(artifact) = result.artifact() {
        let _ = writeln!(out, "output: {}", artifact.display());
    }
    out
}

pub fn plan_report(plan: &BuildPlan, missing: &[String]) -> String {
    let mut out = String::new();
    let program = plan
        .choice
        .program
        .map(|p| p.to_string())
        .unwrap_or_else(|| "default".to_string());
    let _ = writeln!(out, "backend: {:?} (program: {program})", plan.choice.backend);
    let _ = writeln!(out, "command: {}", plan.command.argv.join(" "));
    let _ = writeln!(out, "log: {}", plan.command.log_path.display());
    let _ = writeln!(out, "output: {}", plan.command.artifact_path.display());
    let features = &plan.features;
    let _ = writeln!(
        out,
        "features: bibliography={} index={} glossary={} shell_escape={}",
        features.has_bibliography, features.has_index, features.has_glossary, features.requires_shell_escape
    );
    if missing.is_empty() {
        let _ = writeln!(out, "dependencies: ok");
    } else {
        let _ = writeln!(out, "missing: {}", missing.join(", "));
    }
    out
}

#[derive(Serialize)]
pub struct LogReport<'a> {
    pub messages: &'a [DiagnosticMessage],
    pub counts: MessageCounts,
    pub rerun_requested: bool,
}

#[derive(Serialize)]
pub struct CheckReport<'a> {
    pub plan: &'a BuildPlan,
    pub missing: &'a [String],
}
