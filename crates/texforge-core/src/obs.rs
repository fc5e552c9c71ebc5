//! Structured build lifecycle events.
//!
//! Events are emitted at `info!` level unless noted; filter with `RUST_LOG`.

use tracing::{debug, info, warn, Span};

/// Build-scoped span; attach it to the driver future with
/// [`tracing::Instrument`].
pub fn build_span(build_id: &str, document: &str) -> Span {
    tracing::info_span!("texforge.build", build_id = %build_id, document = %document)
}

pub fn emit_build_started(program: &str, budget: u32) {
    info!(event = "build.started", program = %program, rerun_budget = budget);
}

pub fn emit_pass_finished(pass: u32, exit_code: i32, messages: usize, duration_ms: u64) {
    info!(
        event = "build.pass_finished",
        pass = pass,
        exit_code = exit_code,
        messages = messages,
        duration_ms = duration_ms,
    );
}

pub fn emit_aux_decision(tool: &str, trigger: Option<&str>, already_ran: bool) {
    debug!(
        event = "build.aux_decision",
        tool = %tool,
        trigger = trigger.unwrap_or("-"),
        already_ran = already_ran,
    );
}

pub fn emit_aux_finished(tool: &str, exit_code: i32) {
    info!(event = "build.aux_finished", tool = %tool, exit_code = exit_code);
}

pub fn emit_rerun_requested(pass: u32, reason: &str) {
    info!(event = "build.rerun_requested", pass = pass, reason = %reason);
}

pub fn emit_build_finished(converged: bool, passes: u32, return_code: i32, duration_ms: u64) {
    if converged {
        info!(
            event = "build.finished",
            converged = converged,
            passes = passes,
            return_code = return_code,
            duration_ms = duration_ms,
        );
    } else {
        warn!(
            event = "build.finished",
            converged = converged,
            passes = passes,
            return_code = return_code,
            duration_ms = duration_ms,
        );
    }
}
