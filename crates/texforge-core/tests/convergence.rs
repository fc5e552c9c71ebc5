//! Convergence loop behaviour against scripted engine runs.

use std::path::{Path, PathBuf};

use texforge_core::fakes::{ScriptedRunner, ScriptedStep};
use texforge_core::{
    BinaryCache, BuildOutcome, CommandBuilder, ConvergenceDriver, EngineChoice, EngineCommand,
    EngineFeatures, SearchPath, Severity, ToolOverrides,
};

fn fast_command(dir: &Path) -> EngineCommand {
    CommandBuilder::build(
        &EngineChoice::fast(),
        &EngineFeatures::default(),
        &dir.join("doc.tex"),
        None,
    )
}

fn empty_cache() -> BinaryCache {
    BinaryCache::new(SearchPath::empty())
}

/// Test: bibliography tool runs once and forces exactly one extra pass
#[tokio::test]
async fn test_bibliography_runs_once_and_converges_in_two_passes() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(vec![
        ScriptedStep::ok()
            .touches("doc.bcf")
            .line("LaTeX Warning: Citation `knuth84' on page 1 undefined on input line 7.")
            .line("LaTeX Warning: Please rerun LaTeX."),
        ScriptedStep::ok().line("Output written on doc.pdf (1 page)."),
        ScriptedStep::ok(),
    ]);
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .expect("build should start");

    assert!(result.converged, "document should converge");
    assert_eq!(result.outcome, BuildOutcome::Converged);
    assert_eq!(result.pass_count, 2);
    assert_eq!(runner.calls_to("biber"), 1, "biber must run exactly once");
    assert_eq!(runner.calls_to("tectonic"), 2);
    assert_eq!(runner.remaining(), 1);

    assert_eq!(result.aux_runs.len(), 1);
    assert_eq!(result.aux_runs[0].trigger_file, dir.path().join("doc.bcf"));
    assert_eq!(result.aux_runs[0].return_code, 0);
    assert_eq!(runner.calls()[1].args, vec!["doc".to_string()]);
}

/// Test: rerun phrase in the log file (not stdout) triggers another pass
#[tokio::test]
async fn test_rerun_phrase_read_from_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(vec![
        ScriptedStep::ok().writes(
            "doc.log",
            "LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right.\n",
        ),
        ScriptedStep::ok().writes("doc.log", "Output written on doc.pdf (3 pages).\n"),
    ]);
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .unwrap();

    assert!(result.converged);
    assert_eq!(result.pass_count, 2);
    assert!(result.aux_runs.is_empty());
}

/// Test: a log that always asks for a rerun exhausts the budget
#[tokio::test]
async fn test_budget_enforced_when_log_never_settles() {
    let dir = tempfile::tempdir().unwrap();
    let rerun = || ScriptedStep::ok().line("LaTeX Warning: There were undefined references.");
    let runner = ScriptedRunner::new(vec![rerun(), rerun(), rerun(), rerun()]);
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 3)
        .await
        .unwrap();

    assert!(!result.converged);
    assert_eq!(result.outcome, BuildOutcome::BudgetExhausted);
    assert_eq!(result.pass_count, 3);
    assert_eq!(result.return_code, 0, "last pass itself succeeded");
    assert_eq!(runner.remaining(), 1);

    let last = result.messages.last().unwrap();
    assert_eq!(last.severity, Severity::Error);
    assert!(last.summary.contains("did not converge"));
    assert_eq!(result.passes.len(), 3);
}

/// Test: clean single pass
#[tokio::test]
async fn test_single_clean_pass_converges() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(vec![ScriptedStep::ok().lines([
        "This is XeTeX, Version 3.141592653-2.6-0.999995 (TeX Live 2023)",
        "(./doc.tex",
        "LaTeX2e <2022-11-01> patch level 1",
        ")",
        "Output written on doc.pdf (1 page).",
    ])]);
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .unwrap();

    assert!(result.succeeded());
    assert_eq!(result.pass_count, 1);
    assert_eq!(result.return_code, 0);
    assert_eq!(result.counts().errors, 0);
    assert!(result.messages.iter().all(|m| m.depth <= 1));
    assert_eq!(result.passes[0].messages, 0..result.messages.len());
}

/// Test: a failing compile is never retried
#[tokio::test]
async fn test_failing_compile_stops_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(vec![
        ScriptedStep::exit(1).lines([
            "(./doc.tex",
            "! Undefined control sequence.",
            r"l.5 \foo",
            ")",
        ]),
        ScriptedStep::ok(),
    ]);
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .unwrap();

    assert!(!result.converged);
    assert_eq!(result.outcome, BuildOutcome::CompileFailed);
    assert_eq!(result.return_code, 1);
    assert_eq!(result.pass_count, 1);
    assert_eq!(runner.remaining(), 1);
    assert!(result.artifact().is_none());

    let error = result
        .messages
        .iter()
        .find(|m| m.is_error())
        .expect("error message");
    assert_eq!(error.summary, "Undefined control sequence.");
    assert_eq!(error.depth, 1);
    assert_eq!(error.details, vec![r"l.5 \foo".to_string()]);
}

/// Test: auxiliary failure is fatal and carries the tool output
#[tokio::test]
async fn test_index_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(vec![ScriptedStep::ok().touches("doc.idx"), ScriptedStep::ok()])
        .with_tool(
            "makeindex",
            ScriptedStep::exit(1).stderr_line("!! Input index error (file = doc.idx, line = 3)"),
        );
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .unwrap();

    assert!(!result.converged);
    assert_eq!(result.outcome, BuildOutcome::AuxiliaryFailed);
    assert_eq!(result.return_code, 1);
    assert_eq!(result.pass_count, 1);

    let last = result.messages.last().unwrap();
    assert!(last.is_error());
    assert_eq!(last.depth, 0);
    assert_eq!(last.summary, "makeindex failed with exit code 1");
    assert_eq!(
        last.details,
        vec!["!! Input index error (file = doc.idx, line = 3)".to_string()]
    );
    assert_eq!(runner.calls()[1].args, vec!["doc.idx".to_string()]);
}

/// Test: an auxiliary tool that cannot be started ends the build
#[tokio::test]
async fn test_unspawnable_bibliography_tool_ends_build() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(vec![ScriptedStep::ok().touches("doc.bcf"), ScriptedStep::ok()])
        .with_tool("biber", ScriptedStep::spawn_failure());
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .expect("primary pass started");

    assert!(!result.converged);
    assert_eq!(result.outcome, BuildOutcome::AuxiliaryFailed);
    assert_eq!(result.return_code, -1);
    assert_eq!(result.pass_count, 1);
    assert!(result.aux_runs.is_empty());
    assert_eq!(runner.calls_to("biber"), 1);
    assert_eq!(runner.remaining(), 1, "no further pass after the failure");

    let last = result.messages.last().unwrap();
    assert!(last.is_error());
    assert_eq!(last.depth, 0);
    assert!(last.summary.starts_with("biber: "), "{}", last.summary);
    assert!(last.summary.contains("failed to spawn biber"), "{}", last.summary);
}

/// Test: acronym file triggers the glossary tool once
#[tokio::test]
async fn test_glossary_triggered_by_acronym_file() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(vec![
        ScriptedStep::ok().touches("doc.acn"),
        ScriptedStep::ok(),
    ]);
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .unwrap();

    assert!(result.converged);
    assert_eq!(result.pass_count, 2);
    assert_eq!(runner.calls_to("makeglossaries"), 1);
}

/// Test: every tool runs at most once even when several triggers appear
#[tokio::test]
async fn test_all_tools_run_once_across_passes() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new(vec![
        ScriptedStep::ok().touches("doc.bcf"),
        ScriptedStep::ok().touches("doc.idx"),
        ScriptedStep::ok().touches("doc.glo"),
        ScriptedStep::ok(),
        ScriptedStep::ok(),
    ]);
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .unwrap();

    assert!(result.converged);
    assert_eq!(result.pass_count, 4);
    assert_eq!(runner.calls_to("biber"), 1);
    assert_eq!(runner.calls_to("makeindex"), 1);
    assert_eq!(runner.calls_to("makeglossaries"), 1);
    assert_eq!(result.aux_runs.len(), 3);
}

/// Test: the wrapper backend owns its reruns and gets one invocation
#[tokio::test]
async fn test_wrapper_backend_single_invocation() {
    let dir = tempfile::tempdir().unwrap();
    let command = CommandBuilder::build(
        &EngineChoice::wrapper(None),
        &EngineFeatures::default(),
        &dir.path().join("doc.tex"),
        None,
    );
    let runner = ScriptedRunner::new(vec![
        ScriptedStep::ok()
            .touches("doc.bcf")
            .line("Latexmk: All targets (doc.pdf) are up-to-date")
            .line("LaTeX Warning: There were undefined references."),
        ScriptedStep::ok(),
    ]);
    let cache = empty_cache();
    let overrides = ToolOverrides::new();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .run(&command, &EngineFeatures::default(), 5)
        .await
        .unwrap();

    assert!(result.converged);
    assert_eq!(result.pass_count, 1);
    assert_eq!(runner.calls_to("latexmk"), 1);
    assert_eq!(runner.calls_to("biber"), 0);
}

/// Test: environment and working directory reach every process
#[tokio::test]
async fn test_env_and_cwd_forwarded_to_all_processes() {
    let dir = tempfile::tempdir().unwrap();
    let custom_biber = dir.path().join("bin").join("biber");
    std::fs::create_dir_all(custom_biber.parent().unwrap()).unwrap();
    std::fs::write(&custom_biber, "").unwrap();
    let mut overrides = ToolOverrides::new();
    overrides.insert("biber".into(), custom_biber.clone());

    let mut env = std::collections::BTreeMap::new();
    env.insert("TEXMFVAR".to_string(), dir.path().join("var").into_os_string());

    let runner = ScriptedRunner::new(vec![ScriptedStep::ok().touches("doc.bcf"), ScriptedStep::ok()]);
    let cache = empty_cache();

    let result = ConvergenceDriver::new(&runner, &cache, &overrides)
        .with_env(env)
        .run(&fast_command(dir.path()), &EngineFeatures::default(), 5)
        .await
        .unwrap();
    assert!(result.converged);

    let calls = runner.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].program, custom_biber);
    for call in &calls {
        assert_eq!(call.cwd, PathBuf::from(dir.path()));
        assert!(call.env.contains_key("TEXMFVAR"));
    }
}
