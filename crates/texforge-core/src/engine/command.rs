//! Invocation construction for the chosen backend.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::catalog::{Backend, EngineChoice, EngineProgram, FAST_KEYWORD};
use super::features::EngineFeatures;

pub const WRAPPER_BINARY: &str = "latexmk";

/// Exact invocation for one primary pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineCommand {
    pub backend: Backend,
    pub argv: Vec<String>,
    pub document: PathBuf,
    pub log_path: PathBuf,
    pub artifact_path: PathBuf,
}

impl EngineCommand {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// Directory the engine runs in; sidecar files land here.
    pub fn working_dir(&self) -> PathBuf {
        document_dir(&self.document)
    }

    /// Document stem shared by every sidecar file.
    pub fn stem(&self) -> String {
        self.document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Directory containing `document`, `.` for a bare file name.
pub fn document_dir(document: &Path) -> PathBuf {
    match document.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Name the engine is given on its command line; it runs inside
/// [`EngineCommand::working_dir`].
fn document_arg(document: &Path) -> String {
    document
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| document.to_string_lossy().into_owned())
}

fn fast_argv(binary: &str, features: &EngineFeatures, document: &Path) -> Vec<String> {
    let mut argv: Vec<String> = [
        binary,
        "-X",
        "compile",
        "--keep-intermediates",
        "--keep-logs",
        "--outdir",
        ".",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if features.requires_shell_escape {
        argv.push("-Z".into());
        argv.push("shell-escape".into());
    }
    argv.push(document_arg(document));
    argv
}

fn wrapper_argv(
    binary: &str,
    program: Option<EngineProgram>,
    features: &EngineFeatures,
    document: &Path,
) -> Vec<String> {
    let engine = program.unwrap_or(EngineProgram::Pdflatex);
    let mut engine_command = format!("-{}={}", engine.binary(), engine.binary());
    if features.requires_shell_escape {
        engine_command.push_str(" -shell-escape");
    }
    engine_command.push_str(" %O %S");

    let mut argv = vec![
        binary.to_string(),
        engine.pdf_mode_flag().to_string(),
        "-interaction=nonstopmode".to_string(),
        "-halt-on-error".to_string(),
        "-file-line-error".to_string(),
        engine_command,
    ];
    if features.has_bibliography {
        argv.push("-bibtex".into());
    }
    argv.push(document_arg(document));
    argv
}

pub struct CommandBuilder;

impl CommandBuilder {
    /// Build the invocation. `binary_override` replaces `tectonic` for the
    /// fast backend and `latexmk` for the wrapper.
    pub fn build(
        choice: &EngineChoice,
        features: &EngineFeatures,
        document: &Path,
        binary_override: Option<&Path>,
    ) -> EngineCommand {
        let override_str = binary_override.map(|p| p.to_string_lossy().into_owned());
        let argv = match choice.backend {
            Backend::Fast => fast_argv(
                override_str.as_deref().unwrap_or(FAST_KEYWORD),
                features,
                document,
            ),
            Backend::Wrapper => wrapper_argv(
                override_str.as_deref().unwrap_or(WRAPPER_BINARY),
                choice.program,
                features,
                document,
            ),
        };

        EngineCommand {
            backend: choice.backend,
            argv,
            document: document.to_path_buf(),
            log_path: document.with_extension("log"),
            artifact_path: document.with_extension("pdf"),
        }
    }
}
