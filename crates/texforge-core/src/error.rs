//! Error taxonomy for texforge builds.
//!
//! Only failures that prevent a build from starting are errors. Compile
//! failures, auxiliary-tool failures and non-convergence are reported as data
//! on [`crate::BuildResult`].

use std::path::PathBuf;
use std::time::Duration;

/// Failures raised by a [`crate::ProcessRunner`].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("io error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    pub fn program(&self) -> &str {
        match self {
            RunnerError::Spawn { program, .. }
            | RunnerError::Timeout { program, .. }
            | RunnerError::Io { program, .. } => program,
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("rerun_budget must be at least 1")]
    ZeroRerunBudget,

    #[error("invalid tool override {0:?}: expected NAME=PATH")]
    InvalidToolOverride(String),
}

/// Errors that abort a build before a result exists.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing dependencies: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    #[error("could not start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: RunnerError,
    },

    #[error("document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("failed to read build metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for texforge build operations.
pub type Result<T> = std::result::Result<T, BuildError>;
