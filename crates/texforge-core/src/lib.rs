//! texforge core library
//!
//! Plans and runs LaTeX builds: resolves the engine, checks that every
//! required executable exists, then drives primary passes and auxiliary
//! tools until the document converges. Engine output is parsed into
//! diagnostics by `texforge-log` as it streams.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod pipeline;
pub mod runner;
pub mod scratch;
pub mod telemetry;
pub mod tools;

pub use config::{parse_tool_override, BuildConfig, CONFIG_FILE_NAME};
pub use driver::{
    AuxiliaryRun, BuildOutcome, BuildResult, ConvergenceDriver, PassReport, DEFAULT_RERUN_BUDGET,
};
pub use engine::{
    resolve, Backend, BuildMetadata, CommandBuilder, EngineChoice, EngineCommand, EngineFeatures,
    EnginePreference, EngineProgram, FeatureProbe,
};
pub use error::{BuildError, ConfigError, Result, RunnerError};
pub use pipeline::{build_document, check_document, BuildContext, BuildPlan, BuildRequest};
pub use runner::{ProcessOutcome, ProcessRequest, ProcessRunner, TokioProcessRunner};
pub use scratch::ScratchDir;
pub use tools::{
    aux_invocation, AuxInvocation, AuxTool, BinaryCache, DependencyChecker, GlossaryEngine,
    IndexEngine, SearchPath, ToolOverrides,
};

pub use texforge_log::{DiagnosticMessage, MessageCounts, Severity};
