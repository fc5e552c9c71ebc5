//! End-to-end build: plan, gate, run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::driver::{BuildResult, ConvergenceDriver};
use crate::engine::{
    resolve, Backend, BuildMetadata, CommandBuilder, EngineChoice, EngineCommand,
    EngineFeatures, EnginePreference, FeatureProbe, FAST_KEYWORD, WRAPPER_BINARY,
};
use crate::error::{BuildError, Result};
use crate::runner::{ProcessRunner, TokioProcessRunner};
use crate::scratch::ScratchDir;
use crate::tools::{BinaryCache, DependencyChecker, SearchPath};

/// What to build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub document: PathBuf,
    /// Overrides the configured engine when set.
    pub preference: Option<EnginePreference>,
    pub metadata: BuildMetadata,
}

impl BuildRequest {
    pub fn new(document: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            ..Self::default()
        }
    }

    pub fn with_preference(mut self, preference: EnginePreference) -> Self {
        self.preference = Some(preference);
        self
    }

    pub fn with_metadata(mut self, metadata: BuildMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Everything decided before a process is spawned.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub choice: EngineChoice,
    pub features: EngineFeatures,
    pub command: EngineCommand,
}

/// Long-lived state shared by builds: configuration, executable cache and
/// the process runner.
pub struct BuildContext {
    config: BuildConfig,
    cache: BinaryCache,
    runner: Arc<dyn ProcessRunner>,
}

impl BuildContext {
    pub fn new(config: BuildConfig, runner: Arc<dyn ProcessRunner>, search: SearchPath) -> Self {
        Self {
            config,
            cache: BinaryCache::new(search),
            runner,
        }
    }

    /// Real processes, `PATH` lookup and the configured timeout.
    pub fn system(config: BuildConfig) -> Self {
        let mut runner = TokioProcessRunner::new();
        if let Some(timeout) = config.process_timeout() {
            runner = runner.with_timeout(timeout);
        }
        Self::new(config, Arc::new(runner), SearchPath::Env)
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn cache(&self) -> &BinaryCache {
        &self.cache
    }

    /// Primary executable for the backend, if one resolves.
    fn primary_binary(&self, backend: Backend) -> Option<PathBuf> {
        let tools = &self.config.tools;
        match backend {
            Backend::Fast => {
                if !self.config.prefer_system_tectonic {
                    if let Some(bundled) = self.config.bundled_tectonic.as_ref() {
                        if bundled.is_file() {
                            return Some(bundled.clone());
                        }
                        debug!(path = %bundled.display(), "bundled tectonic missing, searching PATH");
                    }
                }
                self.cache.resolve(FAST_KEYWORD, tools)
            }
            Backend::Wrapper => self.cache.resolve(WRAPPER_BINARY, tools),
        }
    }

    /// Resolve the engine, probe features and build the command.
    pub fn plan(&self, request: &BuildRequest) -> BuildPlan {
        let preference = request
            .preference
            .unwrap_or_else(|| self.config.preference());
        let choice = resolve(preference, request.metadata.engine.as_deref());
        let features = FeatureProbe::probe(&request.metadata);
        let binary = self.primary_binary(choice.backend);
        let command =
            CommandBuilder::build(&choice, &features, &request.document, binary.as_deref());
        BuildPlan {
            choice,
            features,
            command,
        }
    }

    /// Executables the plan needs that cannot be found.
    pub fn missing(&self, plan: &BuildPlan) -> Vec<String> {
        DependencyChecker::new(&self.cache).missing(&plan.choice, &plan.features, &self.config.tools)
    }
}

/// Build one document to completion.
///
/// Returns an error only when the build cannot start: missing document,
/// missing executables, scratch setup failure or a first pass that cannot be
/// spawned. Everything after that is reported on the [`BuildResult`].
pub async fn build_document(request: &BuildRequest, context: &BuildContext) -> Result<BuildResult> {
    if !request.document.is_file() {
        return Err(BuildError::DocumentNotFound(request.document.clone()));
    }

    let plan = context.plan(request);
    info!(
        document = %request.document.display(),
        backend = ?plan.choice.backend,
        program = ?plan.choice.program,
        "planned build"
    );

    let missing = context.missing(&plan);
    if !missing.is_empty() {
        return Err(BuildError::MissingDependencies(missing));
    }

    let scratch = ScratchDir::for_document(context.config.cache_dir.as_deref(), &request.document)?;
    debug!(scratch = %scratch.path().display(), "prepared scratch directory");

    let driver = ConvergenceDriver::new(context.runner.as_ref(), &context.cache, &context.config.tools)
        .with_env(scratch.env());
    let result = driver
        .run(&plan.command, &plan.features, context.config.rerun_budget)
        .await;
    drop(scratch);
    result
}

/// Plan and dependency-check without running anything.
pub fn check_document(request: &BuildRequest, context: &BuildContext) -> (BuildPlan, Vec<String>) {
    let plan = context.plan(request);
    let missing = context.missing(&plan);
    (plan, missing)
}
