//! Pre-flight check for required executables.

use tracing::debug;

use super::resolve::{BinaryCache, ToolOverrides};
use super::{preferred_glossary_engine, GlossaryEngine, IndexEngine, BIBLIOGRAPHY_TOOL};
use crate::engine::{Backend, EngineChoice, EngineFeatures, EngineProgram, WRAPPER_BINARY};

/// Computes which executables a build plan needs but cannot find.
pub struct DependencyChecker<'a> {
    cache: &'a BinaryCache,
}

impl<'a> DependencyChecker<'a> {
    pub fn new(cache: &'a BinaryCache) -> Self {
        Self { cache }
    }

    /// Executable names the plan requires, in check order.
    pub fn required(
        &self,
        choice: &EngineChoice,
        features: &EngineFeatures,
        overrides: &ToolOverrides,
    ) -> Vec<&'static str> {
        let mut names = Vec::new();
        if choice.backend == Backend::Wrapper {
            names.push(WRAPPER_BINARY);
            names.push(choice.program.unwrap_or(EngineProgram::Pdflatex).binary());
        }
        if features.has_bibliography {
            names.push(BIBLIOGRAPHY_TOOL);
        }
        if features.has_index {
            names.push(IndexEngine::from_hint(features.index_engine_hint.as_deref()).binary());
        }
        if features.has_glossary
            && preferred_glossary_engine(self.cache, overrides) == GlossaryEngine::Makeglossaries
        {
            names.push(GlossaryEngine::Makeglossaries.binary());
        }
        names
    }

    /// Unresolvable names; empty means the build may proceed.
    pub fn missing(
        &self,
        choice: &EngineChoice,
        features: &EngineFeatures,
        overrides: &ToolOverrides,
    ) -> Vec<String> {
        let missing: Vec<String> = self
            .required(choice, features, overrides)
            .into_iter()
            .filter(|name| !self.cache.is_available(name, overrides))
            .map(String::from)
            .collect();
        debug!(?missing, "dependency check");
        missing
    }
}
