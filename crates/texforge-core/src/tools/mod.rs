//! Auxiliary tools run between primary passes.
//!
//! The supported tool families form a closed set. [`aux_invocation`] is the
//! only place that knows how each one is called.

pub mod deps;
pub mod resolve;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::EngineFeatures;

pub use deps::DependencyChecker;
pub use resolve::{BinaryCache, SearchPath, ToolOverrides};

pub const BIBLIOGRAPHY_TOOL: &str = "biber";

/// Interchangeable index processors.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndexEngine {
    #[default]
    Makeindex,
    Texindy,
    Xindy,
}

impl IndexEngine {
    /// Total parse of a document hint; unknown hints mean makeindex.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(|h| h.trim().to_ascii_lowercase()).as_deref() {
            Some("texindy") => IndexEngine::Texindy,
            Some("xindy") => IndexEngine::Xindy,
            _ => IndexEngine::Makeindex,
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            IndexEngine::Makeindex => "makeindex",
            IndexEngine::Texindy => "texindy",
            IndexEngine::Xindy => "xindy",
        }
    }
}

/// Glossary processors. The lite variant needs no Perl.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GlossaryEngine {
    #[default]
    Makeglossaries,
    MakeglossariesLite,
}

impl GlossaryEngine {
    pub fn binary(&self) -> &'static str {
        match self {
            GlossaryEngine::Makeglossaries => "makeglossaries",
            GlossaryEngine::MakeglossariesLite => "makeglossaries-lite",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "engine")]
pub enum AuxTool {
    Bibliography,
    Index(IndexEngine),
    Glossary(GlossaryEngine),
}

impl AuxTool {
    pub fn binary(&self) -> &'static str {
        match self {
            AuxTool::Bibliography => BIBLIOGRAPHY_TOOL,
            AuxTool::Index(engine) => engine.binary(),
            AuxTool::Glossary(engine) => engine.binary(),
        }
    }

    /// Sidecar extensions whose presence means this tool has work to do.
    pub fn trigger_extensions(&self) -> &'static [&'static str] {
        match self {
            AuxTool::Bibliography => &["bcf"],
            AuxTool::Index(_) => &["idx"],
            AuxTool::Glossary(_) => &["glo", "acn"],
        }
    }

    /// First trigger file present in `dir` for document `stem`.
    pub fn find_trigger(&self, dir: &Path, stem: &str) -> Option<PathBuf> {
        self.trigger_extensions()
            .iter()
            .map(|ext| dir.join(format!("{stem}.{ext}")))
            .find(|path| path.is_file())
    }
}

impl std::fmt::Display for AuxTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

/// Whether `name` is the executable of any supported auxiliary tool.
pub fn is_aux_binary(name: &str) -> bool {
    name == BIBLIOGRAPHY_TOOL
        || [IndexEngine::Makeindex, IndexEngine::Texindy, IndexEngine::Xindy]
            .iter()
            .any(|engine| engine.binary() == name)
        || [GlossaryEngine::Makeglossaries, GlossaryEngine::MakeglossariesLite]
            .iter()
            .any(|engine| engine.binary() == name)
}

/// Tools in the order they run after a pass: bibliography, index, glossary.
pub fn planned_tools(
    features: &EngineFeatures,
    cache: &BinaryCache,
    overrides: &ToolOverrides,
) -> Vec<AuxTool> {
    vec![
        AuxTool::Bibliography,
        AuxTool::Index(IndexEngine::from_hint(features.index_engine_hint.as_deref())),
        AuxTool::Glossary(preferred_glossary_engine(cache, overrides)),
    ]
}

pub fn preferred_glossary_engine(cache: &BinaryCache, overrides: &ToolOverrides) -> GlossaryEngine {
    let lite = GlossaryEngine::MakeglossariesLite;
    if cache.is_available(lite.binary(), overrides) {
        lite
    } else {
        GlossaryEngine::Makeglossaries
    }
}

/// Concrete call for one auxiliary tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxInvocation {
    pub tool: AuxTool,
    /// Resolved executable, or the bare name when resolution failed.
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Build the invocation for `tool` on document `stem`.
pub fn aux_invocation(
    tool: AuxTool,
    stem: &str,
    cache: &BinaryCache,
    overrides: &ToolOverrides,
) -> AuxInvocation {
    let args = match tool {
        AuxTool::Bibliography => vec![stem.to_string()],
        AuxTool::Index(IndexEngine::Makeindex) | AuxTool::Index(IndexEngine::Texindy) => {
            vec![format!("{stem}.idx")]
        }
        AuxTool::Index(IndexEngine::Xindy) => vec![
            "-M".to_string(),
            "texindy".to_string(),
            "-o".to_string(),
            format!("{stem}.ind"),
            format!("{stem}.idx"),
        ],
        AuxTool::Glossary(_) => vec![stem.to_string()],
    };
    let program = cache
        .resolve(tool.binary(), overrides)
        .unwrap_or_else(|| PathBuf::from(tool.binary()));

    AuxInvocation {
        tool,
        program,
        args,
    }
}
