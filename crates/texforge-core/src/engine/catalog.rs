//! Engine backends and preference resolution.

use serde::{Deserialize, Serialize};

/// Keyword selecting the sandboxed fast compiler.
pub const FAST_KEYWORD: &str = "tectonic";

/// Typesetting backend family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Self-contained tectonic compiler; passes are driven by texforge.
    Fast,
    /// latexmk driving a traditional engine; latexmk owns its reruns.
    Wrapper,
}

/// Engine programs the wrapper backend knows how to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngineProgram {
    Pdflatex,
    Xelatex,
    Lualatex,
}

impl EngineProgram {
    pub const ALL: [EngineProgram; 3] = [
        EngineProgram::Pdflatex,
        EngineProgram::Xelatex,
        EngineProgram::Lualatex,
    ];

    /// Executable name.
    pub fn binary(&self) -> &'static str {
        match self {
            EngineProgram::Pdflatex => "pdflatex",
            EngineProgram::Xelatex => "xelatex",
            EngineProgram::Lualatex => "lualatex",
        }
    }

    /// latexmk flag selecting PDF output through this program.
    pub fn pdf_mode_flag(&self) -> &'static str {
        match self {
            EngineProgram::Pdflatex => "-pdf",
            EngineProgram::Xelatex => "-pdfxe",
            EngineProgram::Lualatex => "-pdflua",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|program| program.binary().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for EngineProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

/// Fully resolved engine for one build. Immutable once chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineChoice {
    pub backend: Backend,

    /// Secondary engine program; `None` leaves it to the wrapper's default.
    pub program: Option<EngineProgram>,
}

impl EngineChoice {
    pub fn fast() -> Self {
        Self {
            backend: Backend::Fast,
            program: None,
        }
    }

    pub fn wrapper(program: Option<EngineProgram>) -> Self {
        Self {
            backend: Backend::Wrapper,
            program,
        }
    }

    pub fn is_fast(&self) -> bool {
        self.backend == Backend::Fast
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnginePreference {
    Fast,
    Program(EngineProgram),
    /// Defer to whatever the document declares.
    #[default]
    Document,
}

impl EnginePreference {
    /// Total parse: anything unrecognised defers to the document.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case(FAST_KEYWORD) => EnginePreference::Fast,
            Some(v) => EngineProgram::from_name(v)
                .map(EnginePreference::Program)
                .unwrap_or(EnginePreference::Document),
            None => EnginePreference::Document,
        }
    }
}

/// Resolve a preference plus an optional document-declared hint. Never fails:
/// every unmatched input degrades to the wrapper backend.
pub fn resolve(preference: EnginePreference, document_hint: Option<&str>) -> EngineChoice {
    match preference {
        EnginePreference::Fast => EngineChoice::fast(),
        EnginePreference::Program(program) => EngineChoice::wrapper(Some(program)),
        EnginePreference::Document => match EnginePreference::parse(document_hint) {
            EnginePreference::Fast => EngineChoice::fast(),
            EnginePreference::Program(program) => EngineChoice::wrapper(Some(program)),
            EnginePreference::Document => EngineChoice::wrapper(None),
        },
    }
}
