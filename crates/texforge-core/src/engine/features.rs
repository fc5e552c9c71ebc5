//! Feature detection from document build metadata.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

/// Build metadata handed over by the document generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildMetadata {
    /// Packages loaded by the document preamble.
    pub packages: Vec<String>,
    pub bibliography: bool,
    pub index: bool,
    pub glossary: bool,
    pub shell_escape: bool,
    /// Preferred index engine (`makeindex`, `texindy`, `xindy`).
    pub index_engine: Option<String>,
    /// Engine the document declares for itself.
    pub engine: Option<String>,
}

impl BuildMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(BuildError::from)
    }

    fn uses_any(&self, names: &[&str]) -> bool {
        self.packages
            .iter()
            .any(|pkg| names.iter().any(|name| pkg.trim() == *name))
    }
}

/// What the document needs from the toolchain. Read-only once probed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineFeatures {
    pub requires_shell_escape: bool,
    pub has_bibliography: bool,
    pub has_index: bool,
    pub has_glossary: bool,
    pub index_engine_hint: Option<String>,
}

const BIBLIOGRAPHY_PACKAGES: &[&str] = &["biblatex"];
const INDEX_PACKAGES: &[&str] = &["makeidx", "imakeidx", "index"];
const GLOSSARY_PACKAGES: &[&str] = &["glossaries", "glossaries-extra"];
const SHELL_ESCAPE_PACKAGES: &[&str] = &["minted", "pythontex", "svg"];

pub struct FeatureProbe;

impl FeatureProbe {
    pub fn probe(metadata: &BuildMetadata) -> EngineFeatures {
        EngineFeatures {
            requires_shell_escape: metadata.shell_escape
                || metadata.uses_any(SHELL_ESCAPE_PACKAGES),
            has_bibliography: metadata.bibliography || metadata.uses_any(BIBLIOGRAPHY_PACKAGES),
            has_index: metadata.index || metadata.uses_any(INDEX_PACKAGES),
            has_glossary: metadata.glossary || metadata.uses_any(GLOSSARY_PACKAGES),
            index_engine_hint: metadata.index_engine.clone(),
        }
    }
}
