//! Build configuration loaded from `texforge.toml`.
//!
//! ```toml
//! engine = "tectonic"
//! rerun_budget = 5
//! prefer_system_tectonic = false
//! bundled_tectonic = "/opt/texforge/bin/tectonic"
//! process_timeout_secs = 300
//! cache_dir = "/var/cache/texforge"
//!
//! [tools]
//! biber = "/usr/local/bin/biber"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::DEFAULT_RERUN_BUDGET;
use crate::engine::EnginePreference;
use crate::error::ConfigError;
use crate::tools::ToolOverrides;

pub const CONFIG_FILE_NAME: &str = "texforge.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Backend preference: `tectonic`, an engine program, or absent.
    pub engine: Option<String>,

    /// Maximum primary passes per build.
    pub rerun_budget: u32,

    /// Use `tectonic` from `PATH` instead of `bundled_tectonic`.
    pub prefer_system_tectonic: bool,

    pub bundled_tectonic: Option<PathBuf>,

    /// Per-process wall-clock limit; 0 disables it.
    pub process_timeout_secs: u64,

    /// Root for persistent per-document caches. Absent means a temporary
    /// directory per build.
    pub cache_dir: Option<PathBuf>,

    /// Explicit executable paths by tool name.
    pub tools: ToolOverrides,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            engine: None,
            rerun_budget: DEFAULT_RERUN_BUDGET,
            prefer_system_tectonic: false,
            bundled_tectonic: None,
            process_timeout_secs: 0,
            cache_dir: None,
            tools: ToolOverrides::new(),
        }
    }
}

impl BuildConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` if given, else `texforge.toml` in `dir` if present, else
    /// defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::load(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rerun_budget == 0 {
            return Err(ConfigError::ZeroRerunBudget);
        }
        Ok(())
    }

    pub fn preference(&self) -> EnginePreference {
        EnginePreference::parse(self.engine.as_deref())
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        (self.process_timeout_secs > 0).then(|| Duration::from_secs(self.process_timeout_secs))
    }

    /// Apply a `NAME=PATH` override on top of the file's `[tools]` table.
    pub fn add_tool_override(&mut self, spec: &str) -> Result<(), ConfigError> {
        let (name, path) = parse_tool_override(spec)?;
        self.tools.insert(name, path);
        Ok(())
    }
}

pub fn parse_tool_override(spec: &str) -> Result<(String, PathBuf), ConfigError> {
    match spec.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(ConfigError::InvalidToolOverride(spec.to_string())),
    }
}
