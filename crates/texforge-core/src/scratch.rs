//! Per-build cache directories for the external tools.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;

/// Environment variables every spawned process receives.
pub const CACHE_ENV_VARS: &[(&str, &str)] = &[
    ("TECTONIC_CACHE_DIR", "tectonic"),
    ("TEXMFVAR", "texmf-var"),
    ("TEXMFCACHE", "texmf-cache"),
    ("XDG_CACHE_HOME", "xdg"),
];

#[derive(Debug)]
enum Root {
    Temp(TempDir),
    Persistent(PathBuf),
}

/// Cache tree private to one build. Temporary roots are removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    root: Root,
}

impl ScratchDir {
    pub fn temporary() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("texforge-").tempdir()?;
        Self::prepare(dir.path())?;
        Ok(Self {
            root: Root::Temp(dir),
        })
    }

    /// Stable directory under `cache_dir` keyed by the document path, so
    /// rebuilds of one document reuse downloads while different documents
    /// never share a tree.
    pub fn persistent(cache_dir: &Path, document: &Path) -> std::io::Result<Self> {
        let root = cache_dir.join(document_key(document));
        Self::prepare(&root)?;
        Ok(Self {
            root: Root::Persistent(root),
        })
    }

    pub fn for_document(cache_dir: Option<&Path>, document: &Path) -> std::io::Result<Self> {
        match cache_dir {
            Some(dir) => Self::persistent(dir, document),
            None => Self::temporary(),
        }
    }

    fn prepare(root: &Path) -> std::io::Result<()> {
        for (_, sub) in CACHE_ENV_VARS {
            std::fs::create_dir_all(root.join(sub))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        match &self.root {
            Root::Temp(dir) => dir.path(),
            Root::Persistent(path) => path,
        }
    }

    pub fn env(&self) -> BTreeMap<String, OsString> {
        CACHE_ENV_VARS
            .iter()
            .map(|(var, sub)| (var.to_string(), self.path().join(sub).into_os_string()))
            .collect()
    }
}

/// First 16 hex chars of the SHA-256 of the document path.
pub fn document_key(document: &Path) -> String {
    let absolute = if document.is_absolute() {
        document.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(document))
            .unwrap_or_else(|_| document.to_path_buf())
    };
    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    hex::encode(digest)[..16].to_string()
}
