//! Executable lookup with an explicitly owned cache.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

/// Explicit per-tool executable paths, keyed by tool name.
pub type ToolOverrides = BTreeMap<String, PathBuf>;

/// Where to look for executables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SearchPath {
    /// The process `PATH`, read at lookup time.
    #[default]
    Env,
    /// A fixed directory list. Empty means nothing resolves.
    Dirs(Vec<PathBuf>),
}

impl SearchPath {
    pub fn empty() -> Self {
        SearchPath::Dirs(Vec::new())
    }

    fn dirs(&self) -> Vec<PathBuf> {
        match self {
            SearchPath::Env => std::env::var_os("PATH")
                .map(|path| std::env::split_paths(&path).collect())
                .unwrap_or_default(),
            SearchPath::Dirs(dirs) => dirs.clone(),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    let mut out = vec![dir.join(name)];
    if cfg!(windows) {
        let mut exe = OsString::from(name);
        exe.push(".exe");
        out.push(dir.join(exe));
    }
    out
}

/// Memoised name → path resolution. One instance belongs to one build
/// context; lookups never touch process-wide state beyond reading `PATH`.
#[derive(Debug, Default)]
pub struct BinaryCache {
    search: SearchPath,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl BinaryCache {
    pub fn new(search: SearchPath) -> Self {
        Self {
            search,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search
    }

    /// Resolve `name`: an override that exists on disk wins, otherwise the
    /// search path is consulted (and the answer cached).
    pub fn resolve(&self, name: &str, overrides: &ToolOverrides) -> Option<PathBuf> {
        if let Some(path) = overrides.get(name) {
            if path.is_file() {
                return Some(path.clone());
            }
            debug!(tool = name, path = %path.display(), "override path does not exist");
        }
        self.lookup(name)
    }

    pub fn is_available(&self, name: &str, overrides: &ToolOverrides) -> bool {
        self.resolve(name, overrides).is_some()
    }

    fn lookup(&self, name: &str) -> Option<PathBuf> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hit) = cache.get(name) {
            return hit.clone();
        }
        let found = self
            .search
            .dirs()
            .iter()
            .flat_map(|dir| candidates(dir, name))
            .find(|candidate| is_executable(candidate));
        debug!(tool = name, found = ?found, "resolved executable");
        cache.insert(name.to_string(), found.clone());
        found
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
