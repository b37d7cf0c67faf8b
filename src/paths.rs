//! Logical path resolution.
//!
//! The supervisor receives *logical* file references (executable names,
//! log file names, PID marker names) and maps them to absolute paths
//! through an injected resolver. The hosting application typically roots
//! these in its data directory.

use std::path::{Path, PathBuf};

/// Maps logical file references to filesystem paths.
pub trait PathResolver: Send + Sync + 'static {
    /// Resolve a logical reference to a concrete path.
    ///
    /// Absolute inputs are returned unchanged.
    fn resolve(&self, logical: &str) -> PathBuf;
}

/// Resolver that joins relative references onto a base directory.
#[derive(Debug, Clone)]
pub struct BaseDirResolver {
    base: PathBuf,
}

impl BaseDirResolver {
    /// Create a resolver rooted at the given directory.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Create a resolver rooted at the platform data directory
    /// (e.g. `~/.local/share/corekeeper`), falling back to the current
    /// directory when no data directory is known.
    #[must_use]
    pub fn from_data_dir(app_name: &str) -> Self {
        let base = dirs::data_dir().map_or_else(|| PathBuf::from("."), |d| d.join(app_name));
        Self::new(base)
    }

    /// The base directory this resolver joins onto.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl PathResolver for BaseDirResolver {
    fn resolve(&self, logical: &str) -> PathBuf {
        let path = Path::new(logical);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}
