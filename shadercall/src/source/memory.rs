use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use super::path::normalize;
use super::{SourceError, SourceProvider};

/// In-memory source provider for tests and embedded shaders.
///
/// Thread-safe and mutable after being handed to a [`Device`](crate::Device):
/// clones share the same storage, so sources can be replaced between loads.
///
/// # Example
///
/// ```
/// use shadercall::MemorySource;
///
/// let sources = MemorySource::new();
/// sources.insert("shaders/math.wgsl", "fn add(a: f32, b: f32) -> f32 { return a + b; }");
/// assert!(sources.contains("shaders/./math.wgsl"));
/// ```
#[derive(Clone, Default)]
pub struct MemorySource {
    files: Arc<RwLock<HashMap<PathBuf, String>>>,
}

impl MemorySource {
    /// Create an empty in-memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, overwriting any previous content at the same path.
    pub fn insert(&self, path: impl AsRef<Path>, source: impl Into<String>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(path.as_ref()), source.into());
    }

    /// Remove a file, returning its content if it existed.
    pub fn remove(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize(path.as_ref()))
    }

    /// Whether a file is stored at `path`.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.exists(path.as_ref())
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MemorySource")
            .field("files", &files.len())
            .finish()
    }
}

impl SourceProvider for MemorySource {
    fn read_to_string(&self, path: &Path) -> Result<String, SourceError> {
        let key = normalize(path);
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or(SourceError::NotFound(key))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&normalize(path))
    }
}
