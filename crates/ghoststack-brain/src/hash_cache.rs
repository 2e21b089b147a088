//! Persistent per-file content hashes used to skip unchanged files on re-index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ghoststack_core::GhostError;

/// File name of the hash cache inside the state directory.
pub const HASH_CACHE_FILE: &str = "file_hashes.json";

/// Per-file content hashes from the last indexing pass.
///
/// Persisted as a pretty-printed JSON object mapping repo-relative paths to
/// 16-hex-char SHA-256 prefixes. A missing or unreadable cache loads as empty.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::hash_cache::FileHashCache;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("file_hashes.json");
///
/// let mut cache = FileHashCache::load(&path);
/// cache.insert("src/app.py", "0123456789abcdef");
/// cache.save().unwrap();
///
/// let reloaded = FileHashCache::load(&path);
/// assert_eq!(reloaded.get("src/app.py"), Some("0123456789abcdef"));
/// ```
#[derive(Debug, Clone)]
pub struct FileHashCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileHashCache {
    /// Load the cache at `path`, treating a missing or corrupt file as empty.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("ignoring corrupt hash cache {}: {e}", path.display());
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Write the cache, creating its parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Io`] if the file cannot be written.
    pub fn save(&self) -> Result<(), GhostError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn get(&self, rel_path: &str) -> Option<&str> {
        self.entries.get(rel_path).map(String::as_str)
    }

    pub fn insert(&mut self, rel_path: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(rel_path.into(), hash.into());
    }

    pub fn remove(&mut self, rel_path: &str) -> Option<String> {
        self.entries.remove(rel_path)
    }

    /// Cached paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Location the cache is saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileHashCache::load(&dir.path().join("nope.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HASH_CACHE_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(FileHashCache::load(&path).is_empty());

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(FileHashCache::load(&path).is_empty());
    }

    #[test]
    fn save_creates_parent_and_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ghoststack").join(HASH_CACHE_FILE);

        let mut cache = FileHashCache::load(&path);
        cache.insert("b.py", "bbbbbbbbbbbbbbbb");
        cache.insert("a.py", "aaaaaaaaaaaaaaaa");
        cache.save().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains('\n'), "expected pretty JSON: {raw}");
        let parsed: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 2);

        let reloaded = FileHashCache::load(&path);
        assert_eq!(reloaded.paths().collect::<Vec<_>>(), ["a.py", "b.py"]);
    }

    #[test]
    fn remove_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FileHashCache::load(&dir.path().join(HASH_CACHE_FILE));
        cache.insert("a.py", "1");
        assert_eq!(cache.remove("a.py").as_deref(), Some("1"));
        assert_eq!(cache.remove("a.py"), None);
        assert_eq!(cache.len(), 0);
    }
}
