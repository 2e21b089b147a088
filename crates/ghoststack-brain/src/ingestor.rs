//! Incremental indexing of a source tree.
//!
//! The [`Ingestor`] walks the repository, skips files whose whole-file hash is
//! unchanged since the last pass, and pushes chunks of everything else through
//! a [`CodeIndex`].

use std::path::{Component, Path, PathBuf};

use ghoststack_core::{state_dir, BrainConfig, GhostError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunker::{chunker_for, Chunker, WindowChunker};
use crate::hash_cache::{FileHashCache, HASH_CACHE_FILE};
use crate::index::{short_hash, CodeIndex};
use crate::language::Language;

/// Directory names never descended into, matched against every path
/// component relative to the repository root.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    ".ghoststack",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".env",
    "dist",
    "build",
    ".next",
    ".nuxt",
    "target",
    "vendor",
    ".tox",
    ".pytest_cache",
    ".mypy_cache",
    "coverage",
    ".coverage",
];

/// Summary of an [`Ingestor::index_all`] pass.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::ingestor::IndexStats;
///
/// let stats = IndexStats { files_scanned: 10, files_indexed: 2, chunks_total: 7 };
/// let json = serde_json::to_value(&stats).unwrap();
/// assert_eq!(json["filesIndexed"], 2);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Files that passed the scan filters.
    pub files_scanned: usize,
    /// Files that produced at least one chunk this pass.
    pub files_indexed: usize,
    /// Chunks produced across all indexed files.
    pub chunks_total: usize,
}

/// Walks a repository and keeps a [`CodeIndex`] in sync with it.
pub struct Ingestor<'a> {
    root: PathBuf,
    index: CodeIndex<'a>,
    config: BrainConfig,
    cache: FileHashCache,
}

impl<'a> Ingestor<'a> {
    /// Create an ingestor for `root`, loading `.ghoststack/file_hashes.json`.
    pub fn new(root: &Path, index: CodeIndex<'a>, config: BrainConfig) -> Self {
        let cache = FileHashCache::load(&state_dir(root).join(HASH_CACHE_FILE));
        Self {
            root: root.to_path_buf(),
            index,
            config,
            cache,
        }
    }

    /// Repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hashes recorded so far, including unsaved updates from this pass.
    pub fn hash_cache(&self) -> &FileHashCache {
        &self.cache
    }

    /// Indexable files under the root, depth-first in file-name order.
    ///
    /// A file is indexable if no path component below the root is in
    /// [`SKIP_DIRS`], its extension is a supported [`Language`], and its size is
    /// at most `max_file_size`. Files whose metadata cannot be read are skipped.
    /// The walk is lazy; calling this again starts a fresh walk.
    pub fn scan_files(&self) -> impl Iterator<Item = PathBuf> {
        let root = self.root.clone();
        let max_file_size = self.config.max_file_size;

        let mut builder = ignore::WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| !is_skipped(entry.path(), &root));

        builder.build().filter_map(move |result| {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("skipping unreadable entry: {e}");
                    return None;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                return None;
            }

            let path = entry.path();
            Language::from_path(path)?;

            let len = entry.metadata().ok()?.len();
            if len > max_file_size {
                tracing::debug!("skipping large file {} ({len} bytes)", path.display());
                return None;
            }

            Some(entry.into_path())
        })
    }

    /// Index one file, returning how many chunks it produced.
    ///
    /// Without `force`, a file whose hash matches the cache returns `0` and the
    /// store is not touched. Unreadable files return `0` with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] if the store rejects a write.
    pub fn index_file(&mut self, path: &Path, force: bool) -> Result<usize, GhostError> {
        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let rel_path = self.relative_path(&full_path);

        let bytes = match std::fs::read(&full_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("cannot read {rel_path}: {e}");
                return Ok(0);
            }
        };

        let file_hash = short_hash(&bytes);
        if !force && self.cache.get(&rel_path) == Some(file_hash.as_str()) {
            tracing::debug!(file = %rel_path, "unchanged");
            return Ok(0);
        }
        self.cache.insert(rel_path.clone(), file_hash);

        let content = String::from_utf8_lossy(&bytes);
        let language = Language::from_path(&full_path);
        let chunker: Box<dyn Chunker> = match language {
            Some(lang) => chunker_for(lang, &self.config),
            None => Box::new(WindowChunker::from_config(&self.config)),
        };
        let language_name = language.map_or("unknown", |l| l.as_str());

        let chunks = chunker.chunk(&content);
        for chunk in &chunks {
            let mut metadata = chunk.metadata.clone();
            metadata.insert("language".into(), Value::from(language_name));
            metadata.insert("type".into(), Value::from(chunk.kind.as_str()));
            self.index
                .add_chunk(&rel_path, &chunk.id, &chunk.content, metadata)?;
        }
        self.index
            .retain_file_chunks(&rel_path, chunks.iter().map(|c| c.id.as_str()))?;

        tracing::debug!(file = %rel_path, chunks = chunks.len(), "indexed");
        Ok(chunks.len())
    }

    /// Index every file from [`Ingestor::scan_files`] and save the hash cache.
    ///
    /// `progress` is called after each file with its relative path, its
    /// 1-based position, and the total number of files.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on a store failure, or
    /// [`GhostError::Io`] if the hash cache cannot be saved.
    pub fn index_all(
        &mut self,
        force: bool,
        mut progress: impl FnMut(&str, usize, usize),
    ) -> Result<IndexStats, GhostError> {
        let files: Vec<PathBuf> = self.scan_files().collect();
        let mut stats = IndexStats {
            files_scanned: files.len(),
            ..IndexStats::default()
        };

        for (i, path) in files.iter().enumerate() {
            let chunks = self.index_file(path, force)?;
            if chunks > 0 {
                stats.files_indexed += 1;
                stats.chunks_total += chunks;
            }
            progress(&self.relative_path(path), i + 1, stats.files_scanned);
        }

        self.cache.save()?;
        tracing::info!(
            scanned = stats.files_scanned,
            indexed = stats.files_indexed,
            chunks = stats.chunks_total,
            "index pass complete"
        );
        Ok(stats)
    }

    /// Drop documents and cache entries of files that no longer exist.
    ///
    /// Returns the number of files removed. The cache is saved only if
    /// something was removed.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on a store failure, or
    /// [`GhostError::Io`] if the hash cache cannot be saved.
    pub fn remove_deleted_files(&mut self) -> Result<usize, GhostError> {
        let missing: Vec<String> = self
            .cache
            .paths()
            .filter(|p| !self.root.join(p).exists())
            .map(str::to_string)
            .collect();

        for rel_path in &missing {
            self.index.remove_file(rel_path)?;
            self.cache.remove(rel_path);
            tracing::debug!(file = %rel_path, "removed deleted file");
        }

        if !missing.is_empty() {
            self.cache.save()?;
        }
        Ok(missing.len())
    }

    fn relative_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn is_skipped(path: &Path, root: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    rel.components().any(|c| match c {
        Component::Normal(part) => part.to_str().is_some_and(|s| SKIP_DIRS.contains(&s)),
        _ => false,
    })
}
