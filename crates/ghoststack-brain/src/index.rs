//! Content-addressed document layer over [`VectorStore`] and [`EmbeddingModel`].

use std::collections::HashSet;

use ghoststack_core::GhostError;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::chunker::{ChunkKind, FULL_CHUNK_ID};
use crate::embedding::EmbeddingModel;
use crate::store::{Metadata, SearchResult, VectorStore};

/// Result of [`CodeIndex::add_chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document with this id existed.
    Inserted,
    /// The document existed with different content and was replaced.
    Updated,
    /// The stored content hash matched; nothing was embedded or written.
    Unchanged,
}

/// Deterministic document id for a chunk of a file.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::index::document_id;
///
/// assert_eq!(document_id("src/auth.py", "login"), "src_auth_py::login");
/// assert_eq!(document_id("a.b/c.py", "full"), "a_b_c_py::full");
/// ```
pub fn document_id(file_path: &str, chunk_id: &str) -> String {
    format!("{file_path}::{chunk_id}").replace(['/', '.'], "_")
}

/// Id of the document holding a file's whole content.
pub fn whole_file_id(file_path: &str) -> String {
    document_id(file_path, FULL_CHUNK_ID)
}

/// First 16 hex characters of the SHA-256 of `bytes`.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::index::short_hash;
///
/// let h = short_hash(b"hello");
/// assert_eq!(h, "2cf24dba5fb0a30e");
/// ```
pub fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Chunk-level index: deduplicates by content hash before embedding.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::embedding::EmbeddingModel;
/// use ghoststack_brain::index::{CodeIndex, UpsertOutcome};
/// use ghoststack_brain::store::{Metadata, VectorStore};
///
/// let store = VectorStore::in_memory().unwrap();
/// let model = EmbeddingModel::fallback(16);
/// let index = CodeIndex::new(&store, &model);
///
/// let first = index.add_chunk("a.py", "f", "def f(): pass", Metadata::new()).unwrap();
/// let again = index.add_chunk("a.py", "f", "def f(): pass", Metadata::new()).unwrap();
/// assert_eq!(first, UpsertOutcome::Inserted);
/// assert_eq!(again, UpsertOutcome::Unchanged);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CodeIndex<'a> {
    store: &'a VectorStore,
    embedder: &'a EmbeddingModel,
}

impl<'a> CodeIndex<'a> {
    pub fn new(store: &'a VectorStore, embedder: &'a EmbeddingModel) -> Self {
        Self { store, embedder }
    }

    /// The underlying store.
    pub fn store(&self) -> &'a VectorStore {
        self.store
    }

    /// The embedding model used for documents and queries.
    pub fn embedder(&self) -> &'a EmbeddingModel {
        self.embedder
    }

    /// Upsert one chunk, skipping the embed and write if its content is unchanged.
    ///
    /// `file_path`, `chunk_id` and `content_hash` are always set in the stored
    /// metadata, overriding any caller-supplied values.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] if the store cannot be read or written.
    pub fn add_chunk(
        &self,
        file_path: &str,
        chunk_id: &str,
        content: &str,
        mut metadata: Metadata,
    ) -> Result<UpsertOutcome, GhostError> {
        let id = document_id(file_path, chunk_id);
        let content_hash = short_hash(content.as_bytes());

        let existing = self.store.content_hash(&id)?;
        if existing.as_deref() == Some(content_hash.as_str()) {
            tracing::debug!(%id, "chunk unchanged");
            return Ok(UpsertOutcome::Unchanged);
        }

        metadata.insert("file_path".into(), Value::from(file_path));
        metadata.insert("chunk_id".into(), Value::from(chunk_id));
        metadata.insert("content_hash".into(), Value::from(content_hash));

        let vector = self.embedder.embed(content);
        self.store.upsert(&id, &vector, content, &metadata)?;

        Ok(if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    /// Upsert a file's whole content as its `full` document.
    ///
    /// # Errors
    ///
    /// Same as [`CodeIndex::add_chunk`].
    pub fn add_file(
        &self,
        file_path: &str,
        content: &str,
        mut metadata: Metadata,
    ) -> Result<UpsertOutcome, GhostError> {
        metadata.insert("type".into(), Value::from(ChunkKind::FullFile.as_str()));
        self.add_chunk(file_path, FULL_CHUNK_ID, content, metadata)
    }

    /// Nearest documents to `query`, never returning a file in `exclude_paths`.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure.
    pub fn search(
        &self,
        query: &str,
        n_results: usize,
        exclude_paths: Option<&HashSet<String>>,
    ) -> Result<Vec<SearchResult>, GhostError> {
        let vector = self.embedder.embed(query);
        self.store.query(&vector, n_results, exclude_paths)
    }

    /// Content of a file's whole-file document, if one was indexed.
    ///
    /// Files indexed as multiple chunks have no whole-file document.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure.
    pub fn file_content(&self, file_path: &str) -> Result<Option<String>, GhostError> {
        Ok(self
            .store
            .get(&whole_file_id(file_path))?
            .map(|doc| doc.content))
    }

    /// Delete every document of `file_path`. Returns whether any existed.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on delete failure.
    pub fn remove_file(&self, file_path: &str) -> Result<bool, GhostError> {
        Ok(self.store.delete_file(file_path)? > 0)
    }

    /// Delete documents of `file_path` whose chunk id is not in `keep`.
    /// Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query or delete failure.
    pub fn retain_file_chunks<'c>(
        &self,
        file_path: &str,
        keep: impl IntoIterator<Item = &'c str>,
    ) -> Result<usize, GhostError> {
        let keep: HashSet<String> = keep
            .into_iter()
            .map(|chunk_id| document_id(file_path, chunk_id))
            .collect();
        let mut removed = 0;
        for id in self.store.file_document_ids(file_path)? {
            if !keep.contains(&id) && self.store.delete(&id)? {
                tracing::debug!(%id, "stale chunk removed");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of stored documents.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure.
    pub fn count(&self) -> Result<usize, GhostError> {
        self.store.count()
    }

    /// Remove every document.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] if the store cannot be reset.
    pub fn clear(&self) -> Result<(), GhostError> {
        self.store.reset()
    }
}
