//! SQLite-backed vector store for code documents.
//!
//! Documents live in a single `ghoststack_code` table with their embedding
//! stored as a little-endian `f32` BLOB. Similarity is cosine, computed in Rust
//! over every candidate row; results are reported as cosine *distance*.

use std::collections::HashSet;
use std::path::Path;

use ghoststack_core::GhostError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Free-form JSON metadata attached to every document.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

const COLLECTION: &str = "ghoststack_code";
const DIMENSIONS_KEY: &str = "embedding_dimensions";

/// A document read back by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Document id.
    pub id: String,
    /// Raw chunk text.
    pub content: String,
    /// Metadata as written by the last upsert.
    pub metadata: Metadata,
}

/// A hit from [`VectorStore::query`].
///
/// # Examples
///
/// ```
/// use ghoststack_brain::store::{Metadata, SearchResult};
///
/// let hit = SearchResult {
///     id: "src_auth_py::login".into(),
///     file_path: "src/auth.py".into(),
///     chunk_id: "login".into(),
///     content: "def login(): ...".into(),
///     distance: 0.12,
///     metadata: Metadata::new(),
/// };
/// assert!(hit.distance < 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Document id.
    pub id: String,
    /// Repo-relative path of the source file.
    pub file_path: String,
    /// Chunk id within the file.
    pub chunk_id: String,
    /// Chunk text.
    pub content: String,
    /// Cosine distance to the query (`1 - cos_sim`); lower is closer.
    pub distance: f64,
    /// Document metadata.
    pub metadata: Metadata,
}

/// Store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Number of documents.
    pub documents: usize,
    /// Number of distinct source files.
    pub files: usize,
    /// Database size in bytes.
    pub size_bytes: u64,
    /// Embedding dimension recorded on first write, if any.
    pub dimensions: Option<usize>,
}

/// Persistent document store with filtered nearest-neighbour queries.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::store::{Metadata, VectorStore};
///
/// let store = VectorStore::in_memory().unwrap();
/// let mut meta = Metadata::new();
/// meta.insert("file_path".into(), "a.py".into());
/// store.upsert("a_py::full", &[1.0, 0.0], "print(1)", &meta).unwrap();
/// assert_eq!(store.count().unwrap(), 1);
/// ```
pub struct VectorStore {
    conn: Connection,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl VectorStore {
    /// Open or create a store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use ghoststack_brain::store::VectorStore;
    ///
    /// let store = VectorStore::open(Path::new(".ghoststack/brain/index.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self, GhostError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GhostError::Database(format!("failed to create store directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| GhostError::Database(format!("failed to open database: {e}")))?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, GhostError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            GhostError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), GhostError> {
        self.conn
            .execute_batch(&format!(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS {COLLECTION} (
                    id TEXT PRIMARY KEY,
                    file_path TEXT NOT NULL,
                    chunk_id TEXT NOT NULL,
                    content TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    embedding BLOB NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_{COLLECTION}_file
                    ON {COLLECTION}(file_path);
                "
            ))
            .map_err(|e| GhostError::Database(format!("failed to create schema: {e}")))?;

        Ok(())
    }

    /// Record the embedding dimension, or check it against the recorded one.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] if `dimensions` differs from the
    /// dimension the store was first written with.
    pub fn set_dimensions(&self, dimensions: usize) -> Result<(), GhostError> {
        if self.get_dimensions()?.is_some() {
            return self.check_dimensions(dimensions);
        }

        self.set_metadata(DIMENSIONS_KEY, &dimensions.to_string())
    }

    /// Fail if the store was written with embeddings of a different dimension.
    ///
    /// A store with nothing recorded accepts any dimension.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on mismatch.
    pub fn check_dimensions(&self, dimensions: usize) -> Result<(), GhostError> {
        match self.get_dimensions()? {
            Some(stored) if stored != dimensions => Err(GhostError::Database(format!(
                "index was built with {stored}-dimensional embeddings but got {dimensions}; \
                 run `gs brain clear --yes` and re-index"
            ))),
            _ => Ok(()),
        }
    }

    /// Embedding dimension recorded in the store, if any document was written.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure or corrupted metadata.
    pub fn get_dimensions(&self) -> Result<Option<usize>, GhostError> {
        match self.get_metadata(DIMENSIONS_KEY)? {
            Some(v) => v.parse().map(Some).map_err(|_| {
                GhostError::Database(format!("corrupted dimension metadata in index: '{v}'"))
            }),
            None => Ok(None),
        }
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>, GhostError> {
        self.conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| GhostError::Database(format!("failed to get metadata '{key}': {e}")))
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<(), GhostError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| GhostError::Database(format!("failed to set metadata '{key}': {e}")))?;
        Ok(())
    }

    /// Insert a document or fully replace the one with the same id.
    ///
    /// `metadata` must contain a string `file_path`; `chunk_id` and
    /// `content_hash` are indexed as columns when present.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on write failure, a missing `file_path`,
    /// or a vector whose dimension disagrees with the store.
    pub fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        content: &str,
        metadata: &Metadata,
    ) -> Result<(), GhostError> {
        let file_path = metadata
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                GhostError::Database(format!("document '{id}' has no file_path metadata"))
            })?;
        let chunk_id = metadata_str(metadata, "chunk_id");
        let content_hash = metadata_str(metadata, "content_hash");

        self.set_dimensions(vector.len())?;

        let metadata_json = serde_json::to_string(metadata)?;
        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO {COLLECTION}
                     (id, file_path, chunk_id, content, content_hash, metadata, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    id,
                    file_path,
                    chunk_id,
                    content,
                    content_hash,
                    metadata_json,
                    floats_to_bytes(vector),
                ],
            )
            .map_err(|e| GhostError::Database(format!("failed to upsert '{id}': {e}")))?;

        Ok(())
    }

    /// Fetch a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure.
    pub fn get(&self, id: &str) -> Result<Option<StoredDocument>, GhostError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                &format!("SELECT content, metadata FROM {COLLECTION} WHERE id = ?1"),
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| GhostError::Database(format!("failed to get '{id}': {e}")))?;

        match row {
            Some((content, metadata_json)) => Ok(Some(StoredDocument {
                id: id.to_string(),
                content,
                metadata: parse_metadata(&metadata_json)?,
            })),
            None => Ok(None),
        }
    }

    /// Stored content hash for `id`, without loading content or embedding.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use ghoststack_brain::store::VectorStore;
    ///
    /// let store = VectorStore::in_memory().unwrap();
    /// assert!(store.content_hash("missing").unwrap().is_none());
    /// ```
    pub fn content_hash(&self, id: &str) -> Result<Option<String>, GhostError> {
        self.conn
            .query_row(
                &format!("SELECT content_hash FROM {COLLECTION} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| GhostError::Database(format!("failed to check '{id}': {e}")))
    }

    /// The `k` documents nearest to `vector`, ordered by ascending distance.
    ///
    /// Documents whose `file_path` is in `exclude_file_paths` are removed before
    /// ranking, so up to `k` non-excluded results are returned.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure, or if `vector` does
    /// not have the dimension the store was written with.
    ///
    /// # Examples
    ///
    /// ```
    /// use ghoststack_brain::store::VectorStore;
    ///
    /// let store = VectorStore::in_memory().unwrap();
    /// assert!(store.query(&[0.1, 0.2], 5, None).unwrap().is_empty());
    /// ```
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        exclude_file_paths: Option<&HashSet<String>>,
    ) -> Result<Vec<SearchResult>, GhostError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimensions(vector.len())?;

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT id, file_path, chunk_id, content, metadata, embedding FROM {COLLECTION}"
            ))
            .map_err(|e| GhostError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Vec<u8>>(5)?,
                ))
            })
            .map_err(|e| GhostError::Database(format!("failed to query documents: {e}")))?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, file_path, chunk_id, content, metadata_json, embedding) =
                row.map_err(|e| GhostError::Database(format!("failed to read row: {e}")))?;

            if exclude_file_paths.is_some_and(|excluded| excluded.contains(&file_path)) {
                continue;
            }

            let distance = 1.0 - cosine_similarity(vector, &bytes_to_floats(&embedding));
            scored.push(SearchResult {
                id,
                file_path,
                chunk_id,
                content,
                distance,
                metadata: parse_metadata(&metadata_json)?,
            });
        }

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Delete a document by id. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on delete failure.
    pub fn delete(&self, id: &str) -> Result<bool, GhostError> {
        let deleted = self
            .conn
            .execute(
                &format!("DELETE FROM {COLLECTION} WHERE id = ?1"),
                params![id],
            )
            .map_err(|e| GhostError::Database(format!("failed to delete '{id}': {e}")))?;
        Ok(deleted > 0)
    }

    /// Delete every document belonging to `file_path`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on delete failure.
    pub fn delete_file(&self, file_path: &str) -> Result<usize, GhostError> {
        self.conn
            .execute(
                &format!("DELETE FROM {COLLECTION} WHERE file_path = ?1"),
                params![file_path],
            )
            .map_err(|e| {
                GhostError::Database(format!("failed to delete documents of {file_path}: {e}"))
            })
    }

    /// Ids of every document belonging to `file_path`.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure.
    pub fn file_document_ids(&self, file_path: &str) -> Result<Vec<String>, GhostError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT id FROM {COLLECTION} WHERE file_path = ?1 ORDER BY id"
            ))
            .map_err(|e| GhostError::Database(format!("failed to prepare id lookup: {e}")))?;
        let ids = stmt
            .query_map(params![file_path], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| {
                GhostError::Database(format!("failed to list documents of {file_path}: {e}"))
            })?;
        Ok(ids)
    }

    /// Drop and recreate the collection, forgetting the recorded dimension.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] if the schema cannot be recreated.
    pub fn reset(&self) -> Result<(), GhostError> {
        self.conn
            .execute_batch(&format!(
                "DROP TABLE IF EXISTS {COLLECTION};
                 DELETE FROM metadata WHERE key = '{DIMENSIONS_KEY}';"
            ))
            .map_err(|e| GhostError::Database(format!("failed to reset store: {e}")))?;
        self.init_schema()
    }

    /// Number of stored documents.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure.
    pub fn count(&self) -> Result<usize, GhostError> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {COLLECTION}"), [], |row| {
                row.get(0)
            })
            .map_err(|e| GhostError::Database(format!("failed to count documents: {e}")))?;
        Ok(count as usize)
    }

    /// Document count, distinct files, database size and recorded dimension.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Database`] on query failure.
    pub fn stats(&self) -> Result<StoreStats, GhostError> {
        let files: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(DISTINCT file_path) FROM {COLLECTION}"),
                [],
                |row| row.get(0),
            )
            .map_err(|e| GhostError::Database(format!("failed to count files: {e}")))?;

        // In-memory databases report a handful of pages.
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(StoreStats {
            documents: self.count()?,
            files: files as usize,
            size_bytes: (page_count * page_size) as u64,
            dimensions: self.get_dimensions()?,
        })
    }
}

fn metadata_str<'m>(metadata: &'m Metadata, key: &str) -> &'m str {
    metadata.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn parse_metadata(json: &str) -> Result<Metadata, GhostError> {
    Ok(serde_json::from_str(json)?)
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}
