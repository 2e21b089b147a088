//! Local semantic code index.
//!
//! Source files are chunked (structurally for Python, by character windows
//! otherwise), embedded, and stored in a SQLite vector store under
//! `.ghoststack/brain/`. Re-indexing is incremental at two levels: whole files
//! are skipped by content hash, and unchanged chunks are never re-embedded.
//!
//! ```no_run
//! use std::path::Path;
//! use ghoststack_core::GhostConfig;
//! use ghoststack_brain::{index_db_path, CodeIndex, EmbeddingModel, Ingestor, VectorStore};
//!
//! let root = Path::new(".");
//! let config = GhostConfig::load_or_default(root).unwrap();
//! let store = VectorStore::open(&index_db_path(root)).unwrap();
//! let model = EmbeddingModel::from_config(&config.embedding).unwrap();
//!
//! let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), config.brain);
//! let stats = ingestor.index_all(false, |_, _, _| {}).unwrap();
//! println!("{} chunks", stats.chunks_total);
//! ```

use std::path::{Path, PathBuf};

pub mod chunker;
pub mod embedding;
pub mod hash_cache;
pub mod index;
pub mod ingestor;
pub mod language;
pub mod store;

pub use embedding::EmbeddingModel;
pub use index::CodeIndex;
pub use ingestor::{IndexStats, Ingestor};
pub use store::VectorStore;

/// Location of the vector store database for a repository.
///
/// # Examples
///
/// ```
/// use std::path::{Path, PathBuf};
/// use ghoststack_brain::index_db_path;
///
/// assert_eq!(
///     index_db_path(Path::new("/repo")),
///     PathBuf::from("/repo/.ghoststack/brain/index.db"),
/// );
/// ```
pub fn index_db_path(repo_root: &Path) -> PathBuf {
    ghoststack_core::state_dir(repo_root)
        .join("brain")
        .join("index.db")
}
