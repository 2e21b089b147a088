use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GhostError;

/// Name of the private state directory at the repository root.
pub const STATE_DIR: &str = ".ghoststack";

/// Name of the configuration file inside [`STATE_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration loaded from `.ghoststack/config.toml`.
///
/// Every section and field has a default, so an empty file is valid.
///
/// # Examples
///
/// ```
/// use ghoststack_core::GhostConfig;
///
/// let config = GhostConfig::default();
/// assert_eq!(config.brain.chunk_size, 2000);
/// assert_eq!(config.embedding.dimensions, 384);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GhostConfig {
    /// Indexing and chunking settings.
    #[serde(default)]
    pub brain: BrainConfig,
    /// Embedding backend settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Review workflow settings.
    #[serde(default)]
    pub review: ReviewConfig,
}

impl GhostConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::FileNotFound`] if `path` does not exist,
    /// [`GhostError::Io`] if the file cannot be read,
    /// [`GhostError::Toml`] if it is not valid TOML, or
    /// [`GhostError::Config`] if the values are inconsistent.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ghoststack_core::GhostConfig;
    /// use std::path::Path;
    ///
    /// let config = GhostConfig::from_file(Path::new(".ghoststack/config.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, GhostError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GhostError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Toml`] if parsing fails, or [`GhostError::Config`]
    /// if `chunk_overlap` is not smaller than `chunk_size`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ghoststack_core::GhostConfig;
    ///
    /// let config = GhostConfig::from_toml("[review]\nrelated = 8\n").unwrap();
    /// assert_eq!(config.review.related, 8);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, GhostError> {
        let config: Self = toml::from_str(content)?;
        config.brain.validate()?;
        Ok(config)
    }

    /// Load `<repo_root>/.ghoststack/config.toml`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`GhostConfig::from_file`] when the file exists.
    pub fn load_or_default(repo_root: &Path) -> Result<Self, GhostError> {
        let path = config_path(repo_root);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Path of the state directory for a repository.
///
/// # Examples
///
/// ```
/// use std::path::{Path, PathBuf};
/// use ghoststack_core::state_dir;
///
/// assert_eq!(state_dir(Path::new("/repo")), PathBuf::from("/repo/.ghoststack"));
/// ```
pub fn state_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(STATE_DIR)
}

/// Path of the configuration file for a repository.
pub fn config_path(repo_root: &Path) -> PathBuf {
    state_dir(repo_root).join(CONFIG_FILE)
}

/// Chunking and file-selection settings for the indexer.
///
/// # Examples
///
/// ```
/// use ghoststack_core::BrainConfig;
///
/// let config = BrainConfig::default();
/// assert_eq!(config.chunk_size, 2000);
/// assert_eq!(config.chunk_overlap, 200);
/// assert_eq!(config.max_file_size, 500_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    /// Window size in characters (default: 2000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive windows in characters (default: 200).
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Files larger than this many bytes are not indexed (default: 500000).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_max_file_size() -> u64 {
    500_000
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl BrainConfig {
    fn validate(&self) -> Result<(), GhostError> {
        if self.chunk_size == 0 {
            return Err(GhostError::Config("brain.chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(GhostError::Config(format!(
                "brain.chunk_overlap ({}) must be smaller than brain.chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Configuration for the embedding backend.
///
/// # Examples
///
/// ```
/// use ghoststack_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "openai");
/// assert_eq!(config.model, "text-embedding-3-small");
/// assert_eq!(config.dimensions, 384);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend: `"openai"`, `"voyage"`, or `"hash"` (always use the fallback).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// API key for the backend. Falls back to the provider's env var.
    pub api_key: Option<String>,
    /// Model name (default: `"text-embedding-3-small"`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Custom base URL for the embeddings endpoint.
    pub base_url: Option<String>,
    /// Embedding dimensions (default: 384).
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_provider() -> String {
    "openai".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_embedding_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: default_embedding_model(),
            base_url: None,
            dimensions: default_embedding_dimensions(),
        }
    }
}

/// Review workflow configuration.
///
/// # Examples
///
/// ```
/// use ghoststack_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.base_branch, "main");
/// assert_eq!(config.related, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Branch compared against when `--base` is not given (default: `"main"`).
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Number of related files requested per changed file (default: 5).
    #[serde(default = "default_related")]
    pub related: usize,
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_related() -> usize {
    5
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            base_branch: default_base_branch(),
            related: default_related(),
        }
    }
}
