use std::path::PathBuf;

/// Errors that can occur across GhostStack.
///
/// Library crates return this type directly; the `gs` binary converts it to a
/// `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use ghoststack_core::GhostError;
///
/// let err = GhostError::Config("chunk_overlap must be smaller than chunk_size".into());
/// assert!(err.to_string().contains("chunk_overlap"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum GhostError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// Embedding backend construction or inference failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Vector store failure.
    #[error("database error: {0}")]
    #[diagnostic(help("run `gs brain clear --yes` and re-index if the index is corrupted"))]
    Database(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A file named on the command line or in configuration does not exist.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(help("check the path; it is resolved relative to the current directory"))]
    FileNotFound(PathBuf),
}
