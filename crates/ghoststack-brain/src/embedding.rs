//! Text embeddings with a permanent, deterministic fallback.
//!
//! [`EmbeddingModel`] builds its real backend lazily on first use. If the
//! backend cannot be built, or any inference call fails, the model switches to
//! a hash-derived pseudo-embedding for the rest of its lifetime so the indexing
//! pipeline always gets *some* vector.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use ghoststack_core::{EmbeddingConfig, GhostError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 384;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
const BATCH_SIZE: usize = 64;
const BATCH_DELAY_MS: u64 = 200;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A real embedding backend.
pub trait EmbeddingBackend: Send {
    /// Embed `texts`, returning one vector per input in the same order.
    ///
    /// # Errors
    ///
    /// Any error sends the owning [`EmbeddingModel`] into fallback mode.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GhostError>;
}

/// Deferred backend constructor, run at most once.
pub type BackendFactory =
    Box<dyn FnOnce() -> Result<Box<dyn EmbeddingBackend>, GhostError> + Send>;

enum BackendState {
    Unloaded(BackendFactory),
    Ready(Box<dyn EmbeddingBackend>),
    Fallback,
}

/// Embedding provider owned by the application and shared by reference.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::embedding::EmbeddingModel;
///
/// let model = EmbeddingModel::fallback(384);
/// let a = model.embed("def handler(event): ...");
/// let b = model.embed("def handler(event): ...");
/// assert_eq!(a.len(), 384);
/// assert_eq!(a, b);
/// assert!(model.is_fallback());
/// ```
pub struct EmbeddingModel {
    state: Mutex<BackendState>,
    dimension: usize,
}

impl std::fmt::Debug for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingModel")
            .field("dimension", &self.dimension)
            .field("fallback", &self.is_fallback())
            .finish_non_exhaustive()
    }
}

impl EmbeddingModel {
    /// Create a model whose backend is built by `factory` on first use.
    pub fn with_factory(factory: BackendFactory, dimension: usize) -> Self {
        Self {
            state: Mutex::new(BackendState::Unloaded(factory)),
            dimension,
        }
    }

    /// Create a model that is in fallback mode from the start.
    pub fn fallback(dimension: usize) -> Self {
        Self {
            state: Mutex::new(BackendState::Fallback),
            dimension,
        }
    }

    /// Create a model from an [`EmbeddingConfig`].
    ///
    /// Provider `"hash"` starts in fallback mode; `"openai"` and `"voyage"`
    /// defer to an HTTP backend built on first use.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Config`] for an unknown provider or a zero dimension.
    ///
    /// # Examples
    ///
    /// ```
    /// use ghoststack_core::EmbeddingConfig;
    /// use ghoststack_brain::embedding::EmbeddingModel;
    ///
    /// let config = EmbeddingConfig { provider: "hash".into(), ..EmbeddingConfig::default() };
    /// let model = EmbeddingModel::from_config(&config).unwrap();
    /// assert!(model.is_fallback());
    /// ```
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, GhostError> {
        if config.dimensions == 0 {
            return Err(GhostError::Config(
                "embedding.dimensions must be positive".into(),
            ));
        }
        match config.provider.as_str() {
            "hash" => Ok(Self::fallback(config.dimensions)),
            "openai" | "voyage" => {
                let config = config.clone();
                let dimension = config.dimensions;
                Ok(Self::with_factory(
                    Box::new(move || {
                        HttpEmbeddingBackend::with_config(&config)
                            .map(|b| Box::new(b) as Box<dyn EmbeddingBackend>)
                    }),
                    dimension,
                ))
            }
            other => Err(GhostError::Config(format!(
                "unknown embedding provider '{other}' (expected openai, voyage, or hash)"
            ))),
        }
    }

    /// Embed a single text. Never fails.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_batch(&[text.to_string()])
            .into_iter()
            .next()
            .unwrap_or_else(|| hash_embedding(text, self.dimension))
    }

    /// Embed several texts. An empty input returns an empty output without
    /// touching the backend.
    pub fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }

        let mut state = self.lock_state();
        self.ensure_loaded(&mut state);

        if let BackendState::Ready(backend) = &*state {
            match backend
                .embed_batch(texts)
                .and_then(|vectors| self.check_shape(texts.len(), vectors))
            {
                Ok(vectors) => return vectors,
                Err(e) => {
                    tracing::warn!("embedding backend failed, switching to hash fallback: {e}");
                    *state = BackendState::Fallback;
                }
            }
        }

        texts
            .iter()
            .map(|t| hash_embedding(t, self.dimension))
            .collect()
    }

    /// Dimension of every vector this model returns.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether the model has permanently switched to hash embeddings.
    pub fn is_fallback(&self) -> bool {
        matches!(*self.lock_state(), BackendState::Fallback)
    }

    fn lock_state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_loaded(&self, state: &mut BackendState) {
        if !matches!(state, BackendState::Unloaded(_)) {
            return;
        }
        let BackendState::Unloaded(factory) = std::mem::replace(state, BackendState::Fallback)
        else {
            return;
        };
        match factory() {
            Ok(backend) => {
                tracing::debug!("embedding backend loaded");
                *state = BackendState::Ready(backend);
            }
            Err(e) => {
                tracing::warn!("embedding backend unavailable, using hash fallback: {e}");
            }
        }
    }

    fn check_shape(
        &self,
        expected: usize,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<Vec<f32>>, GhostError> {
        if vectors.len() != expected {
            return Err(GhostError::Embedding(format!(
                "backend returned {} vectors for {expected} inputs",
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(GhostError::Embedding(format!(
                "backend returned {} dimensions, expected {}",
                bad.len(),
                self.dimension
            )));
        }
        Ok(vectors)
    }
}

/// Deterministic pseudo-embedding derived from SHA-256.
///
/// Each dimension `i` hashes the text digest followed by `i` (little-endian
/// `i32`), reads the first four bytes as a little-endian `f32` and folds it
/// into `[-1, 1]`. Not semantically meaningful.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::embedding::hash_embedding;
///
/// let v = hash_embedding("fn main() {}", 8);
/// assert_eq!(v.len(), 8);
/// assert!(v.iter().all(|x| (-1.0..=1.0).contains(x)));
/// ```
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());

    (0..dimension)
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(digest);
            hasher.update((i as i32).to_le_bytes());
            let h = hasher.finalize();
            let raw = f32::from_le_bytes([h[0], h[1], h[2], h[3]]);
            if raw.is_finite() {
                ((raw as f64).rem_euclid(2.0) - 1.0) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// HTTP client for OpenAI-compatible and Voyage embedding endpoints.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::embedding::HttpEmbeddingBackend;
///
/// let backend = HttpEmbeddingBackend::new("test-key").unwrap();
/// assert_eq!(backend.model(), "text-embedding-3-small");
/// ```
pub struct HttpEmbeddingBackend {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    flavor: Flavor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    OpenAi,
    Voyage,
}

impl std::fmt::Debug for HttpEmbeddingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimension: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
}

impl HttpEmbeddingBackend {
    /// Create an OpenAI backend with default model and dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Embedding`] if the HTTP client cannot be built.
    pub fn new(api_key: &str) -> Result<Self, GhostError> {
        let config = EmbeddingConfig {
            api_key: Some(api_key.to_string()),
            ..EmbeddingConfig::default()
        };
        Self::with_config(&config)
    }

    /// Create a backend from an [`EmbeddingConfig`].
    ///
    /// Falls back to `OPENAI_API_KEY` / `VOYAGE_API_KEY` if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`GhostError::Config`] if no API key is available or the provider
    /// is not HTTP based, and [`GhostError::Embedding`] if the client cannot be built.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, GhostError> {
        let (flavor, env_var, default_base) = match config.provider.as_str() {
            "openai" => (Flavor::OpenAi, "OPENAI_API_KEY", OPENAI_BASE_URL),
            "voyage" => (Flavor::Voyage, "VOYAGE_API_KEY", VOYAGE_BASE_URL),
            other => {
                return Err(GhostError::Config(format!(
                    "provider '{other}' has no HTTP embedding backend"
                )))
            }
        };

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| {
                GhostError::Config(format!(
                    "embedding API key not found: set embedding.api_key in .ghoststack/config.toml or {env_var}"
                ))
            })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GhostError::Embedding(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string()),
            model: config.model.clone(),
            dimensions: config.dimensions,
            flavor,
        })
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, texts: &[String]) -> EmbedRequest {
        match self.flavor {
            Flavor::OpenAi => EmbedRequest {
                model: self.model.clone(),
                input: texts.to_vec(),
                dimensions: Some(self.dimensions),
                input_type: None,
                output_dimension: None,
            },
            Flavor::Voyage => EmbedRequest {
                model: self.model.clone(),
                input: texts.to_vec(),
                dimensions: None,
                input_type: Some("document".to_string()),
                output_dimension: Some(self.dimensions),
            },
        }
    }
}

impl EmbeddingBackend for HttpEmbeddingBackend {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GhostError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                std::thread::sleep(Duration::from_millis(BATCH_DELAY_MS));
            }

            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&self.build_request(batch))
                .send()
                .map_err(|e| GhostError::Embedding(format!("HTTP request failed: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .unwrap_or_else(|_| "unable to read response body".into());
                return Err(GhostError::Embedding(format!(
                    "embedding API returned {status}: {body}"
                )));
            }

            let embed_response: EmbedResponse = response
                .json()
                .map_err(|e| GhostError::Embedding(format!("failed to parse response: {e}")))?;

            all_embeddings.extend(embed_response.data.into_iter().map(|item| item.embedding));
        }

        Ok(all_embeddings)
    }
}
