//! Embedding providers with ordered fallback.
//!
//! Supports the Gemini, OpenAI and Ollama embedding APIs plus an in-process
//! `local` hashed bag-of-words embedder. Providers are walked once each in
//! priority order; there is no retry loop, so a call costs at most one
//! request timeout per configured provider.
//!
//! Building a service with no providers fails with [`Error::NoProviders`].
//! Callers treat that as "semantic search unavailable".
//!
//! # Example
//!
//! ```no_run
//! use keepsake_embeddings::{Embedder, EmbeddingConfig, EmbeddingService, ProviderConfig};
//!
//! # async fn example() -> Result<(), keepsake_embeddings::Error> {
//! let config = EmbeddingConfig {
//!     providers: vec![ProviderConfig::new("ollama", None)],
//!     dimension: 768,
//!     timeout_secs: 30,
//! };
//!
//! let service = EmbeddingService::from_config(&config)?;
//! let vectors = service.embed(&["tea on the balcony".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

pub mod chunk;
mod local;

pub use chunk::split_text;
pub use local::hash_embed;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while embedding text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP client or response parsing failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Provider answered with an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider needs an API key and none was configured
    #[error("No credentials configured for {0}")]
    NoCredentials(String),

    /// Vector length differs from the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Nothing to embed with
    #[error("No embedding providers configured")]
    NoProviders,

    /// Every configured provider failed
    #[error("All embedding providers failed")]
    AllProvidersFailed,
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Providers; walked in ascending `priority`.
    pub providers: Vec<ProviderConfig>,
    /// Expected vector length.
    pub dimension: usize,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            dimension: 768,
            timeout_secs: 30,
        }
    }
}

/// Configuration for a single embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// "gemini", "openai", "ollama" or "local".
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Lower is tried first.
    pub priority: u8,
}

impl ProviderConfig {
    /// Provider with default endpoint and model for its name.
    pub fn new(name: &str, api_key: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            base_url: default_endpoint(name),
            model: default_model(name),
            api_key: api_key.filter(|k| !k.is_empty()),
            priority: default_priority(name),
        }
    }

    fn needs_key(&self) -> bool {
        matches!(self.name.as_str(), "gemini" | "openai")
    }
}

/// Default endpoint for a provider.
pub fn default_endpoint(name: &str) -> String {
    match name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        "openai" => "https://api.openai.com/v1".to_string(),
        "ollama" => "http://localhost:11434".to_string(),
        _ => String::new(),
    }
}

/// Default model for a provider.
pub fn default_model(name: &str) -> String {
    match name {
        "gemini" => "text-embedding-004".to_string(),
        "openai" => "text-embedding-3-small".to_string(),
        "ollama" => "nomic-embed-text".to_string(),
        _ => local::MODEL_NAME.to_string(),
    }
}

fn default_priority(name: &str) -> u8 {
    match name {
        "gemini" => 1,
        "openai" => 2,
        "ollama" => 3,
        _ => 10,
    }
}

/// Native dimension for a known model; `None` for models that follow the
/// configured dimension.
pub fn default_dimension(model: &str) -> Option<usize> {
    if model.contains("text-embedding-004") || model.contains("embedding-001") {
        Some(768)
    } else if model.contains("text-embedding-3-small") || model.contains("ada-002") {
        Some(1536)
    } else if model.contains("text-embedding-3-large") {
        Some(3072)
    } else if model.contains("nomic-embed-text") {
        Some(768)
    } else if model.contains("all-minilm") {
        Some(384)
    } else if model.contains("mxbai-embed-large") {
        Some(1024)
    } else {
        None
    }
}

// ============================================================================
// Embedder seam
// ============================================================================

/// Anything that turns text into fixed-length unit vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every returned vector.
    fn dimension(&self) -> usize;

    /// Label recorded next to stored vectors.
    fn model_name(&self) -> String;
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GeminiBatchResponse {
    embeddings: Option<Vec<GeminiEmbedding>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedResponse {
    data: Option<Vec<OpenAIEmbedding>>,
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    error: Option<String>,
}

// ============================================================================
// Embedding service
// ============================================================================

/// Multi-provider embedder.
///
/// Every returned vector is L2-normalised and checked against the
/// configured dimension; a provider returning the wrong length counts as
/// failed and the next one is tried.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<EmbeddingServiceInner>,
}

struct EmbeddingServiceInner {
    providers: Vec<ProviderConfig>,
    dimension: usize,
    client: Client,
}

impl EmbeddingService {
    /// Create a service from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let mut providers: Vec<ProviderConfig> = config
            .providers
            .iter()
            .filter(|p| {
                if p.needs_key() && p.api_key.is_none() {
                    warn!(provider = %p.name, "Skipping embedding provider without credentials");
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        if providers.is_empty() {
            return Err(Error::NoProviders);
        }

        providers.sort_by_key(|p| p.priority);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            providers = ?providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
            dimension = config.dimension,
            "Embedding service initialized"
        );

        Ok(Self {
            inner: Arc::new(EmbeddingServiceInner {
                providers,
                dimension: config.dimension,
                client,
            }),
        })
    }

    /// Provider names in the order they are tried.
    pub fn providers(&self) -> Vec<String> {
        self.inner.providers.iter().map(|p| p.name.clone()).collect()
    }

    async fn call_provider(
        &self,
        provider: &ProviderConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        match provider.name.as_str() {
            "gemini" => self.call_gemini(provider, texts).await,
            "openai" => self.call_openai(provider, texts).await,
            "ollama" => self.call_ollama(provider, texts).await,
            "local" => Ok(texts
                .iter()
                .map(|t| hash_embed(t, self.inner.dimension))
                .collect()),
            other => Err(Error::Internal(format!(
                "Unknown embedding provider: {}",
                other
            ))),
        }
    }

    async fn call_gemini(
        &self,
        provider: &ProviderConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let key = provider
            .api_key
            .as_deref()
            .ok_or_else(|| Error::NoCredentials(provider.name.clone()))?;

        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            provider.base_url, provider.model, key
        );

        let requests: Vec<_> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", provider.model),
                    "content": { "parts": [{ "text": text }] }
                })
            })
            .collect();

        let response = self
            .inner
            .client
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let resp: GeminiBatchResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!(
                "Gemini error ({}): {}",
                error.code.unwrap_or(status.as_u16() as i32),
                error.message
            )));
        }

        resp.embeddings
            .map(|embs| embs.into_iter().map(|e| e.values).collect())
            .ok_or_else(|| Error::Internal("No embeddings in Gemini response".to_string()))
    }

    async fn call_openai(
        &self,
        provider: &ProviderConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let key = provider
            .api_key
            .as_deref()
            .ok_or_else(|| Error::NoCredentials(provider.name.clone()))?;

        let url = format!("{}/embeddings", provider.base_url);

        let mut body = json!({
            "model": provider.model,
            "input": texts,
        });
        // Only the v3 models accept a requested dimension.
        if provider.model.starts_with("text-embedding-3") {
            body["dimensions"] = json!(self.inner.dimension);
        }

        let response = self
            .inner
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("OpenAI request failed: {}", e)))?;

        let resp: OpenAIEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse OpenAI response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!("OpenAI error: {}", error.message)));
        }

        let mut data = resp
            .data
            .ok_or_else(|| Error::Internal("No embeddings in OpenAI response".to_string()))?;

        data.sort_by_key(|e| e.index);

        Ok(data.into_iter().map(|e| e.embedding).collect())
    }

    async fn call_ollama(
        &self,
        provider: &ProviderConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", provider.base_url);

        let response = self
            .inner
            .client
            .post(&url)
            .json(&json!({ "model": provider.model, "input": texts }))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Ollama request failed: {}", e)))?;

        let resp: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!("Ollama error: {}", error)));
        }

        resp.embeddings
            .ok_or_else(|| Error::Internal("No embeddings in Ollama response".to_string()))
    }

    fn check(&self, count: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
        if vectors.len() != count {
            return Err(Error::Provider(format!(
                "expected {} embeddings, got {}",
                count,
                vectors.len()
            )));
        }

        vectors
            .into_iter()
            .map(|v| {
                if v.len() != self.inner.dimension {
                    return Err(Error::DimensionMismatch {
                        expected: self.inner.dimension,
                        actual: v.len(),
                    });
                }
                Ok(normalize(v))
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = texts.len(), "Generating embeddings");

        let mut last_error = None;

        for provider in &self.inner.providers {
            let outcome = self
                .call_provider(provider, texts)
                .await
                .and_then(|vectors| self.check(texts.len(), vectors));

            match outcome {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Embedding provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(Error::AllProvidersFailed))
    }

    fn dimension(&self) -> usize {
        self.inner.dimension
    }

    fn model_name(&self) -> String {
        self.inner
            .providers
            .first()
            .map(|p| format!("{}/{}", p.name, p.model))
            .unwrap_or_default()
    }
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

// ============================================================================
// Tests
// ============================================================================
