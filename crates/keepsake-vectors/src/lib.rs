//! Vector storage for memory embeddings.
//!
//! Two backends sit behind the [`VectorStore`] trait: an embedded SQLite
//! table searched by brute-force cosine distance, and a Qdrant collection.
//! Both report cosine *distance* (0 means identical direction).

mod qdrant;
mod sqlite;

pub use qdrant::{QdrantConfig, QdrantStore};
pub use sqlite::SqliteVectorStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keepsake_models::{timestamp, EmbeddingMetadata, MemoryId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Error types for vector storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for vector storage.
pub type Result<T> = std::result::Result<T, Error>;

/// Metadata stored next to each vector.
///
/// Carries enough of the memory record to filter and render a hit
/// without going back to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub memory_id: MemoryId,
    pub chunk_index: u32,
    pub text: String,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub flagged: bool,
    pub created_at: String,
    /// Unix seconds of `created_at`, for numeric range filters.
    pub created_ts: i64,
}

impl PointPayload {
    pub fn new(metadata: &EmbeddingMetadata, chunk_index: u32, text: impl Into<String>) -> Self {
        Self {
            memory_id: metadata.memory_id,
            chunk_index,
            text: text.into(),
            emotion: metadata.emotion.clone(),
            tags: metadata.tags.clone(),
            source: metadata.source.clone(),
            flagged: metadata.flagged,
            created_at: timestamp::encode(&metadata.created_at),
            created_ts: timestamp::epoch_seconds(&metadata.created_at),
        }
    }

    /// Decoded creation time; `None` if the stored string is malformed.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        timestamp::decode(&self.created_at).ok()
    }
}

/// A vector ready to be written.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl VectorPoint {
    /// Build a point keyed by [`point_id`].
    pub fn new(vector: Vec<f32>, payload: PointPayload) -> Self {
        let created_at = payload.created_at().unwrap_or_default();
        Self {
            id: point_id(&created_at, payload.memory_id, payload.chunk_index),
            vector,
            payload,
        }
    }
}

/// A nearest-neighbour match.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine distance, smaller is closer.
    pub distance: f32,
    pub payload: PointPayload,
}

/// A stored point without its vector, as returned by [`VectorStore::scroll_all`].
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub payload: PointPayload,
}

/// Deterministic point id for one chunk of one memory.
///
/// Re-upserting the same chunk yields the same id, so the write overwrites
/// instead of duplicating.
pub fn point_id(created_at: &DateTime<Utc>, memory_id: MemoryId, chunk_index: u32) -> String {
    let key = format!(
        "{}:{}:{}",
        timestamp::encode(created_at),
        memory_id,
        chunk_index
    );
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Cosine distance between two vectors; `1.0` when either is zero.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Search filter shared by both backends.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub created_after: Option<DateTime<Utc>>,
    pub emotion: Option<String>,
    pub memory_id: Option<MemoryId>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn with_emotion(mut self, emotion: &str) -> Self {
        self.emotion = Some(emotion.to_string());
        self
    }

    pub fn with_memory_id(mut self, memory_id: MemoryId) -> Self {
        self.memory_id = Some(memory_id);
        self
    }

    /// In-process check, used by the SQLite backend after decoding a row.
    pub fn matches(&self, payload: &PointPayload) -> bool {
        if let Some(after) = &self.created_after {
            if payload.created_ts < timestamp::epoch_seconds(after) {
                return false;
            }
        }
        if let Some(emotion) = &self.emotion {
            if payload.emotion.as_deref() != Some(emotion.as_str()) {
                return false;
            }
        }
        if let Some(id) = self.memory_id {
            if payload.memory_id != id {
                return false;
            }
        }
        true
    }
}

/// Nearest-neighbour storage backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend label for logs and stats.
    fn backend(&self) -> &'static str;

    /// Prepare storage for vectors of `dimension`. Existing vectors of a
    /// different dimension are discarded.
    async fn ensure_ready(&self, dimension: usize) -> Result<()>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Closest points first.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>>;

    /// Delete points by id. Returns how many were removed; a backend that
    /// cannot report that counts distinct ids instead.
    async fn delete(&self, ids: Vec<String>) -> Result<usize>;

    /// Delete every point of one memory. Returns the number deleted.
    async fn delete_memory(&self, memory_id: MemoryId) -> Result<usize>;

    /// Every stored point, without vectors.
    async fn scroll_all(&self) -> Result<Vec<StoredPoint>>;

    /// Number of stored points.
    async fn count(&self) -> Result<u64>;
}
