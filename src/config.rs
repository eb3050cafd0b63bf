//! Configuration management for Keepsake.
//!
//! Loads configuration from environment variables (optionally via a `.env`
//! file). There is no global instance: build a [`Config`] once and hand it
//! to [`Journal::open`](crate::Journal::open).

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use keepsake_embeddings::{default_dimension, EmbeddingConfig, ProviderConfig};
use keepsake_vectors::QdrantConfig;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub vectors: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub chunking: ChunkConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    /// Pre-delete snapshots go here when set.
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Sqlite,
    Qdrant,
    /// Semantic search switched off.
    None,
}

impl std::str::FromStr for VectorBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "qdrant" => Ok(Self::Qdrant),
            "none" | "off" => Ok(Self::None),
            _ => Err(format!("Unknown vector backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    /// Separate database file for the SQLite backend.
    pub sqlite_path: String,
    pub qdrant: QdrantConfig,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Semantic hits scoring below this are dropped.
    pub similarity_threshold: f32,
    /// Multiplier for hits whose emotion differs from the current one.
    pub emotion_penalty: f32,
    /// Synthetic score of emotion-path hits.
    pub emotional_score: f32,
    pub lookback_days: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            emotion_penalty: 0.7,
            emotional_score: 0.5,
            lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub max_chars: usize,
    pub preview_chars: usize,
    pub max_memories: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            preview_chars: 200,
            max_memories: 5,
        }
    }
}

/// Smallest accepted `CHUNK_SIZE`.
pub const MIN_CHUNK_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: keepsake_embeddings::chunk::DEFAULT_CHUNK_SIZE,
            overlap: keepsake_embeddings::chunk::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an explicit key/value map.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Load using `lookup` to resolve each key. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let embedding = Self::parse_embedding_config(&vars)?;

        Ok(Self {
            database: DatabaseConfig {
                path: vars.env_or("DATABASE_PATH", "./data/keepsake.db"),
                backup_dir: vars.get("BACKUP_DIR").map(PathBuf::from),
            },
            vectors: VectorConfig {
                backend: vars
                    .env_or("VECTOR_BACKEND", "sqlite")
                    .parse()
                    .map_err(Error::Config)?,
                sqlite_path: vars.env_or("VECTOR_DB_PATH", "./data/keepsake-vectors.db"),
                qdrant: QdrantConfig::new(
                    vars.env_or("QDRANT_URL", "http://localhost:6334"),
                    vars.env_or("QDRANT_COLLECTION_PREFIX", "keepsake_"),
                ),
            },
            embedding,
            retrieval: RetrievalConfig {
                similarity_threshold: vars.parse_or("SIMILARITY_THRESHOLD", 0.7)?,
                emotion_penalty: vars.parse_or("EMOTION_PENALTY", 0.7)?,
                emotional_score: vars.parse_or("EMOTIONAL_SCORE", 0.5)?,
                lookback_days: vars.parse_or("LOOKBACK_DAYS", 30)?,
            },
            context: ContextConfig {
                max_chars: vars.parse_or("CONTEXT_MAX_CHARS", 2000)?,
                preview_chars: vars.parse_or("CONTEXT_PREVIEW_CHARS", 200)?,
                max_memories: vars.parse_or("CONTEXT_MAX_MEMORIES", 5)?,
            },
            chunking: Self::parse_chunk_config(&vars)?,
        })
    }

    fn parse_chunk_config(vars: &Vars<'_>) -> Result<ChunkConfig> {
        let size = vars.parse_or("CHUNK_SIZE", keepsake_embeddings::chunk::DEFAULT_CHUNK_SIZE)?;
        if size < MIN_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "CHUNK_SIZE must be at least {}, got {}",
                MIN_CHUNK_SIZE, size
            )));
        }
        let overlap = vars.parse_or(
            "CHUNK_OVERLAP",
            keepsake_embeddings::chunk::DEFAULT_CHUNK_OVERLAP,
        )?;
        Ok(ChunkConfig { size, overlap })
    }

    /// Everything in memory with the local embedder. Handy for tests and
    /// throwaway sessions.
    pub fn in_memory() -> Self {
        Self {
            database: DatabaseConfig {
                path: ":memory:".to_string(),
                backup_dir: None,
            },
            vectors: VectorConfig {
                backend: VectorBackend::Sqlite,
                sqlite_path: ":memory:".to_string(),
                qdrant: QdrantConfig::new("http://localhost:6334", "keepsake_"),
            },
            embedding: EmbeddingConfig {
                providers: vec![ProviderConfig::new("local", None)],
                dimension: 256,
                timeout_secs: 30,
            },
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            chunking: ChunkConfig::default(),
        }
    }

    /// Build the embedding provider list from the credentials present.
    ///
    /// Order: Gemini, OpenAI, Ollama, then the local embedder. No providers
    /// means semantic search is unavailable.
    fn parse_embedding_config(vars: &Vars<'_>) -> Result<EmbeddingConfig> {
        let mut providers = Vec::new();

        if let Some(key) = vars.get("GOOGLE_API_KEY") {
            providers.push(ProviderConfig::new("gemini", Some(key)));
        }
        if let Some(key) = vars.get("OPENAI_API_KEY") {
            providers.push(ProviderConfig::new("openai", Some(key)));
        }
        if let Some(url) = vars.get("OLLAMA_URL") {
            let mut ollama = ProviderConfig::new("ollama", None);
            ollama.base_url = url.trim_end_matches('/').to_string();
            if let Some(model) = vars.get("OLLAMA_EMBED_MODEL") {
                ollama.model = model;
            }
            providers.push(ollama);
        }
        if vars.flag("LOCAL_EMBEDDINGS") {
            providers.push(ProviderConfig::new("local", None));
        }

        // Fallback providers must agree on one dimension, so the primary
        // provider's native size wins unless one is given explicitly.
        let native = providers
            .first()
            .and_then(|p| default_dimension(&p.model));
        let dimension = match vars.get("EMBEDDING_DIMENSION") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("Invalid EMBEDDING_DIMENSION: {}", raw)))?,
            None => native.unwrap_or(384),
        };

        Ok(EmbeddingConfig {
            providers,
            dimension,
            timeout_secs: vars.parse_or("EMBEDDING_TIMEOUT_SECS", 30)?,
        })
    }
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn env_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid {}: {}", key, raw))),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false)
    }
}
