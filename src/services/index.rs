//! Embedding index: text chunks as vectors, with a degraded mode.
//!
//! When no embedder or vector backend can be brought up, the index is built
//! `Degraded` and every operation becomes a no-op. Callers check
//! [`EmbeddingIndex::available`] and fall back to keyword search.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use keepsake_embeddings::{split_text, Embedder, EmbeddingService};
use keepsake_models::{timestamp, EmbeddingMetadata, MemoryId};
use keepsake_vectors::{
    PointPayload, QdrantStore, SearchFilter, SqliteVectorStore, VectorPoint, VectorStore,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ChunkConfig, Config, VectorBackend};
use crate::db::{self, DbPool, EmbeddingMirror};
use crate::Result;

/// Capability state of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexStatus {
    Ready { backend: String, model: String },
    Degraded { reason: String },
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub memory_id: MemoryId,
    pub chunk_index: u32,
    /// Chunk text, not the whole memory.
    pub text: String,
    pub metadata: PointPayload,
    /// Cosine distance, smaller is closer.
    pub distance: f32,
}

/// Point counts and metadata distributions.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub status: IndexStatus,
    pub points: u64,
    /// Distinct memories with at least one point.
    pub memories: usize,
    /// Per-memory emotion labels; unlabelled memories count as "none".
    pub emotions: BTreeMap<String, usize>,
    pub sources: BTreeMap<String, usize>,
}

struct ReadyIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    mirror: DbPool,
    chunking: ChunkConfig,
}

/// Vector side of the journal. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingIndex {
    ready: Option<Arc<ReadyIndex>>,
    status: IndexStatus,
}

impl EmbeddingIndex {
    /// An index that does nothing.
    pub fn degraded(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(reason = %reason, "Embedding index degraded, semantic search disabled");
        Self {
            ready: None,
            status: IndexStatus::Degraded { reason },
        }
    }

    /// Wire an embedder to a vector store. Degrades if the store cannot be
    /// prepared for the embedder's dimension.
    pub async fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        mirror: DbPool,
        chunking: ChunkConfig,
    ) -> Self {
        if let Err(e) = store.ensure_ready(embedder.dimension()).await {
            return Self::degraded(format!("{} backend not ready: {}", store.backend(), e));
        }

        let status = IndexStatus::Ready {
            backend: store.backend().to_string(),
            model: embedder.model_name(),
        };
        info!(
            backend = store.backend(),
            model = %embedder.model_name(),
            dimension = embedder.dimension(),
            "Embedding index ready"
        );

        Self {
            ready: Some(Arc::new(ReadyIndex {
                embedder,
                store,
                mirror,
                chunking,
            })),
            status,
        }
    }

    /// Build the index described by `config`. Never fails: anything missing
    /// yields a degraded index.
    pub async fn from_config(config: &Config, mirror: DbPool) -> Self {
        if config.vectors.backend == VectorBackend::None {
            return Self::degraded("vector backend disabled");
        }

        let embedder = match EmbeddingService::from_config(&config.embedding) {
            Ok(service) => Arc::new(service) as Arc<dyn Embedder>,
            Err(e) => return Self::degraded(format!("no embedder: {}", e)),
        };

        let store: Arc<dyn VectorStore> = match config.vectors.backend {
            VectorBackend::Sqlite => match SqliteVectorStore::open(&config.vectors.sqlite_path).await
            {
                Ok(store) => Arc::new(store),
                Err(e) => return Self::degraded(format!("sqlite vector store: {}", e)),
            },
            VectorBackend::Qdrant => match QdrantStore::connect(&config.vectors.qdrant).await {
                Ok(store) => Arc::new(store),
                Err(e) => return Self::degraded(format!("qdrant: {}", e)),
            },
            VectorBackend::None => return Self::degraded("vector backend disabled"),
        };

        Self::new(embedder, store, mirror, config.chunking.clone()).await
    }

    pub fn available(&self) -> bool {
        self.ready.is_some()
    }

    pub fn status(&self) -> IndexStatus {
        self.status.clone()
    }

    /// Chunk, embed and store one memory. Returns `false` when degraded or
    /// when the text has nothing to embed.
    pub async fn upsert(&self, text: &str, metadata: &EmbeddingMetadata) -> Result<bool> {
        let Some(ready) = &self.ready else {
            return Ok(false);
        };

        let chunks = split_text(text, ready.chunking.size, ready.chunking.overlap);
        if chunks.is_empty() {
            return Ok(false);
        }

        let vectors = ready.embedder.embed(&chunks).await?;
        let points: Vec<VectorPoint> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, vector))| {
                VectorPoint::new(vector, PointPayload::new(metadata, i as u32, chunk))
            })
            .collect();

        let model = ready.embedder.model_name();
        let tags = serde_json::to_string(&metadata.tags)?;
        let created_at = timestamp::encode(&metadata.created_at);
        let indexed_at = timestamp::encode(&keepsake_models::now());
        let mirrors: Vec<EmbeddingMirror> = points
            .iter()
            .map(|p| EmbeddingMirror {
                vector_id: p.id.clone(),
                memory_id: metadata.memory_id,
                chunk_index: i64::from(p.payload.chunk_index),
                model: model.clone(),
                emotion: metadata.emotion.clone(),
                tags: tags.clone(),
                created_at: created_at.clone(),
                indexed_at: indexed_at.clone(),
            })
            .collect();

        let count = points.len();
        ready.store.upsert(points).await?;
        db::upsert_embedding_mirrors(&ready.mirror, &mirrors).await?;

        debug!(memory_id = metadata.memory_id, chunks = count, "Memory indexed");
        Ok(true)
    }

    /// Nearest chunks to `text`, closest first.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<IndexHit>> {
        let Some(ready) = &self.ready else {
            return Ok(Vec::new());
        };
        if k == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = ready.embedder.embed(&[text.to_string()]).await?;
        let Some(vector) = vectors.pop() else {
            return Ok(Vec::new());
        };

        let matches = ready.store.search(&vector, k, filter).await?;
        debug!(k, hits = matches.len(), "Index query");

        Ok(matches
            .into_iter()
            .map(|m| IndexHit {
                memory_id: m.payload.memory_id,
                chunk_index: m.payload.chunk_index,
                text: m.payload.text.clone(),
                distance: m.distance,
                metadata: m.payload,
            })
            .collect())
    }

    /// Delete points whose memory is not in `valid_ids`.
    pub async fn prune_orphans(&self, valid_ids: &[MemoryId]) -> Result<usize> {
        let Some(ready) = &self.ready else {
            return Ok(0);
        };

        let valid: HashSet<MemoryId> = valid_ids.iter().copied().collect();
        let orphans: Vec<String> = ready
            .store
            .scroll_all()
            .await?
            .into_iter()
            .filter(|p| !valid.contains(&p.payload.memory_id))
            .map(|p| p.id)
            .collect();

        if orphans.is_empty() {
            return Ok(0);
        }

        let removed = ready.store.delete(orphans.clone()).await?;
        db::delete_embedding_mirrors(&ready.mirror, &orphans).await?;

        info!(removed, "Pruned orphaned vectors");
        Ok(removed)
    }

    /// Delete every point of one memory.
    pub async fn remove_memory(&self, memory_id: MemoryId) -> Result<usize> {
        let Some(ready) = &self.ready else {
            return Ok(0);
        };

        let removed = ready.store.delete_memory(memory_id).await?;
        db::delete_embedding_mirrors_for(&ready.mirror, memory_id).await?;

        debug!(memory_id, removed, "Memory vectors removed");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let mut stats = IndexStats {
            status: self.status(),
            points: 0,
            memories: 0,
            emotions: BTreeMap::new(),
            sources: BTreeMap::new(),
        };

        let Some(ready) = &self.ready else {
            return Ok(stats);
        };

        stats.points = ready.store.count().await?;

        let mut seen = HashSet::new();
        for point in ready.store.scroll_all().await? {
            let payload = point.payload;
            if !seen.insert(payload.memory_id) {
                continue;
            }
            let emotion = payload.emotion.unwrap_or_else(|| "none".to_string());
            *stats.emotions.entry(emotion).or_default() += 1;
            *stats.sources.entry(payload.source).or_default() += 1;
        }
        stats.memories = seen.len();

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use keepsake_models::NewMemory;
    use keepsake_vectors::{StoredPoint, VectorMatch};

    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        fn backend(&self) -> &'static str {
            "broken"
        }
        async fn ensure_ready(&self, _dimension: usize) -> keepsake_vectors::Result<()> {
            Err(keepsake_vectors::Error::VectorStore("unreachable".into()))
        }
        async fn upsert(&self, _points: Vec<VectorPoint>) -> keepsake_vectors::Result<()> {
            unreachable!()
        }
        async fn search(
            &self,
            _vector: &[f32],
            _limit: usize,
            _filter: &SearchFilter,
        ) -> keepsake_vectors::Result<Vec<VectorMatch>> {
            unreachable!()
        }
        async fn delete(&self, _ids: Vec<String>) -> keepsake_vectors::Result<usize> {
            unreachable!()
        }
        async fn delete_memory(&self, _memory_id: MemoryId) -> keepsake_vectors::Result<usize> {
            unreachable!()
        }
        async fn scroll_all(&self) -> keepsake_vectors::Result<Vec<StoredPoint>> {
            unreachable!()
        }
        async fn count(&self) -> keepsake_vectors::Result<u64> {
            unreachable!()
        }
    }

    async fn setup() -> (EmbeddingIndex, DbPool) {
        let pool = db::init_pool(":memory:").await.unwrap();
        db::initialize_schema(&pool).await.unwrap();
        let index = EmbeddingIndex::from_config(&Config::in_memory(), pool.clone()).await;
        (index, pool)
    }

    #[tokio::test]
    async fn test_degraded_is_noop() {
        let index = EmbeddingIndex::degraded("test");
        assert!(!index.available());

        let meta = metadata(1);
        assert!(!index.upsert("anything", &meta).await.unwrap());
        assert!(index
            .query("anything", 5, &SearchFilter::new())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(index.prune_orphans(&[]).await.unwrap(), 0);
        assert_eq!(index.remove_memory(1).await.unwrap(), 0);
        assert_eq!(index.stats().await.unwrap().points, 0);
    }

    #[tokio::test]
    async fn test_unready_store_degrades() {
        let pool = db::init_pool(":memory:").await.unwrap();
        let embedder =
            EmbeddingService::from_config(&Config::in_memory().embedding).unwrap();
        let index = EmbeddingIndex::new(
            Arc::new(embedder),
            Arc::new(BrokenStore),
            pool,
            ChunkConfig::default(),
        )
        .await;

        assert!(!index.available());
        assert!(matches!(index.status(), IndexStatus::Degraded { .. }));
    }

    #[tokio::test]
    async fn test_backend_none_degrades() {
        let pool = db::init_pool(":memory:").await.unwrap();
        let mut config = Config::in_memory();
        config.vectors.backend = VectorBackend::None;
        let index = EmbeddingIndex::from_config(&config, pool).await;
        assert!(!index.available());
    }

    #[tokio::test]
    async fn test_reupsert_does_not_duplicate() {
        let (index, pool) = setup().await;
        assert!(index.available());

        let record = db::insert_memory(&pool, &NewMemory::new("late night debugging"))
            .await
            .unwrap();
        let meta = record.embedding_metadata();

        assert!(index.upsert(&record.text, &meta).await.unwrap());
        assert!(index.upsert(&record.text, &meta).await.unwrap());

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.points, 1);
        assert_eq!(stats.memories, 1);
        assert_eq!(stats.emotions.get("none"), Some(&1));
        assert_eq!(db::list_embedding_mirrors(&pool, record.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_and_remove() {
        let (index, pool) = setup().await;

        let a = db::insert_memory(&pool, &NewMemory::new("I love debugging at night"))
            .await
            .unwrap();
        let b = db::insert_memory(&pool, &NewMemory::new("Stressful deadline today"))
            .await
            .unwrap();
        for r in [&a, &b] {
            index.upsert(&r.text, &r.embedding_metadata()).await.unwrap();
        }

        let hits = index.query("debugging", 2, &SearchFilter::new()).await.unwrap();
        assert_eq!(hits[0].memory_id, a.id);
        assert!(hits[0].distance < hits[1].distance);

        assert_eq!(index.remove_memory(a.id).await.unwrap(), 1);
        let hits = index.query("debugging", 2, &SearchFilter::new()).await.unwrap();
        assert!(hits.iter().all(|h| h.memory_id != a.id));
    }

    #[tokio::test]
    async fn test_prune_orphans() {
        let (index, pool) = setup().await;

        let keep = db::insert_memory(&pool, &NewMemory::new("keep")).await.unwrap();
        let drop = db::insert_memory(&pool, &NewMemory::new("drop")).await.unwrap();
        for r in [&keep, &drop] {
            index.upsert(&r.text, &r.embedding_metadata()).await.unwrap();
        }

        assert_eq!(index.prune_orphans(&[keep.id]).await.unwrap(), 1);
        assert_eq!(index.stats().await.unwrap().points, 1);
        assert!(db::list_embedding_mirrors(&pool, drop.id).await.unwrap().is_empty());
    }

    fn metadata(memory_id: MemoryId) -> EmbeddingMetadata {
        EmbeddingMetadata {
            memory_id,
            emotion: None,
            tags: Vec::new(),
            source: "manual".to_string(),
            flagged: false,
            created_at: chrono::Utc::now(),
        }
    }
}
