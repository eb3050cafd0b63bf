//! Embedded vector table in its own SQLite file.
//!
//! Vectors are stored as little-endian `f32` blobs and searched by
//! brute-force cosine distance. Fine for a personal journal; the row count
//! stays in the thousands.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use keepsake_models::MemoryId;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::{
    cosine_distance, Error, PointPayload, Result, SearchFilter, StoredPoint, VectorMatch,
    VectorPoint, VectorStore,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS vector_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS vectors (
        id TEXT PRIMARY KEY,
        memory_id INTEGER NOT NULL,
        chunk_index INTEGER NOT NULL,
        emotion TEXT,
        created_at TEXT NOT NULL,
        vector BLOB NOT NULL,
        payload TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_vectors_memory ON vectors(memory_id)",
    "CREATE INDEX IF NOT EXISTS idx_vectors_created ON vectors(created_at)",
];

/// SQLite-backed [`VectorStore`].
#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Open (or create) the vector database at `path`. `":memory:"` gives a
    /// private in-memory store.
    pub async fn open(path: &str) -> Result<Self> {
        let in_memory = path == ":memory:";

        if !in_memory {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        Error::VectorStore(format!("Failed to create {}: {}", parent.display(), e))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        // An in-memory database lives only as long as its connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self::from_pool(pool).await?;

        info!(path, "SQLite vector store opened");

        Ok(store)
    }

    /// Wrap an existing pool, creating the tables if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Release the underlying connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn stored_dimension(&self) -> Result<Option<usize>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM vector_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.and_then(|v| v.parse().ok()))
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ensure_ready(&self, dimension: usize) -> Result<()> {
        match self.stored_dimension().await? {
            Some(existing) if existing == dimension => {
                debug!(dimension, "Vector table already has the right dimension");
                return Ok(());
            }
            Some(existing) => {
                info!(
                    existing,
                    new_dim = dimension,
                    "Vector dimension changed - discarding stored vectors"
                );
                sqlx::query("DELETE FROM vectors").execute(&self.pool).await?;
            }
            None => {}
        }

        sqlx::query(
            "INSERT INTO vector_meta (key, value) VALUES ('dimension', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(dimension.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let expected = self.stored_dimension().await?;
        let count = points.len();
        let mut tx = self.pool.begin().await?;

        for point in points {
            if let Some(expected) = expected {
                if point.vector.len() != expected {
                    return Err(Error::DimensionMismatch {
                        expected,
                        actual: point.vector.len(),
                    });
                }
            }

            let payload = serde_json::to_string(&point.payload)?;

            sqlx::query(
                r#"
                INSERT INTO vectors (id, memory_id, chunk_index, emotion, created_at, vector, payload)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    memory_id = excluded.memory_id,
                    chunk_index = excluded.chunk_index,
                    emotion = excluded.emotion,
                    created_at = excluded.created_at,
                    vector = excluded.vector,
                    payload = excluded.payload
                "#,
            )
            .bind(&point.id)
            .bind(point.payload.memory_id)
            .bind(point.payload.chunk_index as i64)
            .bind(&point.payload.emotion)
            .bind(&point.payload.created_at)
            .bind(encode_vector(&point.vector))
            .bind(payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(count, "Upserted vectors");

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, vector, payload FROM vectors")
            .fetch_all(&self.pool)
            .await?;

        let mut matches = Vec::new();
        for row in rows {
            let payload: PointPayload = serde_json::from_str(row.get::<&str, _>("payload"))?;
            if !filter.matches(&payload) {
                continue;
            }
            let stored = decode_vector(row.get::<&[u8], _>("vector"));
            matches.push(VectorMatch {
                id: row.get("id"),
                distance: cosine_distance(vector, &stored),
                payload,
            });
        }

        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(limit);

        Ok(matches)
    }

    async fn delete(&self, ids: Vec<String>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            removed += sqlx::query("DELETE FROM vectors WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        Ok(removed as usize)
    }

    async fn delete_memory(&self, memory_id: MemoryId) -> Result<usize> {
        let result = sqlx::query("DELETE FROM vectors WHERE memory_id = ?")
            .bind(memory_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn scroll_all(&self) -> Result<Vec<StoredPoint>> {
        let rows = sqlx::query("SELECT id, payload FROM vectors ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<StoredPoint> {
                Ok(StoredPoint {
                    id: row.get("id"),
                    payload: serde_json::from_str(row.get::<&str, _>("payload"))?,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}
