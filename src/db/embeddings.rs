//! Relational mirror of the vectors held by the embedding index.
//!
//! One row per stored vector. Lets the record store answer "which memories
//! have been indexed" without asking the vector backend.

use chrono::{DateTime, Utc};
use keepsake_models::{timestamp, MemoryId, MemoryRecord};
use sqlx::FromRow;

use super::{DbPool, MemoryRow};
use crate::Result;

/// Mirror row for one stored vector.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EmbeddingMirror {
    pub vector_id: String,
    pub memory_id: i64,
    pub chunk_index: i64,
    pub model: String,
    pub emotion: Option<String>,
    pub tags: String, // JSON array
    pub created_at: String,
    pub indexed_at: String,
}

/// Insert or refresh mirror rows.
pub async fn upsert_embedding_mirrors(pool: &DbPool, rows: &[EmbeddingMirror]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO embeddings (
                vector_id, memory_id, chunk_index, model, emotion, tags, created_at, indexed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(vector_id) DO UPDATE SET
                memory_id = excluded.memory_id,
                chunk_index = excluded.chunk_index,
                model = excluded.model,
                emotion = excluded.emotion,
                tags = excluded.tags,
                created_at = excluded.created_at,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&row.vector_id)
        .bind(row.memory_id)
        .bind(row.chunk_index)
        .bind(&row.model)
        .bind(&row.emotion)
        .bind(&row.tags)
        .bind(&row.created_at)
        .bind(&row.indexed_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Mirror rows for one memory, by chunk.
pub async fn list_embedding_mirrors(
    pool: &DbPool,
    memory_id: MemoryId,
) -> Result<Vec<EmbeddingMirror>> {
    Ok(sqlx::query_as::<_, EmbeddingMirror>(
        "SELECT * FROM embeddings WHERE memory_id = ? ORDER BY chunk_index",
    )
    .bind(memory_id)
    .fetch_all(pool)
    .await?)
}

/// Drop mirror rows for one memory.
pub async fn delete_embedding_mirrors_for(pool: &DbPool, memory_id: MemoryId) -> Result<u64> {
    let result = sqlx::query("DELETE FROM embeddings WHERE memory_id = ?")
        .bind(memory_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Drop mirror rows by vector id.
pub async fn delete_embedding_mirrors(pool: &DbPool, vector_ids: &[String]) -> Result<u64> {
    if vector_ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; vector_ids.len()].join(", ");
    let query = format!("DELETE FROM embeddings WHERE vector_id IN ({})", placeholders);

    let mut q = sqlx::query(&query);
    for id in vector_ids {
        q = q.bind(id);
    }
    Ok(q.execute(pool).await?.rows_affected())
}

/// Live memories created since `since` (all of them when `None`) that have
/// no mirror rows yet, oldest first.
pub async fn list_unindexed_memories(
    pool: &DbPool,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<MemoryRecord>> {
    sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT m.* FROM memories m
        WHERE (?1 IS NULL OR m.created_at >= ?1)
          AND NOT EXISTS (SELECT 1 FROM embeddings e WHERE e.memory_id = m.id)
        ORDER BY m.created_at ASC, m.id ASC
        "#,
    )
    .bind(since.as_ref().map(timestamp::encode))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(MemoryRecord::try_from)
    .collect()
}
