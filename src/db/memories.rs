//! Memory database queries.

use chrono::{DateTime, Utc};
use keepsake_models::{timestamp, MemoryId, MemoryRecord, NewMemory};
use sqlx::{FromRow, SqliteExecutor};

use super::DbPool;
use crate::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Memory row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct MemoryRow {
    pub id: i64,
    pub text: String,
    pub source: String,
    pub tags: String, // JSON array
    pub emotion: Option<String>,
    pub intensity: i64,
    pub flagged: bool,
    pub created_at: String,
}

impl MemoryRow {
    /// Parse tags JSON into a vector.
    pub fn tags_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

impl TryFrom<MemoryRow> for MemoryRecord {
    type Error = Error;

    fn try_from(row: MemoryRow) -> Result<Self> {
        let tags = row.tags_vec();
        Ok(MemoryRecord {
            id: row.id,
            text: row.text,
            source: row.source,
            tags,
            emotion: row.emotion,
            intensity: row.intensity.clamp(1, 10) as u8,
            flagged: row.flagged,
            created_at: timestamp::decode(&row.created_at)?,
        })
    }
}

fn into_records(rows: Vec<MemoryRow>) -> Result<Vec<MemoryRecord>> {
    rows.into_iter().map(MemoryRecord::try_from).collect()
}

// ============================================================================
// Queries
// ============================================================================

/// Insert a validated memory and return the stored record. Runs on a pool
/// or inside a caller's transaction.
pub async fn insert_memory<'e, E>(executor: E, input: &NewMemory) -> Result<MemoryRecord>
where
    E: SqliteExecutor<'e>,
{
    let created_at = input.created_at.unwrap_or_else(keepsake_models::now);
    let tags_json = serde_json::to_string(&input.tags)?;

    let row = sqlx::query_as::<_, MemoryRow>(
        r#"
        INSERT INTO memories (text, source, tags, emotion, intensity, flagged, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.text)
    .bind(input.source_or_default())
    .bind(&tags_json)
    .bind(&input.emotion)
    .bind(input.intensity_or_default() as i64)
    .bind(input.flagged)
    .bind(timestamp::encode(&created_at))
    .fetch_one(executor)
    .await?;

    row.try_into()
}

/// Get a live memory by ID (optional).
pub async fn get_memory_optional(pool: &DbPool, id: MemoryId) -> Result<Option<MemoryRecord>> {
    sqlx::query_as::<_, MemoryRow>("SELECT * FROM memories WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(MemoryRecord::try_from)
        .transpose()
}

/// Get a live memory by ID.
pub async fn get_memory(pool: &DbPool, id: MemoryId) -> Result<MemoryRecord> {
    get_memory_optional(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Memory not found: {}", id)))
}

/// Get several live memories. Unknown ids are skipped; order follows `ids`.
pub async fn get_memories(pool: &DbPool, ids: &[MemoryId]) -> Result<Vec<MemoryRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!("SELECT * FROM memories WHERE id IN ({})", placeholders);

    let mut q = sqlx::query_as::<_, MemoryRow>(&query);
    for id in ids {
        q = q.bind(id);
    }
    let mut records = into_records(q.fetch_all(pool).await?)?;

    records.sort_by_key(|r| ids.iter().position(|id| *id == r.id));
    Ok(records)
}

/// Subset of `ids` that still have a live row.
pub async fn filter_live_ids(pool: &DbPool, ids: &[MemoryId]) -> Result<Vec<MemoryId>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!(
        "SELECT id FROM memories WHERE id IN ({}) ORDER BY id",
        placeholders
    );

    let mut q = sqlx::query_scalar::<_, i64>(&query);
    for id in ids {
        q = q.bind(id);
    }
    Ok(q.fetch_all(pool).await?)
}

/// Every live memory id.
pub async fn list_live_ids(pool: &DbPool) -> Result<Vec<MemoryId>> {
    Ok(
        sqlx::query_scalar::<_, i64>("SELECT id FROM memories ORDER BY id")
            .fetch_all(pool)
            .await?,
    )
}

/// Newest first, optionally bounded to `created_at >= since`.
pub async fn list_recent_memories(
    pool: &DbPool,
    limit: i64,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<MemoryRecord>> {
    let rows = sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT * FROM memories
        WHERE (?1 IS NULL OR created_at >= ?1)
        ORDER BY created_at DESC, id DESC
        LIMIT ?2
        "#,
    )
    .bind(since.as_ref().map(timestamp::encode))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    into_records(rows)
}

/// Exact emotion match, newest first.
pub async fn list_memories_by_emotion(
    pool: &DbPool,
    emotion: &str,
    limit: i64,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<MemoryRecord>> {
    let rows = sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT * FROM memories
        WHERE emotion = ?1 AND (?2 IS NULL OR created_at >= ?2)
        ORDER BY created_at DESC, id DESC
        LIMIT ?3
        "#,
    )
    .bind(emotion)
    .bind(since.as_ref().map(timestamp::encode))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    into_records(rows)
}

/// Candidates for keyword matching, newest first.
///
/// When every token is ASCII, ASCII-only rows are narrowed in SQL to texts
/// containing at least one token. SQLite's `lower()` folds ASCII only, so
/// rows with any non-ASCII character are always returned and the caller
/// does the matching. Non-ASCII tokens skip the narrowing entirely.
pub async fn list_keyword_candidates(
    pool: &DbPool,
    tokens: &[String],
    since: Option<DateTime<Utc>>,
) -> Result<Vec<MemoryRecord>> {
    let prefilter = !tokens.is_empty() && tokens.iter().all(|t| t.is_ascii());

    let mut query = String::from("SELECT * FROM memories WHERE (? IS NULL OR created_at >= ?)");
    if prefilter {
        // UTF-8 byte length exceeds character length only for non-ASCII text.
        let mut clauses = vec!["length(CAST(text AS BLOB)) > length(text)"];
        clauses.extend(vec!["instr(lower(text), ?) > 0"; tokens.len()]);
        query.push_str(&format!(" AND ({})", clauses.join(" OR ")));
    }
    query.push_str(" ORDER BY created_at DESC, id DESC");

    let since = since.as_ref().map(timestamp::encode);
    let mut q = sqlx::query_as::<_, MemoryRow>(&query)
        .bind(since.clone())
        .bind(since);
    if prefilter {
        for token in tokens {
            q = q.bind(token);
        }
    }

    into_records(q.fetch_all(pool).await?)
}

/// Flagged memories, newest first.
pub async fn list_flagged_memories(pool: &DbPool, limit: i64) -> Result<Vec<MemoryRecord>> {
    let rows = sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT * FROM memories
        WHERE flagged = 1
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    into_records(rows)
}

/// Memories created in `[start, end]`, oldest first.
pub async fn list_memories_between(
    pool: &DbPool,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> Result<Vec<MemoryRecord>> {
    let rows = sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT * FROM memories
        WHERE created_at >= ? AND created_at <= ?
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(timestamp::encode(start))
    .bind(timestamp::encode(end))
    .fetch_all(pool)
    .await?;

    into_records(rows)
}

/// Recent memories that carry an emotion label, newest first.
pub async fn list_recent_emotions(
    pool: &DbPool,
    since: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<MemoryRecord>> {
    let rows = sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT * FROM memories
        WHERE emotion IS NOT NULL AND (?1 IS NULL OR created_at >= ?1)
        ORDER BY created_at DESC, id DESC
        LIMIT ?2
        "#,
    )
    .bind(since.as_ref().map(timestamp::encode))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    into_records(rows)
}

/// Count live memories.
pub async fn count_memories(pool: &DbPool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM memories")
        .fetch_one(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};
    use chrono::Duration;

    async fn setup_test_db() -> DbPool {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_insert_and_get_memory() {
        let pool = setup_test_db().await;

        let stored = insert_memory(
            &pool,
            &NewMemory::new("Sunset walk by the lake")
                .with_tags(["outdoors", "evening"])
                .with_emotion("peaceful")
                .with_intensity(7),
        )
        .await
        .unwrap();

        let fetched = get_memory(&pool, stored.id).await.unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(fetched.source, "manual");
        assert_eq!(fetched.tags, vec!["outdoors", "evening"]);
        assert_eq!(fetched.intensity, 7);
    }

    #[tokio::test]
    async fn test_get_missing_memory_is_not_found() {
        let pool = setup_test_db().await;
        assert!(matches!(get_memory(&pool, 404).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_memories_keeps_requested_order() {
        let pool = setup_test_db().await;
        let a = insert_memory(&pool, &NewMemory::new("a")).await.unwrap();
        let b = insert_memory(&pool, &NewMemory::new("b")).await.unwrap();

        let records = get_memories(&pool, &[b.id, 999, a.id]).await.unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        assert_eq!(filter_live_ids(&pool, &[a.id, 999]).await.unwrap(), vec![a.id]);
    }

    #[tokio::test]
    async fn test_recent_respects_window_and_order() {
        let pool = setup_test_db().await;
        let now = Utc::now();

        insert_memory(&pool, &NewMemory::new("old").created_at(now - Duration::days(40)))
            .await
            .unwrap();
        insert_memory(&pool, &NewMemory::new("newer").created_at(now - Duration::days(1)))
            .await
            .unwrap();
        insert_memory(&pool, &NewMemory::new("newest").created_at(now))
            .await
            .unwrap();

        let recent = list_recent_memories(&pool, 10, Some(now - Duration::days(7)))
            .await
            .unwrap();
        let texts: Vec<&str> = recent.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["newest", "newer"]);

        let all = list_recent_memories(&pool, 10, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_keyword_candidates_prefilter() {
        let pool = setup_test_db().await;
        insert_memory(&pool, &NewMemory::new("Debugging at night")).await.unwrap();
        insert_memory(&pool, &NewMemory::new("Morning run")).await.unwrap();

        let hits = list_keyword_candidates(&pool, &["debugging".to_string()], None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Debugging at night");
    }

    #[tokio::test]
    async fn test_flagged_and_count() {
        let pool = setup_test_db().await;
        insert_memory(&pool, &NewMemory::new("plain")).await.unwrap();
        insert_memory(&pool, &NewMemory::new("noteworthy").flagged(true))
            .await
            .unwrap();

        let flagged = list_flagged_memories(&pool, 10).await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].flagged);
        assert_eq!(count_memories(&pool).await.unwrap(), 2);
    }
}
