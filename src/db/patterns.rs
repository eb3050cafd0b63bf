//! Recurring pattern queries.

use chrono::{DateTime, Utc};
use keepsake_models::{timestamp, PatternRecord};
use sqlx::FromRow;

use super::DbPool;
use crate::{Error, Result};

#[derive(Debug, Clone, FromRow)]
struct PatternRow {
    id: i64,
    pattern_type: String,
    pattern_text: String,
    frequency: i64,
    first_seen: String,
    last_seen: String,
}

impl TryFrom<PatternRow> for PatternRecord {
    type Error = Error;

    fn try_from(row: PatternRow) -> Result<Self> {
        Ok(PatternRecord {
            id: row.id,
            pattern_type: row.pattern_type,
            pattern_text: row.pattern_text,
            frequency: row.frequency,
            first_seen: timestamp::decode(&row.first_seen)?,
            last_seen: timestamp::decode(&row.last_seen)?,
        })
    }
}

/// Record one observation: insert with frequency 1, or bump the existing
/// row's frequency and `last_seen`.
pub async fn upsert_pattern(
    pool: &DbPool,
    pattern_type: &str,
    pattern_text: &str,
    seen_at: &DateTime<Utc>,
) -> Result<PatternRecord> {
    let seen = timestamp::encode(seen_at);

    let row = sqlx::query_as::<_, PatternRow>(
        r#"
        INSERT INTO memory_patterns (pattern_type, pattern_text, frequency, first_seen, last_seen)
        VALUES (?1, ?2, 1, ?3, ?3)
        ON CONFLICT(pattern_type, pattern_text) DO UPDATE SET
            frequency = frequency + 1,
            last_seen = MAX(last_seen, excluded.last_seen)
        RETURNING *
        "#,
    )
    .bind(pattern_type)
    .bind(pattern_text)
    .bind(&seen)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Most frequent patterns first, optionally of one type.
pub async fn list_top_patterns(
    pool: &DbPool,
    pattern_type: Option<&str>,
    limit: i64,
) -> Result<Vec<PatternRecord>> {
    sqlx::query_as::<_, PatternRow>(
        r#"
        SELECT * FROM memory_patterns
        WHERE (?1 IS NULL OR pattern_type = ?1)
        ORDER BY frequency DESC, last_seen DESC
        LIMIT ?2
        "#,
    )
    .bind(pattern_type)
    .bind(limit)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(PatternRecord::try_from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};
    use chrono::Duration;

    #[tokio::test]
    async fn test_upsert_increments_frequency() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        let t0 = Utc::now();

        let first = upsert_pattern(&pool, "humor", "sleep tight pun", &t0).await.unwrap();
        assert_eq!(first.frequency, 1);

        let later = t0 + Duration::hours(3);
        let second = upsert_pattern(&pool, "humor", "sleep tight pun", &later)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.frequency, 2);
        assert_eq!(timestamp::encode(&second.first_seen), timestamp::encode(&t0));
        assert_eq!(timestamp::encode(&second.last_seen), timestamp::encode(&later));

        upsert_pattern(&pool, "mood", "sunday blues", &t0).await.unwrap();

        let top = list_top_patterns(&pool, None, 5).await.unwrap();
        assert_eq!(top[0].pattern_text, "sleep tight pun");
        assert_eq!(top.len(), 2);

        let moods = list_top_patterns(&pool, Some("mood"), 5).await.unwrap();
        assert_eq!(moods.len(), 1);
    }
}
