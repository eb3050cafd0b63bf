//! Weekly summary cache queries.

use chrono::{DateTime, Utc};
use keepsake_models::{timestamp, WeeklySummary};
use sqlx::FromRow;

use super::DbPool;
use crate::{Error, Result};

#[derive(Debug, Clone, FromRow)]
struct SummaryRow {
    week_start: String,
    week_end: String,
    entry_count: i64,
    flagged_count: i64,
    average_intensity: Option<f64>,
    emotion_counts: String,
    top_tags: String,
    highlights: String,
    generated_at: String,
}

impl TryFrom<SummaryRow> for WeeklySummary {
    type Error = Error;

    fn try_from(row: SummaryRow) -> Result<Self> {
        Ok(WeeklySummary {
            week_start: timestamp::decode(&row.week_start)?,
            week_end: timestamp::decode(&row.week_end)?,
            entry_count: row.entry_count,
            flagged_count: row.flagged_count,
            average_intensity: row.average_intensity,
            emotion_counts: serde_json::from_str(&row.emotion_counts)?,
            top_tags: serde_json::from_str(&row.top_tags)?,
            highlights: serde_json::from_str(&row.highlights)?,
            generated_at: timestamp::decode(&row.generated_at)?,
        })
    }
}

/// Insert or overwrite the cached summary for its week.
pub async fn upsert_weekly_summary(pool: &DbPool, summary: &WeeklySummary) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO weekly_summaries (
            week_start, week_end, entry_count, flagged_count, average_intensity,
            emotion_counts, top_tags, highlights, generated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(week_start) DO UPDATE SET
            week_end = excluded.week_end,
            entry_count = excluded.entry_count,
            flagged_count = excluded.flagged_count,
            average_intensity = excluded.average_intensity,
            emotion_counts = excluded.emotion_counts,
            top_tags = excluded.top_tags,
            highlights = excluded.highlights,
            generated_at = excluded.generated_at
        "#,
    )
    .bind(timestamp::encode(&summary.week_start))
    .bind(timestamp::encode(&summary.week_end))
    .bind(summary.entry_count)
    .bind(summary.flagged_count)
    .bind(summary.average_intensity)
    .bind(serde_json::to_string(&summary.emotion_counts)?)
    .bind(serde_json::to_string(&summary.top_tags)?)
    .bind(serde_json::to_string(&summary.highlights)?)
    .bind(timestamp::encode(&summary.generated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Cached summary for the week starting at `week_start` (optional).
pub async fn get_weekly_summary(
    pool: &DbPool,
    week_start: &DateTime<Utc>,
) -> Result<Option<WeeklySummary>> {
    sqlx::query_as::<_, SummaryRow>("SELECT * FROM weekly_summaries WHERE week_start = ?")
        .bind(timestamp::encode(week_start))
        .fetch_optional(pool)
        .await?
        .map(WeeklySummary::try_from)
        .transpose()
}

/// Cached summaries with `week_start >= since` (every one when `None`),
/// newest week first.
pub async fn list_weekly_summaries(
    pool: &DbPool,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<WeeklySummary>> {
    sqlx::query_as::<_, SummaryRow>(
        "SELECT * FROM weekly_summaries WHERE (?1 IS NULL OR week_start >= ?1) ORDER BY week_start DESC",
    )
    .bind(since.as_ref().map(timestamp::encode))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(WeeklySummary::try_from)
    .collect()
}

/// Number of cached summaries.
pub async fn count_weekly_summaries(pool: &DbPool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM weekly_summaries")
        .fetch_one(pool)
        .await?)
}
