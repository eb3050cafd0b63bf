//! Weekly digests: counts, mood trend, top tags and flagged highlights for
//! one Monday-to-Sunday week, cached one row per week.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use keepsake_models::{Highlight, MemoryRecord, WeeklySummary};
use tracing::info;

use super::context::preview;
use super::record_store::RecordStore;
use crate::db;
use crate::{Error, Result};

const MAX_TOP_TAGS: usize = 5;
const MAX_HIGHLIGHTS: usize = 5;
const HIGHLIGHT_CHARS: usize = 200;

#[derive(Clone)]
pub struct Summarizer {
    store: RecordStore,
}

impl Summarizer {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Compute the summary for the week containing `date` and cache it,
    /// replacing any earlier summary of the same week.
    pub async fn generate_weekly_summary(&self, date: NaiveDate) -> Result<WeeklySummary> {
        let (week_start, week_end) = week_bounds(date)?;

        // The stored end is a whole second; include the rest of it.
        let query_end = week_end + Duration::microseconds(999_999);
        let records = self.store.between(&week_start, &query_end).await?;

        let summary = summarize_week(week_start, week_end, &records);
        db::upsert_weekly_summary(self.store.pool(), &summary).await?;

        info!(
            week_start = %week_start.format("%Y-%m-%d"),
            entries = summary.entry_count,
            flagged = summary.flagged_count,
            "Weekly summary generated"
        );
        Ok(summary)
    }

    /// Cached summary for the week containing `date`, if one was generated.
    pub async fn cached_summary(&self, date: NaiveDate) -> Result<Option<WeeklySummary>> {
        let (week_start, _) = week_bounds(date)?;
        db::get_weekly_summary(self.store.pool(), &week_start).await
    }

    /// Cached summaries for the current week and the `weeks_back - 1`
    /// before it, newest first. A span past chrono's range returns every
    /// cached week.
    pub async fn summary_history(&self, weeks_back: u32) -> Result<Vec<WeeklySummary>> {
        if weeks_back == 0 {
            return Ok(Vec::new());
        }
        let today = keepsake_models::now().date_naive();
        let (this_week, _) = week_bounds(today)?;
        let since = Duration::try_weeks(i64::from(weeks_back) - 1)
            .and_then(|span| this_week.checked_sub_signed(span));
        db::list_weekly_summaries(self.store.pool(), since).await
    }
}

/// Monday 00:00:00 and Sunday 23:59:59 (UTC) of the week holding `date`.
pub fn week_bounds(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let out_of_range = || Error::Validation(format!("No whole week around {}", date));

    let monday = date
        .checked_sub_signed(Duration::days(i64::from(
            date.weekday().num_days_from_monday(),
        )))
        .ok_or_else(out_of_range)?;
    let midnight = monday
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Internal(format!("No midnight on {}", monday)))?;

    let start = Utc.from_utc_datetime(&midnight);
    let end = start
        .checked_add_signed(Duration::days(7) - Duration::seconds(1))
        .ok_or_else(out_of_range)?;
    Ok((start, end))
}

/// Aggregate one week of records, given oldest first.
pub fn summarize_week(
    week_start: DateTime<Utc>,
    week_end: DateTime<Utc>,
    records: &[MemoryRecord],
) -> WeeklySummary {
    let mut emotion_counts: BTreeMap<String, i64> = BTreeMap::new();
    let mut tag_counts: HashMap<&str, i64> = HashMap::new();

    for record in records {
        if let Some(emotion) = &record.emotion {
            *emotion_counts.entry(emotion.clone()).or_default() += 1;
        }
        for tag in &record.tags {
            *tag_counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    let mut top_tags: Vec<(String, i64)> = tag_counts
        .into_iter()
        .map(|(tag, n)| (tag.to_string(), n))
        .collect();
    top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_tags.truncate(MAX_TOP_TAGS);

    let average_intensity = if records.is_empty() {
        None
    } else {
        let total: f64 = records.iter().map(|r| f64::from(r.intensity)).sum();
        Some(total / records.len() as f64)
    };

    let flagged: Vec<&MemoryRecord> = records.iter().filter(|r| r.flagged).collect();
    let highlights = flagged
        .iter()
        .take(MAX_HIGHLIGHTS)
        .map(|r| Highlight {
            memory_id: r.id,
            text: preview(&r.text, HIGHLIGHT_CHARS),
            emotion: r.emotion.clone(),
            created_at: r.created_at,
        })
        .collect();

    WeeklySummary {
        week_start,
        week_end,
        entry_count: records.len() as i64,
        flagged_count: flagged.len() as i64,
        average_intensity,
        emotion_counts,
        top_tags,
        highlights,
        generated_at: keepsake_models::now(),
    }
}
