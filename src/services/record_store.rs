//! Record store: the durable source of truth for memories.
//!
//! Wraps the query modules with validation, keyword scoring and the
//! audited soft-delete / restore lifecycle.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use keepsake_models::timestamp::days_before_now;
use keepsake_models::{
    AuditEntry, EmotionSample, MemoryId, MemoryRecord, NewMemory, PatternRecord, Tombstone,
    Transcript, VoiceLog, MAX_INTENSITY, MIN_INTENSITY,
};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::db::{self, DbPool, RestoreOutcome};
use crate::{Error, Result};

/// Async handle over the relational store. Cheap to clone.
#[derive(Clone)]
pub struct RecordStore {
    pool: DbPool,
    backup_dir: Option<PathBuf>,
}

impl RecordStore {
    /// Open the database and apply the schema.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let pool = db::init_pool(&config.path).await?;
        db::initialize_schema(&pool).await?;
        Ok(Self::new(pool, config.backup_dir.clone()))
    }

    /// Wrap a pool whose schema is already applied.
    pub fn new(pool: DbPool, backup_dir: Option<PathBuf>) -> Self {
        Self { pool, backup_dir }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Close every connection. Later calls fail with `StorageUnavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a memory and return its id.
    pub async fn append(&self, input: &NewMemory) -> Result<MemoryId> {
        Ok(self.append_record(input).await?.id)
    }

    /// Append a memory and return the stored record.
    pub async fn append_record(&self, input: &NewMemory) -> Result<MemoryRecord> {
        validate(input)?;
        let record = db::insert_memory(&self.pool, input).await?;
        debug!(id = record.id, source = %record.source, "Memory appended");
        Ok(record)
    }

    /// Soft-delete a memory.
    ///
    /// Returns `false` when the memory is already tombstoned and
    /// `NotFound` when the id was never seen.
    pub async fn soft_delete(&self, id: MemoryId, reason: &str) -> Result<bool> {
        if db::get_memory_optional(&self.pool, id).await?.is_none() {
            return self.already_deleted(id).await;
        }

        let backup_ref = self.backup_before_delete(id).await?;

        if !db::tombstone_memory(&self.pool, id, reason, &backup_ref).await? {
            // Deleted by someone else in between.
            return self.already_deleted(id).await;
        }

        info!(id, reason, backup_ref = %backup_ref, "Memory soft-deleted");
        Ok(true)
    }

    /// Restore a tombstoned memory under its original id.
    ///
    /// Returns `false` if a live row with that id already exists and
    /// `NotFound` if there is no tombstone.
    pub async fn restore(&self, id: MemoryId) -> Result<bool> {
        Ok(self.restore_record(id).await?.is_some())
    }

    /// Like [`restore`](Self::restore), but hands back the restored record
    /// as committed.
    pub async fn restore_record(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        match db::restore_tombstone(&self.pool, id).await? {
            RestoreOutcome::Restored(record) => {
                info!(id, "Memory restored");
                Ok(Some(record))
            }
            RestoreOutcome::AlreadyLive => {
                warn!(id, "Restore skipped, memory is live");
                Ok(None)
            }
            RestoreOutcome::NoTombstone => {
                Err(Error::NotFound(format!("No tombstone for memory {}", id)))
            }
        }
    }

    async fn already_deleted(&self, id: MemoryId) -> Result<bool> {
        match db::get_tombstone(&self.pool, id).await? {
            Some(_) => Ok(false),
            None => Err(Error::NotFound(format!("Memory not found: {}", id))),
        }
    }

    async fn backup_before_delete(&self, id: MemoryId) -> Result<String> {
        let Some(dir) = &self.backup_dir else {
            return Ok(format!("tombstone:{}", id));
        };

        let stamp = keepsake_models::now().format("%Y%m%dT%H%M%S%6fZ");
        let path = dir.join(format!("keepsake-{}-before-delete-{}.db", stamp, id));
        db::snapshot_into(&self.pool, &path).await?;

        debug!(id, path = %path.display(), "Pre-delete snapshot written");
        Ok(path.to_string_lossy().into_owned())
    }

    /// Count one observation of a recurring theme.
    pub async fn record_pattern(
        &self,
        pattern_type: &str,
        pattern_text: &str,
    ) -> Result<PatternRecord> {
        let pattern_text = pattern_text.trim();
        if pattern_type.trim().is_empty() || pattern_text.is_empty() {
            return Err(Error::Validation(
                "pattern type and text must not be empty".to_string(),
            ));
        }
        db::upsert_pattern(
            &self.pool,
            pattern_type.trim(),
            pattern_text,
            &keepsake_models::now(),
        )
        .await
    }

    /// Append a transcribed memory together with its voice log. Both rows
    /// are written or neither is.
    pub async fn append_transcript(
        &self,
        input: &NewMemory,
        transcript: &Transcript,
    ) -> Result<(MemoryRecord, VoiceLog)> {
        validate(input)?;
        let (record, log) = db::insert_voice_memory(&self.pool, input, transcript).await?;
        debug!(id = record.id, voice_log = log.id, "Transcript appended");
        Ok((record, log))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, id: MemoryId) -> Result<MemoryRecord> {
        db::get_memory(&self.pool, id).await
    }

    /// Live records among `ids`, in the order given.
    pub async fn get_many(&self, ids: &[MemoryId]) -> Result<Vec<MemoryRecord>> {
        db::get_memories(&self.pool, ids).await
    }

    /// Every live id, ascending.
    pub async fn live_ids(&self) -> Result<Vec<MemoryId>> {
        db::list_live_ids(&self.pool).await
    }

    /// Newest first, created within the last `within_days`.
    pub async fn recent(&self, limit: usize, within_days: i64) -> Result<Vec<MemoryRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        db::list_recent_memories(&self.pool, limit as i64, days_before_now(within_days)).await
    }

    /// Exact emotion match, newest first.
    pub async fn by_emotion(
        &self,
        label: &str,
        limit: usize,
        within_days: Option<i64>,
    ) -> Result<Vec<MemoryRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        db::list_memories_by_emotion(&self.pool, label, limit as i64, within_days.and_then(days_before_now))
            .await
    }

    /// Token-overlap search.
    ///
    /// Relevance is the fraction of lower-cased, whitespace-split query tokens
    /// found as substrings of the lower-cased text. Zero-relevance records are
    /// dropped; ties go to the newer record.
    pub async fn keyword_search(
        &self,
        query_text: &str,
        limit: usize,
        within_days: Option<i64>,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        let tokens = tokenize(query_text);
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let candidates =
            db::list_keyword_candidates(&self.pool, &tokens, within_days.and_then(days_before_now)).await?;

        let mut scored: Vec<(MemoryRecord, f32)> = candidates
            .into_iter()
            .filter_map(|record| {
                let relevance = keyword_relevance(&tokens, &record.text);
                (relevance > 0.0).then_some((record, relevance))
            })
            .collect();

        // Candidates arrive newest first; a stable sort keeps that for ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);

        Ok(scored)
    }

    /// Flagged memories, newest first.
    pub async fn flagged(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        db::list_flagged_memories(&self.pool, limit as i64).await
    }

    pub async fn count(&self) -> Result<i64> {
        db::count_memories(&self.pool).await
    }

    pub async fn tombstones(&self) -> Result<Vec<Tombstone>> {
        db::list_tombstones(&self.pool).await
    }

    pub async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        db::list_audit_entries(&self.pool, limit as i64).await
    }

    /// Most frequent patterns, optionally of one type.
    pub async fn top_patterns(
        &self,
        pattern_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PatternRecord>> {
        db::list_top_patterns(&self.pool, pattern_type, limit as i64).await
    }

    /// Emotion labels seen in the last `within_days`, newest first.
    pub async fn recent_emotions(
        &self,
        within_days: i64,
        limit: usize,
    ) -> Result<Vec<EmotionSample>> {
        let since = days_before_now(within_days);
        let records = db::list_recent_emotions(&self.pool, since, limit as i64).await?;

        Ok(records
            .into_iter()
            .filter_map(|r| {
                r.emotion.map(|emotion| EmotionSample {
                    emotion,
                    intensity: r.intensity,
                    at: r.created_at,
                })
            })
            .collect())
    }

    /// Memories created within `[start, end]`, oldest first.
    pub async fn between(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> Result<Vec<MemoryRecord>> {
        db::list_memories_between(&self.pool, start, end).await
    }

    /// Live memories from the last `within_days` with no indexed vectors,
    /// oldest first.
    pub async fn unindexed_since(&self, within_days: i64) -> Result<Vec<MemoryRecord>> {
        db::list_unindexed_memories(&self.pool, days_before_now(within_days)).await
    }

    pub async fn voice_logs(&self, memory_id: MemoryId) -> Result<Vec<VoiceLog>> {
        db::list_voice_logs(&self.pool, memory_id).await
    }
}

fn validate(input: &NewMemory) -> Result<()> {
    if input.text.trim().is_empty() {
        return Err(Error::Validation("memory text must not be empty".to_string()));
    }

    let intensity = input.intensity_or_default();
    if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&intensity) {
        return Err(Error::Validation(format!(
            "intensity must be between {} and {}, got {}",
            MIN_INTENSITY, MAX_INTENSITY, intensity
        )));
    }

    Ok(())
}

/// Lower-cased whitespace tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Fraction of `tokens` that occur in `text`, ignoring case.
pub fn keyword_relevance(tokens: &[String], text: &str) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let found = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    found as f32 / tokens.len() as f32
}
