//! The journal: one explicit handle over every Keepsake service.
//!
//! Build it once with [`Journal::open`] and pass it by reference.

use chrono::NaiveDate;
use keepsake_models::{
    AuditEntry, ContextBlock, MemoryId, MemoryRecord, NewMemory, PatternRecord, RankedHit,
    Tombstone, Transcript, WeeklySummary,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::services::{
    ContextAssembler, EmbeddingIndex, IndexStats, IndexStatus, IngestService, RecordStore,
    RetrievalEngine, Summarizer,
};
use crate::Result;

#[derive(Clone)]
pub struct Journal {
    store: RecordStore,
    index: EmbeddingIndex,
    ingest: IngestService,
    retrieval: RetrievalEngine,
    context: ContextAssembler,
    summarizer: Summarizer,
}

impl Journal {
    /// Open the record store and bring up the embedding index. The index
    /// may come up degraded; the record store may not.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = RecordStore::open(&config.database).await?;
        let index = EmbeddingIndex::from_config(config, store.pool().clone()).await;

        info!(
            database = %config.database.path,
            semantic = index.available(),
            "Journal opened"
        );
        Ok(Self::from_parts(config, store, index))
    }

    /// Assemble a journal from already-built parts.
    pub fn from_parts(config: &Config, store: RecordStore, index: EmbeddingIndex) -> Self {
        let retrieval =
            RetrievalEngine::new(store.clone(), index.clone(), config.retrieval.clone());
        Self {
            ingest: IngestService::new(store.clone(), index.clone()),
            context: ContextAssembler::new(
                retrieval.clone(),
                store.clone(),
                config.context.clone(),
            ),
            summarizer: Summarizer::new(store.clone()),
            retrieval,
            store,
            index,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------

    pub async fn ingest(&self, input: &NewMemory) -> Result<MemoryId> {
        self.ingest.ingest(input).await
    }

    pub async fn ingest_transcript(
        &self,
        transcript: &Transcript,
        tags: Vec<String>,
        emotion: Option<String>,
        intensity: Option<u8>,
        flagged: bool,
    ) -> Result<MemoryId> {
        self.ingest
            .ingest_transcript(transcript, tags, emotion, intensity, flagged)
            .await
    }

    /// Index records from the last `days_back` days that were never indexed.
    pub async fn sync_missing(&self, days_back: i64) -> Result<usize> {
        self.ingest.sync_missing(days_back).await
    }

    // -------------------------------------------------------------------------
    // Retrieval and context
    // -------------------------------------------------------------------------

    pub async fn retrieve(
        &self,
        query_text: &str,
        current_emotion: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RankedHit>> {
        self.retrieval
            .retrieve(query_text, current_emotion, max_results)
            .await
    }

    pub async fn retrieve_within(
        &self,
        query_text: &str,
        current_emotion: Option<&str>,
        max_results: usize,
        lookback_days: i64,
    ) -> Result<Vec<RankedHit>> {
        self.retrieval
            .retrieve_within(query_text, current_emotion, max_results, lookback_days)
            .await
    }

    /// Context block with the configured limits.
    pub async fn assemble_context(
        &self,
        current_text: &str,
        current_emotion: Option<&str>,
    ) -> Result<ContextBlock> {
        self.context
            .assemble_default(current_text, current_emotion)
            .await
    }

    pub async fn assemble_context_with(
        &self,
        current_text: &str,
        current_emotion: Option<&str>,
        max_memories: usize,
        max_chars: usize,
    ) -> Result<ContextBlock> {
        self.context
            .assemble(current_text, current_emotion, max_memories, max_chars)
            .await
    }

    // -------------------------------------------------------------------------
    // Forget and restore
    // -------------------------------------------------------------------------

    /// Soft-delete a memory and drop its vectors.
    pub async fn forget(&self, id: MemoryId, reason: &str) -> Result<bool> {
        if !self.store.soft_delete(id, reason).await? {
            return Ok(false);
        }

        if let Err(e) = self.index.remove_memory(id).await {
            warn!(id, error = %e, "Vectors not removed, prune_orphans will catch them");
        }
        Ok(true)
    }

    /// Restore a forgotten memory and index it again. Once the restore is
    /// committed this returns `true`; a failed re-index is left to
    /// `sync_missing`.
    pub async fn restore(&self, id: MemoryId) -> Result<bool> {
        let Some(record) = self.store.restore_record(id).await? else {
            return Ok(false);
        };

        self.ingest.index_record(&record).await;
        Ok(true)
    }

    pub async fn tombstones(&self) -> Result<Vec<Tombstone>> {
        self.store.tombstones().await
    }

    pub async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.store.audit_log(limit).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get(&self, id: MemoryId) -> Result<MemoryRecord> {
        self.store.get(id).await
    }

    pub async fn recent(&self, limit: usize, within_days: i64) -> Result<Vec<MemoryRecord>> {
        self.store.recent(limit, within_days).await
    }

    pub async fn flagged(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        self.store.flagged(limit).await
    }

    pub async fn count(&self) -> Result<i64> {
        self.store.count().await
    }

    // -------------------------------------------------------------------------
    // Patterns and summaries
    // -------------------------------------------------------------------------

    pub async fn record_pattern(
        &self,
        pattern_type: &str,
        pattern_text: &str,
    ) -> Result<PatternRecord> {
        self.store.record_pattern(pattern_type, pattern_text).await
    }

    pub async fn top_patterns(
        &self,
        pattern_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PatternRecord>> {
        self.store.top_patterns(pattern_type, limit).await
    }

    pub async fn generate_weekly_summary(&self, date: NaiveDate) -> Result<WeeklySummary> {
        self.summarizer.generate_weekly_summary(date).await
    }

    pub async fn summary_history(&self, weeks_back: u32) -> Result<Vec<WeeklySummary>> {
        self.summarizer.summary_history(weeks_back).await
    }

    // -------------------------------------------------------------------------
    // Index maintenance
    // -------------------------------------------------------------------------

    pub fn index_status(&self) -> IndexStatus {
        self.index.status()
    }

    pub async fn index_stats(&self) -> Result<IndexStats> {
        self.index.stats().await
    }

    /// Drop vectors whose memory is no longer live.
    pub async fn prune_orphans(&self) -> Result<usize> {
        let live = self.store.live_ids().await?;
        self.index.prune_orphans(&live).await
    }
}
