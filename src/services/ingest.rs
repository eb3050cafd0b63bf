//! Ingestion: record store first, embedding index second.
//!
//! A record that reached the store counts as ingested even if indexing
//! fails; `sync_missing` repairs the gap later.

use keepsake_models::{sources, MemoryId, MemoryRecord, NewMemory, Transcript};
use tracing::{debug, info, warn};

use super::index::EmbeddingIndex;
use super::record_store::RecordStore;
use crate::Result;

#[derive(Clone)]
pub struct IngestService {
    store: RecordStore,
    index: EmbeddingIndex,
}

impl IngestService {
    pub fn new(store: RecordStore, index: EmbeddingIndex) -> Self {
        Self { store, index }
    }

    /// Store a memory, then index it best-effort.
    pub async fn ingest(&self, input: &NewMemory) -> Result<MemoryId> {
        let record = self.store.append_record(input).await?;
        self.index_record(&record).await;
        Ok(record.id)
    }

    /// Store transcribed speech with source "voice" and a voice log row.
    pub async fn ingest_transcript(
        &self,
        transcript: &Transcript,
        tags: Vec<String>,
        emotion: Option<String>,
        intensity: Option<u8>,
        flagged: bool,
    ) -> Result<MemoryId> {
        let mut input = NewMemory::new(transcript.text.clone())
            .with_source(sources::VOICE)
            .with_tags(tags)
            .flagged(flagged);
        input.emotion = emotion;
        input.intensity = intensity;

        let (record, log) = self.store.append_transcript(&input, transcript).await?;
        debug!(
            memory_id = record.id,
            voice_log = log.id,
            language = %transcript.language,
            "Transcript stored"
        );

        self.index_record(&record).await;
        Ok(record.id)
    }

    /// Index recent records that have no vectors yet. Returns how many were
    /// indexed.
    pub async fn sync_missing(&self, days_back: i64) -> Result<usize> {
        if !self.index.available() {
            debug!("Index unavailable, nothing to sync");
            return Ok(0);
        }

        let pending = self.store.unindexed_since(days_back).await?;
        let mut synced = 0;
        for record in &pending {
            if self.index_record(record).await {
                synced += 1;
            }
        }

        info!(pending = pending.len(), synced, days_back, "Vector sync finished");
        Ok(synced)
    }

    /// Upsert one record into the index, logging instead of failing.
    pub async fn index_record(&self, record: &MemoryRecord) -> bool {
        match self
            .index
            .upsert(&record.text, &record.embedding_metadata())
            .await
        {
            Ok(indexed) => indexed,
            Err(e) => {
                warn!(memory_id = record.id, error = %e, "Indexing failed, record kept");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;

    async fn setup(ready: bool) -> (IngestService, RecordStore) {
        let pool = db::init_pool(":memory:").await.unwrap();
        db::initialize_schema(&pool).await.unwrap();
        let store = RecordStore::new(pool.clone(), None);
        let index = if ready {
            EmbeddingIndex::from_config(&Config::in_memory(), pool).await
        } else {
            EmbeddingIndex::degraded("test")
        };
        (IngestService::new(store.clone(), index), store)
    }

    #[tokio::test]
    async fn test_ingest_without_index_still_stores() {
        let (ingest, store) = setup(false).await;
        let id = ingest
            .ingest(&NewMemory::new("kept anyway").with_emotion("calm"))
            .await
            .unwrap();
        assert_eq!(store.get(id).await.unwrap().text, "kept anyway");
    }

    #[tokio::test]
    async fn test_transcript_gets_voice_source_and_log() {
        let (ingest, store) = setup(true).await;
        let transcript = Transcript {
            text: "walked by the river".to_string(),
            language: "en".to_string(),
            audio_path: Some("/tmp/river.wav".to_string()),
            duration_seconds: Some(12.5),
        };

        let id = ingest
            .ingest_transcript(&transcript, vec!["walk".into()], Some("calm".into()), None, false)
            .await
            .unwrap();

        let record = store.get(id).await.unwrap();
        assert_eq!(record.source, sources::VOICE);
        assert_eq!(record.tags, vec!["walk".to_string()]);

        let logs = store.voice_logs(id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].language, "en");
    }

    #[tokio::test]
    async fn test_transcript_failure_leaves_nothing_behind() {
        let (ingest, store) = setup(true).await;
        let transcript = Transcript {
            text: "clipped recording".to_string(),
            language: "en".to_string(),
            audio_path: None,
            duration_seconds: Some(-2.0),
        };

        assert!(ingest
            .ingest_transcript(&transcript, Vec::new(), None, None, false)
            .await
            .is_err());
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(ingest.sync_missing(7).await.unwrap(), 0);

        // A retry with good metadata stores exactly one memory.
        let fixed = Transcript {
            duration_seconds: Some(2.0),
            ..transcript
        };
        let id = ingest
            .ingest_transcript(&fixed, Vec::new(), None, None, false)
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.voice_logs(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_missing_indexes_gaps() {
        let (ingest, store) = setup(true).await;

        // Written straight to the store, so never indexed.
        store.append(&NewMemory::new("missed one")).await.unwrap();
        store.append(&NewMemory::new("missed two")).await.unwrap();
        ingest.ingest(&NewMemory::new("indexed")).await.unwrap();

        assert_eq!(ingest.sync_missing(7).await.unwrap(), 2);
        assert_eq!(ingest.sync_missing(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_missing_when_degraded() {
        let (ingest, store) = setup(false).await;
        store.append(&NewMemory::new("pending")).await.unwrap();
        assert_eq!(ingest.sync_missing(7).await.unwrap(), 0);
    }
}
