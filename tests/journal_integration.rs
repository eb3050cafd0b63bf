//! Integration tests for the Keepsake journal.
//!
//! Exercises ingestion, both retrieval paths, context assembly and the
//! forget/restore lifecycle against in-memory and on-disk SQLite.

use std::sync::Arc;

use async_trait::async_trait;
use keepsake::config::VectorBackend;
use keepsake::models::{NewMemory, Provenance};
use keepsake::services::{EmbeddingIndex, IndexStatus, RecordStore};
use keepsake::{db, Config, Error, Journal, Result};
use keepsake_embeddings::Embedder;
use keepsake_vectors::SqliteVectorStore;

// ============================================================================
// Helpers
// ============================================================================

fn keyword_only_config() -> Config {
    let mut config = Config::in_memory();
    config.vectors.backend = VectorBackend::None;
    config
}

/// The three entries used by the ranking scenarios. Returns their ids.
async fn seed_scenario(journal: &Journal) -> Result<(i64, i64, i64)> {
    let first = journal
        .ingest(&NewMemory::new("I love debugging at night").with_emotion("calm"))
        .await?;
    let second = journal
        .ingest(&NewMemory::new("Stressful deadline today").with_emotion("anxious"))
        .await?;
    let third = journal
        .ingest(&NewMemory::new("Debugging marathon, so tired").with_emotion("tired"))
        .await?;
    Ok((first, second, third))
}

/// Embedder that is always down.
struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed(&self, _texts: &[String]) -> keepsake_embeddings::Result<Vec<Vec<f32>>> {
        Err(keepsake_embeddings::Error::AllProvidersFailed)
    }

    fn dimension(&self) -> usize {
        8
    }

    fn model_name(&self) -> String {
        "down".to_string()
    }
}

// ============================================================================
// Retrieval
// ============================================================================

/// With no index the keyword path ranks the calm entry first and the
/// penalised tired entry second.
#[tokio::test]
async fn test_keyword_fallback_scenario() -> Result<()> {
    let journal = Journal::open(&keyword_only_config()).await?;
    assert!(matches!(journal.index_status(), IndexStatus::Degraded { .. }));

    let (first, _, third) = seed_scenario(&journal).await?;

    let hits = journal.retrieve("debugging", Some("calm"), 2).await?;
    let ids: Vec<i64> = hits.iter().map(|h| h.memory_id).collect();
    assert_eq!(ids, vec![first, third]);
    assert!(hits.iter().all(|h| h.provenance == Provenance::Keyword));

    Ok(())
}

/// Same scenario through the embedding index. The hashed embedder gives
/// cosine 0.447 and 0.5 for the two debugging entries, so the threshold is
/// lowered to let both through.
#[tokio::test]
async fn test_semantic_scenario() -> Result<()> {
    let mut config = Config::in_memory();
    config.retrieval.similarity_threshold = 0.3;
    let journal = Journal::open(&config).await?;
    assert!(journal.index().available());

    let (first, second, third) = seed_scenario(&journal).await?;

    let hits = journal.retrieve("debugging", Some("calm"), 2).await?;
    let ids: Vec<i64> = hits.iter().map(|h| h.memory_id).collect();
    assert_eq!(ids, vec![first, third]);
    assert!(hits.iter().all(|h| h.provenance == Provenance::Semantic));
    assert!(hits.iter().all(|h| h.memory_id != second));
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));

    Ok(())
}

/// At the default threshold the weak semantic matches are dropped and only
/// the emotional path contributes.
#[tokio::test]
async fn test_threshold_applies_to_semantic_hits() -> Result<()> {
    let journal = Journal::open(&Config::in_memory()).await?;
    let (first, _, _) = seed_scenario(&journal).await?;

    let hits = journal.retrieve("debugging", Some("calm"), 2).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory_id, first);
    assert_eq!(hits[0].provenance, Provenance::Emotional);

    Ok(())
}

/// An index whose embedder fails at query time falls back to keywords, and
/// ingestion still stores the record.
#[tokio::test]
async fn test_failing_embedder_falls_back() -> Result<()> {
    let config = Config::in_memory();
    let store = RecordStore::open(&config.database).await?;
    let vectors = SqliteVectorStore::open(":memory:").await?;
    let index = EmbeddingIndex::new(
        Arc::new(DownEmbedder),
        Arc::new(vectors),
        store.pool().clone(),
        config.chunking.clone(),
    )
    .await;
    assert!(index.available());

    let journal = Journal::from_parts(&config, store, index);
    let (first, _, third) = seed_scenario(&journal).await?;
    assert_eq!(journal.count().await?, 3);

    let hits = journal.retrieve("debugging", Some("calm"), 2).await?;
    let ids: Vec<i64> = hits.iter().map(|h| h.memory_id).collect();
    assert_eq!(ids, vec![first, third]);

    Ok(())
}

#[tokio::test]
async fn test_identical_text_deduplicated() -> Result<()> {
    let journal = Journal::open(&keyword_only_config()).await?;
    for _ in 0..2 {
        journal
            .ingest(&NewMemory::new("same old story").with_emotion("calm"))
            .await?;
    }

    let hits = journal.retrieve("story", Some("calm"), 4).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "same old story");

    Ok(())
}

#[tokio::test]
async fn test_no_matches_is_empty_not_error() -> Result<()> {
    let journal = Journal::open(&keyword_only_config()).await?;
    journal.ingest(&NewMemory::new("gardening notes")).await?;

    assert!(journal.retrieve("astronomy", None, 5).await?.is_empty());
    Ok(())
}

// ============================================================================
// Context
// ============================================================================

#[tokio::test]
async fn test_context_respects_char_budget() -> Result<()> {
    let journal = Journal::open(&keyword_only_config()).await?;
    for i in 0..6 {
        let text = format!("coffee diary {} {}", i, "long rambling words ".repeat(20));
        journal
            .ingest(&NewMemory::new(text).with_emotion("calm").flagged(i == 0))
            .await?;
    }
    journal.record_pattern("humor", "coffee puns").await?;

    let block = journal
        .assemble_context_with("coffee", Some("calm"), 5, 450)
        .await?;

    assert!(block.entry_chars() <= 450);
    assert_eq!(block.entries.len(), 2);
    assert!(block.entries.iter().all(|e| e.preview.chars().count() <= 200));
    assert!(block.summary.starts_with("2 topically related"));
    assert_eq!(block.recent_emotions.len(), 5);
    assert_eq!(block.patterns[0].pattern_text, "coffee puns");

    let empty = journal.assemble_context("nothing matches", None).await?;
    assert_eq!(empty.summary, "No relevant memories found.");
    assert!(empty.to_string().starts_with("No relevant memories found."));

    Ok(())
}

// ============================================================================
// Forget and restore
// ============================================================================

#[tokio::test]
async fn test_forget_semantics() -> Result<()> {
    let journal = Journal::open(&Config::in_memory()).await?;

    assert!(matches!(
        journal.forget(9999, "cleanup").await,
        Err(Error::NotFound(_))
    ));

    let id = journal
        .ingest(&NewMemory::new("a thing to forget").with_emotion("sad"))
        .await?;
    assert_eq!(journal.index_stats().await?.points, 1);

    assert!(journal.forget(id, "user request").await?);
    assert!(!journal.forget(id, "user request").await?);

    assert_eq!(journal.index_stats().await?.points, 0);
    assert!(matches!(journal.get(id).await, Err(Error::NotFound(_))));
    assert_eq!(journal.tombstones().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_restore_round_trip() -> Result<()> {
    let journal = Journal::open(&Config::in_memory()).await?;

    let id = journal
        .ingest(
            &NewMemory::new("first snowfall of the year")
                .with_emotion("joyful")
                .with_tags(["winter", "outside"])
                .with_intensity(8),
        )
        .await?;
    let before = journal.get(id).await?;

    journal.forget(id, "mistake").await?;
    assert!(journal.restore(id).await?);

    let after = journal.get(id).await?;
    assert_eq!(after.id, before.id);
    assert_eq!(after.text, before.text);
    assert_eq!(after.emotion, before.emotion);
    assert_eq!(after.tags, before.tags);
    assert_eq!(after.intensity, 8);
    assert_eq!(journal.index_stats().await?.points, 1);

    let audit = journal.audit_log(10).await?;
    assert_eq!(audit.len(), 2);

    // New ids never reuse a restored one.
    let next = journal.ingest(&NewMemory::new("later entry")).await?;
    assert!(next > id);

    Ok(())
}

/// A restore commits even when re-indexing fails; a later sync picks the
/// record up.
#[tokio::test]
async fn test_restore_survives_failed_reindex() -> Result<()> {
    let config = Config::in_memory();
    let store = RecordStore::open(&config.database).await?;
    let down = EmbeddingIndex::new(
        Arc::new(DownEmbedder),
        Arc::new(SqliteVectorStore::open(":memory:").await?),
        store.pool().clone(),
        config.chunking.clone(),
    )
    .await;
    let journal = Journal::from_parts(&config, store.clone(), down);

    let id = journal.ingest(&NewMemory::new("lantern festival")).await?;
    assert!(journal.forget(id, "mistake").await?);
    assert!(journal.restore(id).await?);
    assert_eq!(journal.get(id).await?.text, "lantern festival");

    let working = EmbeddingIndex::from_config(&config, store.pool().clone()).await;
    let healed = Journal::from_parts(&config, store, working);
    assert_eq!(healed.sync_missing(7).await?, 1);
    assert_eq!(healed.index_stats().await?.points, 1);

    Ok(())
}

#[tokio::test]
async fn test_forget_writes_backup_snapshot() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = keyword_only_config();
    config.database.backup_dir = Some(dir.path().to_path_buf());
    let journal = Journal::open(&config).await?;

    let id = journal.ingest(&NewMemory::new("keep a copy")).await?;
    journal.forget(id, "tidy").await?;

    let stone = &journal.tombstones().await?[0];
    assert!(std::path::Path::new(&stone.backup_ref).exists());

    Ok(())
}

// ============================================================================
// Index maintenance and persistence
// ============================================================================

#[tokio::test]
async fn test_sync_missing_and_prune() -> Result<()> {
    let journal = Journal::open(&Config::in_memory()).await?;

    journal.ingest(&NewMemory::new("indexed on ingest")).await?;
    let skipped = journal
        .store()
        .append(&NewMemory::new("written behind the index"))
        .await?;

    assert_eq!(journal.sync_missing(7).await?, 1);
    assert_eq!(journal.sync_missing(7).await?, 0);
    assert_eq!(journal.index_stats().await?.points, 2);

    // Tombstone behind the journal's back, leaving orphaned vectors.
    journal.store().soft_delete(skipped, "direct").await?;
    assert_eq!(journal.prune_orphans().await?, 1);
    assert_eq!(journal.index_stats().await?.points, 1);

    Ok(())
}

#[tokio::test]
async fn test_persistence_across_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = Config::in_memory();
    config.database.path = dir.path().join("keepsake.db").to_string_lossy().into_owned();
    config.vectors.sqlite_path = dir
        .path()
        .join("keepsake-vectors.db")
        .to_string_lossy()
        .into_owned();
    config.retrieval.similarity_threshold = 0.3;

    let id = {
        let journal = Journal::open(&config).await?;
        let id = journal
            .ingest(&NewMemory::new("I love debugging at night").with_emotion("calm"))
            .await?;
        journal.close().await;
        id
    };

    let journal = Journal::open(&config).await?;
    assert_eq!(journal.count().await?, 1);
    assert_eq!(journal.index_stats().await?.points, 1);

    let hits = journal.retrieve("debugging", None, 3).await?;
    assert_eq!(hits[0].memory_id, id);
    assert_eq!(hits[0].provenance, Provenance::Semantic);

    Ok(())
}

// ============================================================================
// Voice, patterns, summaries
// ============================================================================

#[tokio::test]
async fn test_transcript_and_weekly_summary() -> Result<()> {
    let journal = Journal::open(&keyword_only_config()).await?;

    let transcript = keepsake::models::Transcript {
        text: "voice note about the hike".to_string(),
        language: "en".to_string(),
        audio_path: None,
        duration_seconds: Some(31.0),
    };
    let id = journal
        .ingest_transcript(&transcript, vec!["hike".into()], Some("happy".into()), Some(7), true)
        .await?;
    assert_eq!(journal.get(id).await?.source, "voice");
    assert_eq!(db::list_voice_logs(journal.store().pool(), id).await?.len(), 1);

    let today = chrono::Utc::now().date_naive();
    let summary = journal.generate_weekly_summary(today).await?;
    assert_eq!(summary.entry_count, 1);
    assert_eq!(summary.flagged_count, 1);
    assert_eq!(summary.dominant_emotion(), Some("happy"));

    let history = journal.summary_history(4).await?;
    assert_eq!(history.len(), 1);

    let flagged = journal.flagged(10).await?;
    assert_eq!(flagged[0].id, id);

    Ok(())
}
