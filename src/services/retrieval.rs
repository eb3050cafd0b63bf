//! Dual-path retrieval: topical hits (semantic, or keyword when the index is
//! unusable) merged with emotion-matched hits.

use std::collections::{HashMap, HashSet};

use keepsake_models::timestamp::days_before_now;
use keepsake_models::{MemoryId, MemoryRecord, Provenance, RankedHit};
use keepsake_vectors::SearchFilter;
use tracing::{debug, warn};

use super::index::{EmbeddingIndex, IndexHit};
use super::record_store::RecordStore;
use crate::config::RetrievalConfig;
use crate::{Error, Result};

/// Ranks past memories against the current entry.
#[derive(Clone)]
pub struct RetrievalEngine {
    store: RecordStore,
    index: EmbeddingIndex,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(store: RecordStore, index: EmbeddingIndex, config: RetrievalConfig) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve within the configured lookback window.
    pub async fn retrieve(
        &self,
        query_text: &str,
        current_emotion: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RankedHit>> {
        self.retrieve_within(
            query_text,
            current_emotion,
            max_results,
            self.config.lookback_days,
        )
        .await
    }

    /// Up to `max_results` hits created within the last `lookback_days`.
    ///
    /// Fails only when the record store errors and the index cannot stand
    /// in for it.
    pub async fn retrieve_within(
        &self,
        query_text: &str,
        current_emotion: Option<&str>,
        max_results: usize,
        lookback_days: i64,
    ) -> Result<Vec<RankedHit>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let semantic = if self.index.available() {
            match self
                .semantic_hits(query_text, current_emotion, max_results, lookback_days)
                .await
            {
                Ok(hits) => Some(hits),
                Err(e) => {
                    warn!(error = %e, "Semantic query failed, falling back to keywords");
                    None
                }
            }
        } else {
            None
        };
        let index_answered = semantic.is_some();

        let mut store_error: Option<Error> = None;

        let topical = match semantic {
            Some(hits) => hits,
            None => match self
                .keyword_hits(query_text, current_emotion, max_results, lookback_days)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    store_error = Some(e);
                    Vec::new()
                }
            },
        };

        let emotional = match current_emotion {
            Some(label) => match self.emotional_hits(label, max_results / 2, lookback_days).await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, emotion = label, "Emotion lookup failed");
                    store_error.get_or_insert(e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if let Some(e) = store_error {
            if !index_answered {
                return Err(Error::Retrieval(format!(
                    "record store failed and the embedding index is unusable: {}",
                    e
                )));
            }
            warn!(error = %e, "Record store failed, returning index hits only");
        }

        let merged = merge_hits(topical, emotional, max_results);
        debug!(
            hits = merged.len(),
            semantic = index_answered,
            "Retrieval complete"
        );
        Ok(merged)
    }

    async fn semantic_hits(
        &self,
        query_text: &str,
        current_emotion: Option<&str>,
        max_results: usize,
        lookback_days: i64,
    ) -> Result<Vec<RankedHit>> {
        let mut filter = SearchFilter::new();
        if let Some(since) = days_before_now(lookback_days) {
            filter = filter.created_after(since);
        }
        let hits = self
            .index
            .query(query_text, max_results.saturating_mul(2), &filter)
            .await?;

        let best = best_per_memory(hits, |hit| {
            let similarity = similarity_from_distance(hit.distance);
            let score = apply_emotion_penalty(
                similarity,
                current_emotion,
                hit.metadata.emotion.as_deref(),
                self.config.emotion_penalty,
            );
            (score >= self.config.similarity_threshold).then_some(score)
        });

        if best.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<MemoryId> = best.iter().map(|(hit, _)| hit.memory_id).collect();
        match self.store.get_many(&ids).await {
            Ok(records) => {
                let live: HashMap<MemoryId, MemoryRecord> =
                    records.into_iter().map(|r| (r.id, r)).collect();
                Ok(best
                    .into_iter()
                    .filter_map(|(hit, score)| {
                        live.get(&hit.memory_id)
                            .map(|r| RankedHit::from_record(r, score, Provenance::Semantic))
                    })
                    .collect())
            }
            Err(e) => {
                warn!(error = %e, "Hydration failed, using index payloads");
                Ok(best
                    .into_iter()
                    .map(|(hit, score)| hit_from_payload(hit, score))
                    .collect())
            }
        }
    }

    async fn keyword_hits(
        &self,
        query_text: &str,
        current_emotion: Option<&str>,
        max_results: usize,
        lookback_days: i64,
    ) -> Result<Vec<RankedHit>> {
        let matches = self
            .store
            .keyword_search(query_text, max_results.saturating_mul(2), Some(lookback_days))
            .await?;

        Ok(matches
            .into_iter()
            .map(|(record, relevance)| {
                let score = apply_emotion_penalty(
                    relevance,
                    current_emotion,
                    record.emotion.as_deref(),
                    self.config.emotion_penalty,
                );
                RankedHit::from_record(&record, score, Provenance::Keyword)
            })
            .collect())
    }

    async fn emotional_hits(
        &self,
        label: &str,
        limit: usize,
        lookback_days: i64,
    ) -> Result<Vec<RankedHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let records = self
            .store
            .by_emotion(label, limit, Some(lookback_days))
            .await?;

        Ok(records
            .iter()
            .map(|r| RankedHit::from_record(r, self.config.emotional_score, Provenance::Emotional))
            .collect())
    }
}

/// Cosine distance to a similarity in [0, 1].
pub fn similarity_from_distance(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Scale `score` by `penalty` when a current emotion is given and the hit's
/// emotion is different or missing.
pub fn apply_emotion_penalty(
    score: f32,
    current: Option<&str>,
    hit: Option<&str>,
    penalty: f32,
) -> f32 {
    match current {
        Some(current) if hit != Some(current) => score * penalty,
        _ => score,
    }
}

/// Topical hits first, then emotional ones; drop repeated texts keeping the
/// first; stable sort by score; keep `max_results`.
pub fn merge_hits(
    topical: Vec<RankedHit>,
    emotional: Vec<RankedHit>,
    max_results: usize,
) -> Vec<RankedHit> {
    let mut seen = HashSet::new();
    let mut merged: Vec<RankedHit> = topical
        .into_iter()
        .chain(emotional)
        .filter(|hit| seen.insert(hit.text.clone()))
        .collect();

    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(max_results);
    merged
}

/// Score each hit, drop the ones `score` rejects, keep the best chunk per
/// memory. Order follows each memory's first appearance.
fn best_per_memory<F>(hits: Vec<IndexHit>, score: F) -> Vec<(IndexHit, f32)>
where
    F: Fn(&IndexHit) -> Option<f32>,
{
    let mut best: Vec<(IndexHit, f32)> = Vec::new();
    let mut slot: HashMap<MemoryId, usize> = HashMap::new();

    for hit in hits {
        let Some(s) = score(&hit) else {
            continue;
        };
        match slot.get(&hit.memory_id) {
            Some(&i) => {
                if s > best[i].1 {
                    best[i] = (hit, s);
                }
            }
            None => {
                slot.insert(hit.memory_id, best.len());
                best.push((hit, s));
            }
        }
    }

    best
}

fn hit_from_payload(hit: IndexHit, score: f32) -> RankedHit {
    let created_at = hit
        .metadata
        .created_at()
        .unwrap_or_else(keepsake_models::now);
    RankedHit {
        memory_id: hit.memory_id,
        text: hit.text,
        emotion: hit.metadata.emotion,
        tags: hit.metadata.tags,
        flagged: hit.metadata.flagged,
        created_at,
        score,
        provenance: Provenance::Semantic,
    }
}
