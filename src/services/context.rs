//! Context assembly: retrieval hits cut down to a bounded block, plus a few
//! recent signals from the record store.

use keepsake_models::{ContextBlock, ContextEntry, EmotionSample, PatternRecord, RankedHit};
use tracing::{debug, warn};

use super::record_store::RecordStore;
use super::retrieval::RetrievalEngine;
use crate::config::ContextConfig;
use crate::Result;

const ELLIPSIS: &str = "...";
const SIGNAL_WINDOW_DAYS: i64 = 7;
const MAX_EMOTION_SAMPLES: usize = 5;
const MAX_PATTERNS: usize = 3;

#[derive(Clone)]
pub struct ContextAssembler {
    retrieval: RetrievalEngine,
    store: RecordStore,
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(retrieval: RetrievalEngine, store: RecordStore, config: ContextConfig) -> Self {
        Self {
            retrieval,
            store,
            config,
        }
    }

    /// Assemble with the configured memory and character limits.
    pub async fn assemble_default(
        &self,
        current_text: &str,
        current_emotion: Option<&str>,
    ) -> Result<ContextBlock> {
        self.assemble(
            current_text,
            current_emotion,
            self.config.max_memories,
            self.config.max_chars,
        )
        .await
    }

    /// Retrieve up to `max_memories` hits and keep them, in rank order, while
    /// the preview characters stay within `max_chars`.
    pub async fn assemble(
        &self,
        current_text: &str,
        current_emotion: Option<&str>,
        max_memories: usize,
        max_chars: usize,
    ) -> Result<ContextBlock> {
        let hits = self
            .retrieval
            .retrieve(current_text, current_emotion, max_memories)
            .await?;

        let entries = bounded_entries(&hits, self.config.preview_chars, max_chars);
        let summary = summarize(&entries);

        let recent_emotions = self.recent_emotions().await;
        let patterns = self.patterns().await;

        debug!(
            hits = hits.len(),
            entries = entries.len(),
            "Context assembled"
        );

        Ok(ContextBlock {
            summary,
            entries,
            recent_emotions,
            patterns,
            generated_at: keepsake_models::now(),
        })
    }

    async fn recent_emotions(&self) -> Vec<EmotionSample> {
        match self
            .store
            .recent_emotions(SIGNAL_WINDOW_DAYS, MAX_EMOTION_SAMPLES)
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                warn!(error = %e, "Could not load recent emotions");
                Vec::new()
            }
        }
    }

    async fn patterns(&self) -> Vec<PatternRecord> {
        match self.store.top_patterns(None, MAX_PATTERNS).await {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!(error = %e, "Could not load patterns");
                Vec::new()
            }
        }
    }
}

/// Cut `text` to at most `limit` characters, the ellipsis included.
pub fn preview(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out.chars().take(limit).collect()
}

/// Entries in rank order until the first one that would overflow
/// `max_chars`.
pub fn bounded_entries(
    hits: &[RankedHit],
    preview_chars: usize,
    max_chars: usize,
) -> Vec<ContextEntry> {
    let mut used = 0;
    let mut entries = Vec::new();

    for hit in hits {
        let text = preview(&hit.text, preview_chars);
        let len = text.chars().count();
        if used + len > max_chars {
            break;
        }
        used += len;
        entries.push(ContextEntry {
            memory_id: hit.memory_id,
            preview: text,
            emotion: hit.emotion.clone(),
            flagged: hit.flagged,
            score: hit.score,
            provenance: hit.provenance,
            created_at: hit.created_at,
        });
    }

    entries
}

/// One-line description of what made it into the block.
pub fn summarize(entries: &[ContextEntry]) -> String {
    if entries.is_empty() {
        return "No relevant memories found.".to_string();
    }

    let topical = entries.iter().filter(|e| e.provenance.is_topical()).count();
    let emotional = entries.len() - topical;
    let flagged = entries.iter().filter(|e| e.flagged).count();

    let mut parts = Vec::new();
    if topical > 0 {
        parts.push(format!("{} topically related", topical));
    }
    if emotional > 0 {
        parts.push(format!("{} emotionally similar", emotional));
    }
    if flagged > 0 {
        parts.push(format!("{} flagged", flagged));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_models::Provenance;

    fn hit(text: &str, provenance: Provenance, flagged: bool) -> RankedHit {
        RankedHit {
            memory_id: 1,
            text: text.to_string(),
            emotion: None,
            tags: Vec::new(),
            flagged,
            created_at: chrono::Utc::now(),
            score: 0.9,
            provenance,
        }
    }

    #[test]
    fn test_preview_counts_ellipsis() {
        let long = "x".repeat(500);
        let p = preview(&long, 200);
        assert_eq!(p.chars().count(), 200);
        assert!(p.ends_with("..."));

        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview(&"é".repeat(10), 5), "éé...");
    }

    #[test]
    fn test_first_overflow_stops_assembly() {
        let hits = vec![
            hit(&"a".repeat(40), Provenance::Keyword, false),
            hit(&"b".repeat(80), Provenance::Keyword, false),
            hit(&"c".repeat(10), Provenance::Emotional, false),
        ];

        let entries = bounded_entries(&hits, 200, 100);
        assert_eq!(entries.len(), 1);
        assert!(entries.iter().map(|e| e.preview.len()).sum::<usize>() <= 100);
    }

    #[test]
    fn test_zero_budget_gives_nothing() {
        let hits = vec![hit("anything", Provenance::Semantic, false)];
        assert!(bounded_entries(&hits, 200, 0).is_empty());
    }

    #[test]
    fn test_summary_line() {
        let hits = vec![
            hit("one", Provenance::Semantic, true),
            hit("two", Provenance::Keyword, false),
            hit("three", Provenance::Emotional, false),
        ];
        let entries = bounded_entries(&hits, 200, 2000);
        assert_eq!(
            summarize(&entries),
            "2 topically related, 1 emotionally similar, 1 flagged"
        );
        assert_eq!(summarize(&[]), "No relevant memories found.");
    }
}
