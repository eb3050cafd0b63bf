//! Ranked retrieval results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MemoryId, MemoryRecord};

/// Which retrieval path produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Nearest-neighbour match from the embedding index.
    Semantic,
    /// Token-overlap match from the record store.
    Keyword,
    /// Same emotion as the caller's current one.
    Emotional,
}

impl Provenance {
    /// Semantic and keyword hits are about the query's topic.
    pub fn is_topical(&self) -> bool {
        matches!(self, Self::Semantic | Self::Keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Emotional => "emotional",
        }
    }
}

/// A single retrieval result, whatever path produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub memory_id: MemoryId,
    pub text: String,
    pub emotion: Option<String>,
    pub tags: Vec<String>,
    pub flagged: bool,
    pub created_at: DateTime<Utc>,
    /// In [0, 1]. Higher is more relevant.
    pub score: f32,
    pub provenance: Provenance,
}

impl RankedHit {
    pub fn from_record(record: &MemoryRecord, score: f32, provenance: Provenance) -> Self {
        Self {
            memory_id: record.id,
            text: record.text.clone(),
            emotion: record.emotion.clone(),
            tags: record.tags.clone(),
            flagged: record.flagged,
            created_at: record.created_at,
            score,
            provenance,
        }
    }
}
