//! Weekly digests derived from memories.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MemoryId;

/// A highlighted (flagged) memory inside a weekly digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub memory_id: MemoryId,
    pub text: String,
    pub emotion: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One cached summary per ISO week.
///
/// `week_start` is Monday 00:00:00 UTC and `week_end` is Sunday 23:59:59 UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub entry_count: i64,
    pub flagged_count: i64,
    pub average_intensity: Option<f64>,
    /// Mood trend for the week, keyed by emotion label.
    pub emotion_counts: BTreeMap<String, i64>,
    /// Most frequent tags, most used first.
    pub top_tags: Vec<(String, i64)>,
    pub highlights: Vec<Highlight>,
    pub generated_at: DateTime<Utc>,
}

impl WeeklySummary {
    /// Emotion seen most often this week, ties broken alphabetically.
    pub fn dominant_emotion(&self) -> Option<&str> {
        self.emotion_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(label, _)| label.as_str())
    }
}
