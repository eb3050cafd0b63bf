//! The bounded context block handed to downstream prompt builders.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MemoryId, PatternRecord, Provenance};

/// One included memory, already cut down to its preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub memory_id: MemoryId,
    pub preview: String,
    pub emotion: Option<String>,
    pub flagged: bool,
    pub score: f32,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

/// A recently observed emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub emotion: String,
    pub intensity: u8,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub summary: String,
    pub entries: Vec<ContextEntry>,
    pub recent_emotions: Vec<EmotionSample>,
    pub patterns: Vec<PatternRecord>,
    pub generated_at: DateTime<Utc>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Characters used by entry previews.
    pub fn entry_chars(&self) -> usize {
        self.entries.iter().map(|e| e.preview.chars().count()).sum()
    }
}

impl fmt::Display for ContextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;

        for entry in &self.entries {
            let date = entry.created_at.format("%Y-%m-%d");
            match &entry.emotion {
                Some(emotion) => writeln!(f, "- [{date}, {emotion}] {}", entry.preview)?,
                None => writeln!(f, "- [{date}] {}", entry.preview)?,
            }
        }

        if !self.recent_emotions.is_empty() {
            let labels: Vec<&str> = self
                .recent_emotions
                .iter()
                .map(|s| s.emotion.as_str())
                .collect();
            writeln!(f, "Recent emotions: {}", labels.join(", "))?;
        }

        if !self.patterns.is_empty() {
            let themes: Vec<String> = self
                .patterns
                .iter()
                .map(|p| format!("{} (x{})", p.pattern_text, p.frequency))
                .collect();
            writeln!(f, "Recurring: {}", themes.join(", "))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_lists_entries_and_signals() {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let block = ContextBlock {
            summary: "1 topically related".to_string(),
            entries: vec![ContextEntry {
                memory_id: 1,
                preview: "I love debugging at night".to_string(),
                emotion: Some("calm".to_string()),
                flagged: false,
                score: 1.0,
                provenance: Provenance::Keyword,
                created_at: at,
            }],
            recent_emotions: vec![EmotionSample {
                emotion: "calm".to_string(),
                intensity: 5,
                at,
            }],
            patterns: Vec::new(),
            generated_at: at,
        };

        let rendered = block.to_string();
        assert!(rendered.starts_with("1 topically related\n"));
        assert!(rendered.contains("- [2024-03-04, calm] I love debugging at night"));
        assert!(rendered.contains("Recent emotions: calm"));
        assert!(!rendered.contains("Recurring"));
        assert_eq!(block.entry_chars(), 25);
    }
}
