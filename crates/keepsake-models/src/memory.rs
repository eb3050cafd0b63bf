//! Memory records: one logged thought or utterance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned memory identifier.
pub type MemoryId = i64;

/// Lowest accepted intensity.
pub const MIN_INTENSITY: u8 = 1;

/// Highest accepted intensity.
pub const MAX_INTENSITY: u8 = 10;

/// Neutral midpoint used when no intensity is supplied.
pub const DEFAULT_INTENSITY: u8 = 5;

/// Common origin tags. `source` is free text, these are just the usual ones.
pub mod sources {
    pub const MANUAL: &str = "manual";
    pub const VOICE: &str = "voice";
    pub const IMPORT: &str = "import";
}

/// A persisted memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub text: String,
    pub source: String,
    /// Display order is preserved; matching ignores order.
    pub tags: Vec<String>,
    /// Open vocabulary label from an external classifier.
    pub emotion: Option<String>,
    pub intensity: u8,
    /// Noteworthy / high-signal marker.
    pub flagged: bool,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// True when the record carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Metadata copied into the embedding index for this record.
    pub fn embedding_metadata(&self) -> EmbeddingMetadata {
        EmbeddingMetadata {
            memory_id: self.id,
            emotion: self.emotion.clone(),
            tags: self.tags.clone(),
            source: self.source.clone(),
            flagged: self.flagged,
            created_at: self.created_at,
        }
    }
}

/// Input for appending a new memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub text: String,
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub emotion: Option<String>,
    /// Falls back to [`DEFAULT_INTENSITY`].
    pub intensity: Option<u8>,
    #[serde(default)]
    pub flagged: bool,
    /// Only batch importers set this; otherwise the store stamps "now".
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMemory {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn with_intensity(mut self, intensity: u8) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn flagged(mut self, flagged: bool) -> Self {
        self.flagged = flagged;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Source tag, defaulting to "manual".
    pub fn source_or_default(&self) -> &str {
        self.source.as_deref().unwrap_or(sources::MANUAL)
    }

    /// Intensity, defaulting to the neutral midpoint.
    pub fn intensity_or_default(&self) -> u8 {
        self.intensity.unwrap_or(DEFAULT_INTENSITY)
    }
}

/// Fields duplicated into the embedding index so it can filter
/// without round-tripping to the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub memory_id: MemoryId,
    pub emotion: Option<String>,
    pub tags: Vec<String>,
    pub source: String,
    pub flagged: bool,
    pub created_at: DateTime<Utc>,
}

/// Output of the external transcription collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Language tag reported by the transcriber, e.g. "en" or "hinglish".
    pub language: String,
    pub audio_path: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// Audio metadata row linked to the memory created from a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceLog {
    pub id: i64,
    pub memory_id: MemoryId,
    pub audio_path: Option<String>,
    pub language: String,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
}
