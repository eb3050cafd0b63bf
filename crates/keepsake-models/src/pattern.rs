//! Recurring themes observed across memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pattern type used when callers don't specify one.
pub const DEFAULT_PATTERN_TYPE: &str = "humor";

/// An aggregated recurring theme, unique on `(pattern_type, pattern_text)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: i64,
    pub pattern_type: String,
    pub pattern_text: String,
    pub frequency: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
