//! Data models for Keepsake.
//!
//! Defines the records persisted by the store (memories, tombstones,
//! patterns, weekly summaries, voice logs) and the shapes handed out by
//! retrieval and context assembly.

mod context;
mod memory;
mod pattern;
mod retrieval;
mod summary;
pub mod timestamp;
mod tombstone;

pub use context::*;
pub use memory::*;
pub use pattern::*;
pub use retrieval::*;
pub use summary::*;
pub use tombstone::*;

use chrono::{DateTime, Utc};

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
