//! Service layer for Keepsake.
//!
//! - RecordStore (durable memories, tombstones, patterns)
//! - EmbeddingIndex (degradable vector index)
//! - RetrievalEngine (semantic or keyword, plus emotion)
//! - ContextAssembler (bounded context blocks)
//! - IngestService (store first, index best-effort)
//! - Summarizer (weekly digests)

pub mod context;
mod index;
mod ingest;
mod record_store;
pub mod retrieval;
pub mod summarizer;

pub use context::ContextAssembler;
pub use index::{EmbeddingIndex, IndexHit, IndexStats, IndexStatus};
pub use ingest::IngestService;
pub use record_store::{keyword_relevance, tokenize, RecordStore};
pub use retrieval::RetrievalEngine;
pub use summarizer::{week_bounds, Summarizer};
