//! Keepsake - journaling and preference memory
//!
//! Stores short personal memories with emotion metadata, mirrors them into
//! an optional embedding index, and assembles bounded context blocks from
//! the most relevant past entries.

pub mod config;
pub mod db;
mod error;
mod journal;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
pub use journal::Journal;
pub use keepsake_models as models;
