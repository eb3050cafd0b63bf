//! Tracing setup for applications embedding Keepsake.
//!
//! The library only emits events; installing a subscriber is left to the
//! caller.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{Error, Result};

const DEFAULT_FILTER: &str = "keepsake=info";

/// Human-readable logs filtered by `RUST_LOG`, defaulting to `keepsake=info`.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Internal(format!("Tracing already initialised: {}", e)))
}

/// Same filter, one JSON object per event.
pub fn init_json_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| Error::Internal(format!("Tracing already initialised: {}", e)))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}
