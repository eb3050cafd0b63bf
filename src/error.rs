//! Error types for Keepsake.
//!
//! An unavailable embedding index is a state, not an error; see
//! [`IndexStatus`](crate::services::IndexStatus).

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Caller errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Storage errors
    #[error("Record store unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] keepsake_vectors::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] keepsake_embeddings::Error),

    /// Both the record store and the embedding index failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    // Plumbing
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::VectorStore(_) => "VECTOR_STORE_ERROR",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Retrieval(_) => "RETRIEVAL_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for failures of the relational store itself.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<chrono::ParseError> for Error {
    fn from(e: chrono::ParseError) -> Self {
        Self::Internal(format!("Malformed stored timestamp: {}", e))
    }
}
