//! Error types for the vector store.

use crate::embedding::EmbeddingError;
use meridian_guard::GuardError;
use thiserror::Error;

/// Errors returned when indexing documents or embedding text.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("document already indexed: {0}")]
    DuplicateDocument(String),
    #[error("embedding dimension mismatch (expected {expected}, got {actual})")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("embedding timed out after {0}ms")]
    EmbeddingTimeout(u64),
    #[error("embedding cancelled")]
    Cancelled,
    #[error("sanitizer setup failed: {0}")]
    Guard(#[from] GuardError),
}
