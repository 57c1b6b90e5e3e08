//! Embedding client abstraction.

use async_trait::async_trait;
use thiserror::Error;

/// Embedding failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),
    #[error("embedding service returned an invalid vector: {0}")]
    InvalidVector(String),
}

/// Turns text into a dense vector.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
