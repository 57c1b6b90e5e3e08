//! Error types for recommendation operations.

use crate::catalog::CatalogError;
use thiserror::Error;

/// Errors returned by recommendation collaborators.
#[derive(Debug, Error)]
pub enum RecommendError {
    /// The catalog could not supply candidates.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    /// Interaction store failure.
    #[error("store error: {0}")]
    Store(String),
}
