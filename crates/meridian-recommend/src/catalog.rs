//! Candidate supply.

use crate::model::Candidate;
use async_trait::async_trait;
use meridian_protocol::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the engine asks the catalog for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatalogRequest {
    pub user_id: Option<UserId>,
    /// Categories the user prefers, as a retrieval hint.
    pub preferred_categories: Vec<String>,
    /// Upper bound on results the engine will return per kind.
    pub limit_hint: usize,
}

/// Catalog failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// External source of raw, pre-scored candidates.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn candidates(&self, request: &CatalogRequest) -> Result<Vec<Candidate>, CatalogError>;
}
