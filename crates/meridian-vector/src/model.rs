//! Vector store data types.

use chrono::{DateTime, Utc};
use meridian_protocol::CancelToken;
use serde::{Deserialize, Serialize};

/// Descriptive attributes stored with a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl DocumentMetadata {
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Indexed text with its embedding. Never mutated once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorDocument {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    pub added_at: DateTime<Utc>,
}

impl VectorDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata: DocumentMetadata::default(),
            added_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Rough memory footprint of this entry.
    pub(crate) fn approximate_bytes(&self) -> usize {
        self.id.len() + self.text.len() + self.embedding.len() * std::mem::size_of::<f32>()
    }
}

/// One ranked hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub document_id: String,
    /// Sanitized document text.
    pub text: String,
    /// Cosine similarity in `[0, 1]`.
    pub similarity: f32,
    pub metadata: DocumentMetadata,
}

/// Caller options for [`crate::VectorStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum hits. Falls back to the configured default.
    pub max_results: Option<usize>,
    /// Minimum similarity kept.
    pub similarity: Option<f32>,
    /// Only consider documents in this category.
    pub category: Option<String>,
    pub cancel: Option<CancelToken>,
}

impl SearchOptions {
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Search outcome. Failures are reported in `error` with no results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Milliseconds spent on the search.
    #[serde(rename = "searchTime")]
    pub search_time_ms: u64,
    /// Documents compared against the query.
    pub vectors_searched: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the query was altered or rejected by cleanup.
    pub query_filtered: bool,
}

/// Index statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VectorStats {
    pub document_count: usize,
    pub dimension: Option<usize>,
    pub approximate_index_bytes: usize,
}
