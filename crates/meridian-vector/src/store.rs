//! Vector store: document index and similarity search.

use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::error::VectorError;
use crate::model::{
    DocumentMetadata, SearchOptions, SearchResponse, SearchResult, VectorDocument, VectorStats,
};
use crate::similarity::cosine_similarity;
use log::{debug, info, warn};
use meridian_config::VectorConfig;
use meridian_guard::{ContentSanitizer, SanitizerPolicy};
use meridian_protocol::CancelToken;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MSG_EMPTY_QUERY: &str = "Invalid or empty search query";
const MSG_QUERY_TOO_LONG: &str = "Search query too long";
const MSG_UNAVAILABLE: &str = "Search is temporarily unavailable";

#[derive(Default)]
struct Index {
    documents: BTreeMap<String, Arc<VectorDocument>>,
    /// Embedding length every document must share.
    dimension: Option<usize>,
}

/// In-memory similarity index.
///
/// Searches score a snapshot of the index taken under a short read lock, so
/// concurrent adds and removals never block a search in progress.
pub struct VectorStore {
    index: RwLock<Index>,
    embedder: Arc<dyn EmbeddingClient>,
    /// Strips unsafe fragments from queries.
    query_cleaner: ContentSanitizer,
    /// Sanitizes stored text before it is returned.
    reader: ContentSanitizer,
    config: VectorConfig,
}

impl VectorStore {
    pub fn new(
        config: VectorConfig,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, VectorError> {
        info!(
            "vector store ready (dimension={:?}, max_query_chars={})",
            config.dimension, config.max_query_chars
        );
        Ok(Self {
            index: RwLock::new(Index {
                documents: BTreeMap::new(),
                dimension: config.dimension,
            }),
            embedder,
            query_cleaner: ContentSanitizer::for_queries()?,
            reader: ContentSanitizer::new(SanitizerPolicy::default())?,
            config,
        })
    }

    /// Add a document with a precomputed embedding.
    pub fn add_document(&self, document: VectorDocument) -> Result<(), VectorError> {
        if document.id.trim().is_empty() {
            return Err(VectorError::InvalidDocument(
                "document id must not be empty".to_string(),
            ));
        }
        validate_embedding(&document.embedding)
            .map_err(|message| VectorError::InvalidDocument(message.to_string()))?;

        let mut index = self.index.write();
        if index.documents.contains_key(&document.id) {
            return Err(VectorError::DuplicateDocument(document.id));
        }
        let actual = document.embedding.len();
        match index.dimension {
            Some(expected) if expected != actual => {
                return Err(VectorError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => index.dimension = Some(actual),
        }
        debug!(
            "indexed document (document_id={}, dimension={})",
            document.id, actual
        );
        index.documents.insert(document.id.clone(), Arc::new(document));
        Ok(())
    }

    /// Embed `text` and add it under `id`.
    pub async fn index_text(
        &self,
        id: &str,
        text: &str,
        metadata: DocumentMetadata,
    ) -> Result<VectorDocument, VectorError> {
        let embedding = self.embed(text, None).await?;
        let document = VectorDocument::new(id, text, embedding).with_metadata(metadata);
        self.add_document(document.clone())?;
        Ok(document)
    }

    /// Remove a document. Returns whether it was present.
    pub fn remove_document(&self, id: &str) -> bool {
        let removed = self.index.write().documents.remove(id).is_some();
        if removed {
            debug!("removed document (document_id={})", id);
        }
        removed
    }

    pub fn get_stats(&self) -> VectorStats {
        let index = self.index.read();
        VectorStats {
            document_count: index.documents.len(),
            dimension: index.dimension,
            approximate_index_bytes: index
                .documents
                .values()
                .map(|document| document.approximate_bytes())
                .sum(),
        }
    }

    /// Rank stored documents by similarity to `query`.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> SearchResponse {
        let started = Instant::now();
        let cleaned = self.query_cleaner.sanitize(query);
        let cleaned_query = cleaned.cleaned.trim();
        let query_filtered = cleaned.rewritten;

        if cleaned_query.is_empty() {
            debug!(
                "search query rejected (reason=empty, raw_chars={})",
                query.chars().count()
            );
            return rejected(MSG_EMPTY_QUERY, started);
        }
        let limit = self.config.max_query_chars;
        if query.chars().count() > limit || cleaned_query.chars().count() > limit {
            debug!(
                "search query rejected (reason=too_long, raw_chars={})",
                query.chars().count()
            );
            return rejected(MSG_QUERY_TOO_LONG, started);
        }

        let embedding = match self.embed(cleaned_query, options.cancel.as_ref()).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!("query embedding failed (error={})", err);
                return unavailable(query_filtered, started);
            }
        };

        let (snapshot, dimension) = {
            let index = self.index.read();
            let documents: Vec<Arc<VectorDocument>> = index
                .documents
                .values()
                .filter(|document| match options.category.as_deref() {
                    Some(category) => document.metadata.category.as_deref() == Some(category),
                    None => true,
                })
                .cloned()
                .collect();
            (documents, index.dimension)
        };
        if dimension.is_some_and(|expected| expected != embedding.len()) {
            warn!(
                "query embedding dimension mismatch (expected={:?}, actual={})",
                dimension,
                embedding.len()
            );
            return unavailable(query_filtered, started);
        }

        let threshold = options.similarity.filter(|value| value.is_finite());
        let mut scored: Vec<(f32, &VectorDocument)> = snapshot
            .iter()
            .filter_map(|document| {
                cosine_similarity(&embedding, &document.embedding)
                    .map(|similarity| (similarity, document.as_ref()))
            })
            .filter(|(similarity, _)| threshold.is_none_or(|min| *similarity >= min))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(options.max_results.unwrap_or(self.config.default_max_results));

        let results: Vec<SearchResult> = scored
            .into_iter()
            .map(|(similarity, document)| SearchResult {
                document_id: document.id.clone(),
                text: self.reader.sanitize(&document.text).cleaned,
                similarity,
                metadata: document.metadata.clone(),
            })
            .collect();
        debug!(
            "search completed (results={}, vectors_searched={}, query_filtered={})",
            results.len(),
            snapshot.len(),
            query_filtered
        );
        SearchResponse {
            results,
            search_time_ms: elapsed_ms(started),
            vectors_searched: snapshot.len(),
            error: None,
            query_filtered,
        }
    }

    async fn embed(
        &self,
        text: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<f32>, VectorError> {
        let deadline = Duration::from_millis(self.config.embed_timeout_ms);
        let call = tokio::time::timeout(deadline, self.embedder.embed(text));
        let outcome = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VectorError::Cancelled),
                outcome = call => outcome,
            },
            None => call.await,
        };
        let embedding = outcome
            .map_err(|_| VectorError::EmbeddingTimeout(self.config.embed_timeout_ms))??;
        validate_embedding(&embedding)
            .map_err(|message| EmbeddingError::InvalidVector(message.to_string()))?;
        Ok(embedding)
    }
}

fn validate_embedding(embedding: &[f32]) -> Result<(), &'static str> {
    if embedding.is_empty() {
        return Err("embedding must not be empty");
    }
    if embedding.iter().any(|value| !value.is_finite()) {
        return Err("embedding values must be finite");
    }
    Ok(())
}

fn rejected(message: &str, started: Instant) -> SearchResponse {
    SearchResponse {
        search_time_ms: elapsed_ms(started),
        error: Some(message.to_string()),
        query_filtered: true,
        ..SearchResponse::default()
    }
}

fn unavailable(query_filtered: bool, started: Instant) -> SearchResponse {
    SearchResponse {
        search_time_ms: elapsed_ms(started),
        error: Some(MSG_UNAVAILABLE.to_string()),
        query_filtered,
        ..SearchResponse::default()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
