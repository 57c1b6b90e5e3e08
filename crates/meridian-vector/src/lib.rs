//! In-memory vector similarity search for Meridian.
//!
//! Documents carry precomputed embeddings; queries are cleaned, embedded via
//! an [`EmbeddingClient`] and ranked by cosine similarity.

pub mod embedding;
pub mod error;
pub mod model;
pub mod similarity;
pub mod store;

pub use embedding::{EmbeddingClient, EmbeddingError};
pub use error::VectorError;
pub use model::{
    DocumentMetadata, SearchOptions, SearchResponse, SearchResult, VectorDocument, VectorStats,
};
pub use similarity::cosine_similarity;
pub use store::VectorStore;
