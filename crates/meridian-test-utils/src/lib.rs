//! Test helpers shared across Meridian crates.

pub mod catalog;
pub mod embedding;
pub mod provider;

pub use catalog::{FailingCatalog, StaticCatalog};
pub use embedding::{FailingEmbedding, KeywordEmbedding, SlowEmbedding};
pub use provider::{
    EchoProvider, FailingProvider, FixedProvider, FlakyProvider, RecordingProvider, SlowProvider,
};
