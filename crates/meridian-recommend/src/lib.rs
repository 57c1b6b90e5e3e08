//! Recommendation scoring for Meridian.
//!
//! Candidates come from an external [`CatalogSource`]; this crate adjusts
//! their confidence from the user's recent [`Interaction`]s and preferences,
//! then filters and ranks them deterministically.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod interactions;
pub mod model;
pub mod scoring;

pub use catalog::{CatalogError, CatalogRequest, CatalogSource};
pub use engine::RecommendationEngine;
pub use error::RecommendError;
pub use interactions::{InMemoryInteractionStore, InteractionStore};
pub use model::{
    Candidate, Interaction, ItemKind, ItemMetadata, RecommendationItem, RecommendationOptions,
    Recommendations, UserPreferences,
};
pub use scoring::{ScoreOutcome, Scorer};
