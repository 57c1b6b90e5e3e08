//! Recommendation data types.

use chrono::{DateTime, Utc};
use meridian_protocol::{InteractionAction, UserId};
use serde::{Deserialize, Serialize};

/// Which list a candidate belongs in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Script,
    Article,
}

/// Descriptive attributes carried through from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
}

/// Raw catalog entry before personalisation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub category: String,
    /// Catalog relevance before interaction adjustments.
    pub base_score: f64,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

impl Candidate {
    pub fn new(
        id: impl Into<String>,
        kind: ItemKind,
        category: impl Into<String>,
        base_score: f64,
    ) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            kind,
            description: String::new(),
            category: category.into(),
            base_score,
            metadata: ItemMetadata::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Personalised recommendation returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// Final score in `[0, 1]`.
    pub confidence: f64,
    /// Plain-language explanation of the score.
    pub reasoning: String,
    pub metadata: ItemMetadata,
}

/// Recommendations split by item kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Recommendations {
    pub scripts: Vec<RecommendationItem>,
    pub articles: Vec<RecommendationItem>,
}

impl Recommendations {
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.articles.is_empty()
    }
}

/// A single piece of user feedback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub user_id: UserId,
    pub action: InteractionAction,
    pub item_id: String,
    /// Category of the item, when the caller knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    /// Interaction stamped with the current time.
    pub fn new(
        user_id: impl Into<UserId>,
        action: InteractionAction,
        item_id: impl Into<String>,
        category: Option<&str>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            action,
            item_id: item_id.into(),
            category: category.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// Explicit user preferences. A new value replaces the old one entirely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub user_id: UserId,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(default)]
    pub excluded_categories: Vec<String>,
}

impl UserPreferences {
    pub fn prefers(&self, category: &str) -> bool {
        self.preferred_categories.iter().any(|entry| entry == category)
    }

    pub fn excludes(&self, category: &str) -> bool {
        self.excluded_categories.iter().any(|entry| entry == category)
    }
}

/// Caller options for a recommendation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationOptions {
    /// Per-list limit. Falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_recommendations: Option<usize>,
    /// Lowest confidence kept, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

impl RecommendationOptions {
    pub fn with_max_recommendations(mut self, max: usize) -> Self {
        self.max_recommendations = Some(max);
        self
    }

    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }
}
