//! Recommendation engine: candidate retrieval, personalisation and ranking.

use crate::catalog::{CatalogRequest, CatalogSource};
use crate::error::RecommendError;
use crate::interactions::{InMemoryInteractionStore, InteractionStore};
use crate::model::{
    Candidate, Interaction, ItemKind, RecommendationItem, RecommendationOptions, Recommendations,
    UserPreferences,
};
use crate::scoring::Scorer;
use log::{debug, info, warn};
use meridian_config::RecommendationsConfig;
use meridian_protocol::{Envelope, ErrorBody, ErrorCode, RequestTimer, ResponseMetadata};
use std::cmp::Ordering;
use std::sync::Arc;

const MSG_INVALID_LIMIT: &str = "maxRecommendations must be between 1 and the configured limit.";
const MSG_INVALID_CONFIDENCE: &str = "minConfidence must be a number between 0 and 1.";
const MSG_USER_REQUIRED: &str = "A user id is required to record feedback or preferences.";
const MSG_ITEM_REQUIRED: &str = "An item id is required to record an interaction.";
const MSG_CATALOG_UNAVAILABLE: &str =
    "Recommendations are temporarily unavailable. Please try again later.";
const MSG_STORE_UNAVAILABLE: &str = "User activity could not be saved. Please try again later.";

/// Personalised recommendations over an external catalog.
pub struct RecommendationEngine {
    catalog: Arc<dyn CatalogSource>,
    store: Arc<dyn InteractionStore>,
    scorer: Scorer,
    config: RecommendationsConfig,
}

impl RecommendationEngine {
    /// Engine backed by an in-memory interaction store.
    pub fn new(config: RecommendationsConfig, catalog: Arc<dyn CatalogSource>) -> Self {
        let store = Arc::new(InMemoryInteractionStore::new(config.history_limit));
        Self::with_store(config, catalog, store)
    }

    pub fn with_store(
        config: RecommendationsConfig,
        catalog: Arc<dyn CatalogSource>,
        store: Arc<dyn InteractionStore>,
    ) -> Self {
        info!(
            "recommendation engine ready (history_limit={}, max_limit={})",
            config.history_limit, config.max_limit
        );
        Self {
            catalog,
            store,
            scorer: Scorer::new(config.clone()),
            config,
        }
    }

    /// Ranked script and article recommendations for an optional user.
    pub async fn get_recommendations(
        &self,
        user_id: Option<&str>,
        options: &RecommendationOptions,
    ) -> Envelope<Recommendations> {
        let timer = RequestTimer::start();
        let result = self.recommend(user_id, options).await;
        let mut metadata = timer.metadata();
        metadata.processing_time_ms = timer.elapsed_ms();
        finish(result, metadata)
    }

    /// Record user feedback on an item.
    pub fn track_interaction(&self, interaction: Interaction) -> Envelope<Interaction> {
        let timer = RequestTimer::start();
        let result = self.record_interaction(interaction);
        finish(result, timer.metadata())
    }

    /// Replace a user's preferences. Later calls win.
    pub fn update_user_preferences(
        &self,
        preferences: UserPreferences,
    ) -> Envelope<UserPreferences> {
        let timer = RequestTimer::start();
        let result = if preferences.user_id.trim().is_empty() {
            Err(ErrorBody::new(ErrorCode::Validation, MSG_USER_REQUIRED))
        } else {
            self.store
                .set_preferences(preferences.clone())
                .map(|()| preferences)
                .map_err(|err| store_error_body(&err))
        };
        finish(result, timer.metadata())
    }

    async fn recommend(
        &self,
        user_id: Option<&str>,
        options: &RecommendationOptions,
    ) -> Result<Recommendations, ErrorBody> {
        let limit = options
            .max_recommendations
            .unwrap_or(self.config.default_max_recommendations);
        if limit == 0 || limit > self.config.max_limit {
            return Err(ErrorBody::new(ErrorCode::Validation, MSG_INVALID_LIMIT));
        }
        let min_confidence = options.min_confidence.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ErrorBody::new(ErrorCode::Validation, MSG_INVALID_CONFIDENCE));
        }

        let user_id = user_id.map(str::trim).filter(|id| !id.is_empty());
        let (interactions, preferences) = match user_id {
            Some(id) => (
                self.store
                    .recent(id, self.config.history_limit)
                    .map_err(|err| store_error_body(&err))?,
                self.store
                    .preferences(id)
                    .map_err(|err| store_error_body(&err))?,
            ),
            None => (Vec::new(), None),
        };

        let request = CatalogRequest {
            user_id: user_id.map(str::to_string),
            preferred_categories: preferences
                .as_ref()
                .map(|prefs| prefs.preferred_categories.clone())
                .unwrap_or_default(),
            limit_hint: limit,
        };
        let candidates = self.catalog.candidates(&request).await.map_err(|err| {
            warn!("catalog lookup failed (error={})", RecommendError::from(err));
            ErrorBody::new(ErrorCode::ServiceUnavailable, MSG_CATALOG_UNAVAILABLE)
        })?;
        debug!(
            "scoring candidates (candidates={}, interactions={}, has_preferences={})",
            candidates.len(),
            interactions.len(),
            preferences.is_some()
        );

        let mut scripts = Vec::new();
        let mut articles = Vec::new();
        for candidate in candidates {
            let Some(outcome) = self
                .scorer
                .score(&candidate, &interactions, preferences.as_ref())
            else {
                continue;
            };
            if outcome.confidence < min_confidence {
                continue;
            }
            let kind = candidate.kind;
            let item = into_item(candidate, outcome.confidence, outcome.reasoning);
            match kind {
                ItemKind::Script => scripts.push(item),
                ItemKind::Article => articles.push(item),
            }
        }
        rank(&mut scripts, limit);
        rank(&mut articles, limit);
        Ok(Recommendations { scripts, articles })
    }

    fn record_interaction(&self, interaction: Interaction) -> Result<Interaction, ErrorBody> {
        if interaction.user_id.trim().is_empty() {
            return Err(ErrorBody::new(ErrorCode::Validation, MSG_USER_REQUIRED));
        }
        if interaction.item_id.trim().is_empty() {
            return Err(ErrorBody::new(ErrorCode::Validation, MSG_ITEM_REQUIRED));
        }
        debug!(
            "tracking interaction (user_id={}, action={}, item_id={})",
            interaction.user_id,
            interaction.action.as_str(),
            interaction.item_id
        );
        self.store
            .record(interaction.clone())
            .map_err(|err| store_error_body(&err))?;
        Ok(interaction)
    }
}

fn into_item(candidate: Candidate, confidence: f64, reasoning: String) -> RecommendationItem {
    RecommendationItem {
        id: candidate.id,
        title: candidate.title,
        description: candidate.description,
        category: candidate.category,
        confidence,
        reasoning,
        metadata: candidate.metadata,
    }
}

/// Confidence descending, ties by id ascending, then truncate.
fn rank(items: &mut Vec<RecommendationItem>, limit: usize) {
    items.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    items.truncate(limit);
}

fn store_error_body(err: &RecommendError) -> ErrorBody {
    warn!("recommendation store failed (error={})", err);
    ErrorBody::new(ErrorCode::ServiceUnavailable, MSG_STORE_UNAVAILABLE)
}

fn finish<T>(result: Result<T, ErrorBody>, metadata: ResponseMetadata) -> Envelope<T> {
    match result {
        Ok(data) => Envelope::ok(data, metadata),
        Err(error) => Envelope::fail(error, metadata),
    }
}
