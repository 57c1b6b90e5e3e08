//! Confidence adjustment from interactions and preferences.

use crate::model::{Candidate, Interaction, UserPreferences};
use meridian_config::{InteractionWeights, RecommendationsConfig};
use meridian_protocol::InteractionAction;

/// Score assigned to one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    /// Final confidence in `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
}

/// Applies the configured weights to candidates.
#[derive(Debug, Clone)]
pub struct Scorer {
    config: RecommendationsConfig,
}

impl Scorer {
    pub fn new(config: RecommendationsConfig) -> Self {
        Self { config }
    }

    /// Score `candidate` for a user. `None` when the user excluded its category.
    pub fn score(
        &self,
        candidate: &Candidate,
        interactions: &[Interaction],
        preferences: Option<&UserPreferences>,
    ) -> Option<ScoreOutcome> {
        if preferences.is_some_and(|prefs| prefs.excludes(&candidate.category)) {
            return None;
        }

        let base = finite_or_zero(candidate.base_score);
        let mut raw_delta = 0.0;
        let mut related = 0usize;
        for interaction in interactions {
            let weight = action_weight(&self.config.weights, interaction.action);
            if interaction.item_id == candidate.id {
                raw_delta += weight * self.config.same_item_multiplier;
                related += 1;
            } else if interaction.category.as_deref() == Some(candidate.category.as_str()) {
                raw_delta += weight;
                related += 1;
            }
        }
        let bound = self.config.max_delta.abs();
        let delta = finite_or_zero(raw_delta).clamp(-bound, bound);
        let preferred = preferences.is_some_and(|prefs| prefs.prefers(&candidate.category));
        let boost = if preferred {
            self.config.preference_boost
        } else {
            0.0
        };
        let confidence = (base + delta + boost).clamp(0.0, 1.0);

        let mut reasons = vec![format!("Catalog relevance is {base:.2}")];
        if delta > 0.0 {
            reasons.push(format!(
                "{related} of your recent interactions with {} items raised it by {delta:.2}",
                candidate.category
            ));
        } else if delta < 0.0 {
            reasons.push(format!(
                "{related} of your recent interactions with {} items lowered it by {:.2}",
                candidate.category,
                delta.abs()
            ));
        }
        if preferred {
            reasons.push(format!(
                "{} is one of your preferred categories (+{boost:.2})",
                candidate.category
            ));
        }

        Some(ScoreOutcome {
            confidence,
            reasoning: format!("{}.", reasons.join("; ")),
        })
    }
}

fn action_weight(weights: &InteractionWeights, action: InteractionAction) -> f64 {
    match action {
        InteractionAction::Click => weights.click,
        InteractionAction::Like => weights.like,
        InteractionAction::Dislike => weights.dislike,
        InteractionAction::Dismiss => weights.dismiss,
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
