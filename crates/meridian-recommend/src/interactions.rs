//! Per-user interaction log and preference overrides.

use crate::error::RecommendError;
use crate::model::{Interaction, UserPreferences};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Storage for user feedback and explicit preferences.
pub trait InteractionStore: Send + Sync {
    /// Append an interaction to the user's log.
    fn record(&self, interaction: Interaction) -> Result<(), RecommendError>;
    /// Up to `limit` most recent interactions for a user, oldest first.
    fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<Interaction>, RecommendError>;
    /// Replace the user's preferences.
    fn set_preferences(&self, preferences: UserPreferences) -> Result<(), RecommendError>;
    /// Current preferences for a user, if any were set.
    fn preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, RecommendError>;
}

#[derive(Default)]
struct UserLog {
    interactions: VecDeque<Interaction>,
    preferences: Option<UserPreferences>,
}

/// In-memory store sharded per user.
///
/// The outer map lock is only held to find or insert a user's shard, so
/// writers for different users never wait on each other.
pub struct InMemoryInteractionStore {
    users: RwLock<HashMap<String, Arc<Mutex<UserLog>>>>,
    /// Interactions retained per user; older entries are dropped.
    capacity: usize,
}

impl InMemoryInteractionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of users with recorded state.
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    fn shard(&self, user_id: &str) -> Arc<Mutex<UserLog>> {
        if let Some(shard) = self.users.read().get(user_id) {
            return shard.clone();
        }
        self.users
            .write()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    fn existing_shard(&self, user_id: &str) -> Option<Arc<Mutex<UserLog>>> {
        self.users.read().get(user_id).cloned()
    }
}

impl InteractionStore for InMemoryInteractionStore {
    fn record(&self, interaction: Interaction) -> Result<(), RecommendError> {
        let shard = self.shard(&interaction.user_id);
        let mut log = shard.lock();
        log.interactions.push_back(interaction);
        while log.interactions.len() > self.capacity {
            log.interactions.pop_front();
        }
        Ok(())
    }

    fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<Interaction>, RecommendError> {
        let Some(shard) = self.existing_shard(user_id) else {
            return Ok(Vec::new());
        };
        let log = shard.lock();
        let skip = log.interactions.len().saturating_sub(limit);
        Ok(log.interactions.iter().skip(skip).cloned().collect())
    }

    fn set_preferences(&self, preferences: UserPreferences) -> Result<(), RecommendError> {
        debug!(
            "replacing user preferences (user_id={}, preferred={}, excluded={})",
            preferences.user_id,
            preferences.preferred_categories.len(),
            preferences.excluded_categories.len()
        );
        let shard = self.shard(&preferences.user_id);
        shard.lock().preferences = Some(preferences);
        Ok(())
    }

    fn preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, RecommendError> {
        Ok(self
            .existing_shard(user_id)
            .and_then(|shard| shard.lock().preferences.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryInteractionStore, InteractionStore};
    use crate::model::{Interaction, UserPreferences};
    use meridian_protocol::InteractionAction;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    fn click(user: &str, item: &str) -> Interaction {
        Interaction::new(user, InteractionAction::Click, item, Some("ops"))
    }

    #[test]
    fn recent_returns_the_tail_oldest_first() {
        let store = InMemoryInteractionStore::new(10);
        for idx in 0..4 {
            store.record(click("u1", &format!("i{idx}"))).expect("record");
        }
        let items: Vec<String> = store
            .recent("u1", 2)
            .expect("recent")
            .into_iter()
            .map(|interaction| interaction.item_id)
            .collect();
        assert_eq!(items, vec!["i2".to_string(), "i3".to_string()]);
        assert!(store.recent("nobody", 5).expect("recent").is_empty());
    }

    #[test]
    fn capacity_drops_the_oldest_entries() {
        let store = InMemoryInteractionStore::new(3);
        for idx in 0..5 {
            store.record(click("u1", &format!("i{idx}"))).expect("record");
        }
        let recent = store.recent("u1", 10).expect("recent");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].item_id, "i2");
    }

    #[test]
    fn preferences_are_last_write_wins() {
        let store = InMemoryInteractionStore::new(10);
        assert_eq!(store.preferences("u1").expect("prefs"), None);
        store
            .set_preferences(UserPreferences {
                user_id: "u1".to_string(),
                preferred_categories: vec!["sales".to_string()],
                excluded_categories: Vec::new(),
            })
            .expect("set");
        let replacement = UserPreferences {
            user_id: "u1".to_string(),
            preferred_categories: Vec::new(),
            excluded_categories: vec!["sales".to_string()],
        };
        store.set_preferences(replacement.clone()).expect("set");
        assert_eq!(store.preferences("u1").expect("prefs"), Some(replacement));
    }

    #[test]
    fn concurrent_writers_keep_every_interaction() {
        let store = Arc::new(InMemoryInteractionStore::new(1_000));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    let user = format!("u{worker}");
                    for idx in 0..50 {
                        store.record(click(&user, &format!("i{idx}"))).expect("record");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(store.user_count(), 4);
        for worker in 0..4 {
            let recent = store.recent(&format!("u{worker}"), 1_000).expect("recent");
            assert_eq!(recent.len(), 50);
        }
    }
}
