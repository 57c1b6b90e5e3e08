//! Sliding-window rate limiting keyed by user or session.

use crate::GuardError;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use meridian_config::RateLimitConfig;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Limit and window applied to every key.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitPolicy {
    /// When false every check is admitted and nothing is recorded.
    pub enabled: bool,
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

impl RateLimitPolicy {
    /// Build a policy from the rate limit config section.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_requests: config.max_requests,
            window: i64::try_from(config.window_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
        }
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this check.
    pub remaining: u32,
    pub limit: u32,
    /// When the oldest recorded request leaves the window.
    pub reset_at: DateTime<Utc>,
}

/// Storage for per-key request timestamps.
///
/// Implementations must make prune, count and record atomic for a key so
/// concurrent checks never admit more than `policy.max_requests`.
pub trait RateLimitStore: Send + Sync {
    /// Prune expired timestamps, then record `now` if the key is under its limit.
    fn check_and_record(
        &self,
        key: &str,
        now: DateTime<Utc>,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, GuardError>;
    /// Forget every timestamp recorded for `key`.
    fn reset(&self, key: &str) -> Result<(), GuardError>;
    /// Drop keys whose timestamps have all left the window. Returns how many
    /// keys were removed.
    fn sweep(&self, now: DateTime<Utc>, policy: &RateLimitPolicy) -> Result<usize, GuardError>;
}

type Window = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

/// In-process store with one lock per key.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    windows: RwLock<HashMap<String, Window>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked.
    pub fn key_count(&self) -> usize {
        self.windows.read().len()
    }

    fn window(&self, key: &str) -> Window {
        if let Some(window) = self.windows.read().get(key) {
            return window.clone();
        }
        self.windows
            .write()
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn check_and_record(
        &self,
        key: &str,
        now: DateTime<Utc>,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, GuardError> {
        let window = self.window(key);
        let mut timestamps = window.lock();
        if let Some(cutoff) = now.checked_sub_signed(policy.window) {
            while timestamps.front().is_some_and(|ts| *ts <= cutoff) {
                timestamps.pop_front();
            }
        }

        let used = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        let allowed = used < policy.max_requests;
        if allowed {
            // Callers may read the clock before taking the key lock; keep the
            // window ordered so front pruning stays correct.
            let at = timestamps.partition_point(|ts| *ts <= now);
            timestamps.insert(at, now);
        }
        let used = if allowed { used + 1 } else { used };
        let oldest = timestamps.front().copied().unwrap_or(now);
        Ok(RateLimitDecision {
            allowed,
            remaining: policy.max_requests.saturating_sub(used),
            limit: policy.max_requests,
            reset_at: oldest
                .checked_add_signed(policy.window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }

    fn reset(&self, key: &str) -> Result<(), GuardError> {
        self.windows.write().remove(key);
        Ok(())
    }

    fn sweep(&self, now: DateTime<Utc>, policy: &RateLimitPolicy) -> Result<usize, GuardError> {
        let Some(cutoff) = now.checked_sub_signed(policy.window) else {
            return Ok(0);
        };
        let mut windows = self.windows.write();
        let before = windows.len();
        // A window held outside the map belongs to an in-flight check.
        windows.retain(|_, window| {
            Arc::strong_count(window) > 1 || window.lock().back().is_some_and(|ts| *ts > cutoff)
        });
        Ok(before - windows.len())
    }
}

/// Applies a [`RateLimitPolicy`] over an injected store.
#[derive(Clone)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    store: Arc<dyn RateLimitStore>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Limiter backed by an in-memory store.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_store(policy, Arc::new(InMemoryRateLimitStore::new()))
    }

    /// Limiter backed by the provided store.
    pub fn with_store(policy: RateLimitPolicy, store: Arc<dyn RateLimitStore>) -> Self {
        info!(
            "rate limiter ready (enabled={}, max_requests={}, window_secs={})",
            policy.enabled,
            policy.max_requests,
            policy.window.num_seconds()
        );
        Self { policy, store }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Check `key` against the current time.
    pub fn check(&self, key: &str) -> Result<RateLimitDecision, GuardError> {
        self.check_at(key, Utc::now())
    }

    /// Check `key` as if the request arrived at `now`.
    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> Result<RateLimitDecision, GuardError> {
        if !self.policy.enabled {
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: self.policy.max_requests,
                limit: self.policy.max_requests,
                reset_at: now,
            });
        }
        let decision = self.store.check_and_record(key, now, &self.policy)?;
        if decision.allowed {
            debug!(
                "rate limit admitted (key={}, remaining={})",
                key, decision.remaining
            );
        } else {
            info!(
                "rate limit exceeded (key={}, limit={}, reset_at={})",
                key, decision.limit, decision.reset_at
            );
        }
        Ok(decision)
    }

    /// Forget keys with no requests left in the window.
    pub fn sweep(&self) -> Result<usize, GuardError> {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, GuardError> {
        let removed = self.store.sweep(now, &self.policy)?;
        if removed > 0 {
            debug!("rate limit keys swept (removed={})", removed);
        }
        Ok(removed)
    }

    /// Clear all history for `key`.
    pub fn reset(&self, key: &str) -> Result<(), GuardError> {
        debug!("rate limit reset (key={})", key);
        self.store.reset(key)
    }
}

/// Rate limit key: the user when known, otherwise the session.
pub fn rate_limit_key(user_id: Option<&str>, session_id: &str) -> String {
    match user_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(user_id) => format!("user:{user_id}"),
        None => format!("session:{session_id}"),
    }
}
