//! Configuration schema for Meridian.

use serde::{Deserialize, Serialize};

/// Root config for the Meridian service layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MeridianConfig {
    #[serde(default, rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub recommendations: RecommendationsConfig,
    #[serde(default)]
    pub vector: VectorConfig,
}

impl MeridianConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> MeridianConfigBuilder {
        MeridianConfigBuilder::new()
    }
}

/// Builder for assembling a `MeridianConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct MeridianConfigBuilder {
    config: MeridianConfig,
}

impl MeridianConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: MeridianConfig::default(),
        }
    }

    /// Replace the chat configuration.
    pub fn chat(mut self, chat: ChatConfig) -> Self {
        self.config.chat = chat;
        self
    }

    /// Replace the rate limit configuration.
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Replace the sanitizer configuration.
    pub fn sanitizer(mut self, sanitizer: SanitizerConfig) -> Self {
        self.config.sanitizer = sanitizer;
        self
    }

    /// Replace the session configuration.
    pub fn sessions(mut self, sessions: SessionsConfig) -> Self {
        self.config.sessions = sessions;
        self
    }

    /// Replace the recommendation configuration.
    pub fn recommendations(mut self, recommendations: RecommendationsConfig) -> Self {
        self.config.recommendations = recommendations;
        self
    }

    /// Replace the vector store configuration.
    pub fn vector(mut self, vector: VectorConfig) -> Self {
        self.config.vector = vector;
        self
    }

    /// Finalize and return the built `MeridianConfig`.
    pub fn build(self) -> MeridianConfig {
        self.config
    }
}

/// How a message longer than `max_message_chars` is treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OversizeAction {
    /// Fail the request with a validation error.
    #[default]
    Reject,
    /// Keep the leading `max_message_chars` characters.
    Truncate,
}

/// Chat pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub allow_fallback: bool,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default)]
    pub oversize_action: OversizeAction,
    #[serde(default = "default_true")]
    pub auto_create_sessions: bool,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            allow_fallback: false,
            max_message_chars: default_max_message_chars(),
            oversize_action: OversizeAction::default(),
            auto_create_sessions: true,
            history_window: default_history_window(),
        }
    }
}

/// Per-attempt provider deadline.
fn default_request_timeout_ms() -> u64 {
    2_000
}

/// One initial attempt plus two retries.
fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_max_message_chars() -> usize {
    4_000
}

/// Number of prior messages forwarded to the provider.
fn default_history_window() -> usize {
    20
}

fn default_true() -> bool {
    true
}

/// Sliding window rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> u32 {
    20
}

fn default_window_secs() -> u64 {
    60 * 60
}

/// Action applied to a sanitizer rule category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleActionConfig {
    Redact,
    Strip,
    Flag,
}

/// Content sanitizer configuration.
///
/// Markup, SQL and command injection are always redacted; the remaining
/// categories follow the caller policy set here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SanitizerConfig {
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_flag")]
    pub dynamic_execution: RuleActionConfig,
    #[serde(default = "default_flag")]
    pub pii: RuleActionConfig,
    #[serde(default = "default_flag")]
    pub encoded: RuleActionConfig,
    #[serde(default = "default_strip")]
    pub control_characters: RuleActionConfig,
    #[serde(default)]
    pub redact_patterns: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            dynamic_execution: default_flag(),
            pii: default_flag(),
            encoded: default_flag(),
            control_characters: default_strip(),
            redact_patterns: Vec::new(),
        }
    }
}

/// Default replacement marker for redacted content.
fn default_marker() -> String {
    "[FILTERED]".to_string()
}

fn default_flag() -> RuleActionConfig {
    RuleActionConfig::Flag
}

fn default_strip() -> RuleActionConfig {
    RuleActionConfig::Strip
}

/// Session lifetime and persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionsConfig {
    /// Idle time after which a session is closed. `None` disables expiry.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: Option<u64>,
    /// Persist sessions as JSONL rollouts.
    #[serde(default)]
    pub persist: bool,
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            persist: false,
            path: None,
        }
    }
}

fn default_ttl_secs() -> Option<u64> {
    Some(24 * 60 * 60)
}

/// Confidence deltas applied per interaction action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionWeights {
    #[serde(default = "default_click_weight")]
    pub click: f64,
    #[serde(default = "default_like_weight")]
    pub like: f64,
    #[serde(default = "default_dislike_weight")]
    pub dislike: f64,
    #[serde(default = "default_dismiss_weight")]
    pub dismiss: f64,
}

impl Default for InteractionWeights {
    fn default() -> Self {
        Self {
            click: default_click_weight(),
            like: default_like_weight(),
            dislike: default_dislike_weight(),
            dismiss: default_dismiss_weight(),
        }
    }
}

fn default_click_weight() -> f64 {
    0.05
}

fn default_like_weight() -> f64 {
    0.10
}

fn default_dislike_weight() -> f64 {
    -0.15
}

fn default_dismiss_weight() -> f64 {
    -0.20
}

/// Recommendation scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationsConfig {
    #[serde(default = "default_recommendations")]
    pub default_max_recommendations: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Bound on the total interaction adjustment, in either direction.
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_preference_boost")]
    pub preference_boost: f64,
    #[serde(default = "default_same_item_multiplier")]
    pub same_item_multiplier: f64,
    #[serde(default)]
    pub weights: InteractionWeights,
}

impl Default for RecommendationsConfig {
    fn default() -> Self {
        Self {
            default_max_recommendations: default_recommendations(),
            max_limit: default_max_limit(),
            max_delta: default_max_delta(),
            history_limit: default_history_limit(),
            preference_boost: default_preference_boost(),
            same_item_multiplier: default_same_item_multiplier(),
            weights: InteractionWeights::default(),
        }
    }
}

fn default_recommendations() -> usize {
    5
}

fn default_max_limit() -> usize {
    20
}

fn default_max_delta() -> f64 {
    0.3
}

fn default_history_limit() -> usize {
    200
}

fn default_preference_boost() -> f64 {
    0.1
}

fn default_same_item_multiplier() -> f64 {
    2.0
}

/// Vector search configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorConfig {
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
    /// Fixed embedding dimension. When unset the first document decides.
    #[serde(default)]
    pub dimension: Option<usize>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
            default_max_results: default_max_results(),
            embed_timeout_ms: default_embed_timeout_ms(),
            dimension: None,
        }
    }
}

fn default_max_query_chars() -> usize {
    1_000
}

fn default_max_results() -> usize {
    10
}

fn default_embed_timeout_ms() -> u64 {
    2_000
}
