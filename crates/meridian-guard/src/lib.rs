//! Request guards shared by every Meridian service: content sanitization and
//! per-key rate limiting.

mod error;
pub mod rate_limit;
pub mod sanitizer;

pub use error::GuardError;
pub use rate_limit::{
    InMemoryRateLimitStore, RateLimitDecision, RateLimitPolicy, RateLimitStore, RateLimiter,
    rate_limit_key,
};
pub use sanitizer::{
    ContentSanitizer, RuleAction, RuleCategory, SanitizeFinding, SanitizeOutcome, SanitizeRule,
    SanitizerPolicy,
};
