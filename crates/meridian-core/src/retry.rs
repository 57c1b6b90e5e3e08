//! Bounded retry with exponential backoff for provider calls.
//!
//! Transient failures and per-attempt timeouts are retried; malformed
//! responses are not. When fallback providers are supplied they are tried in
//! order, each with a fresh attempt budget, after the primary is exhausted.

use crate::provider::{CompletionReply, CompletionRequest, ProviderClient, ProviderError};
use log::{debug, warn};
use meridian_config::ChatConfig;
use meridian_protocol::CancelToken;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Retry configuration for provider dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per provider (including the initial one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between retries (backoff is capped here).
    pub max_delay: Duration,
    /// Deadline for a single provider call.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy from the chat config section.
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            attempt_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Delay before `attempt` (1-based): zero for the first attempt, then
    /// `base_delay * 2^(attempt - 2)` capped at `max_delay`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(attempt - 2).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `request` against `providers` in order until one succeeds.
    pub async fn dispatch(
        &self,
        providers: &[Arc<dyn ProviderClient>],
        request: &CompletionRequest,
        cancel: &CancelToken,
    ) -> Result<Dispatched, DispatchError> {
        let mut last_error = DispatchError::Unavailable;
        for (index, provider) in providers.iter().enumerate() {
            match self.run_provider(provider.as_ref(), request, cancel).await {
                Ok((reply, attempts)) => {
                    return Ok(Dispatched {
                        reply,
                        provider: provider.name().to_string(),
                        attempts,
                        fallback_used: index > 0,
                    });
                }
                Err(err @ (DispatchError::Cancelled | DispatchError::InvalidResponse)) => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        "provider exhausted (provider={}, error={})",
                        provider.name(),
                        err
                    );
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    async fn run_provider(
        &self,
        provider: &dyn ProviderClient,
        request: &CompletionRequest,
        cancel: &CancelToken,
    ) -> Result<(CompletionReply, u32), DispatchError> {
        let mut last_error = DispatchError::Unavailable;
        for attempt in 1..=self.max_attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                debug!(
                    "provider retry backoff (provider={}, attempt={}, delay_ms={})",
                    provider.name(),
                    attempt,
                    delay.as_millis()
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
                outcome = tokio::time::timeout(self.attempt_timeout, provider.complete(request)) => outcome,
            };
            match outcome {
                Ok(Ok(reply)) => return Ok((reply, attempt)),
                Ok(Err(err)) if !err.is_retryable() => {
                    warn!(
                        "provider returned invalid response (provider={}, attempt={}, error={})",
                        provider.name(),
                        attempt,
                        err
                    );
                    return Err(DispatchError::InvalidResponse);
                }
                Ok(Err(err)) => {
                    warn!(
                        "provider attempt failed (provider={}, attempt={}, error={})",
                        provider.name(),
                        attempt,
                        err
                    );
                    last_error = match err {
                        ProviderError::Timeout(_) => DispatchError::TimedOut,
                        _ => DispatchError::Unavailable,
                    };
                }
                Err(_) => {
                    warn!(
                        "provider attempt timed out (provider={}, attempt={}, timeout_ms={})",
                        provider.name(),
                        attempt,
                        self.attempt_timeout.as_millis()
                    );
                    last_error = DispatchError::TimedOut;
                }
            }
        }
        Err(last_error)
    }
}

/// Successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub reply: CompletionReply,
    /// Name of the provider that answered.
    pub provider: String,
    /// Attempts spent on the answering provider.
    pub attempts: u32,
    pub fallback_used: bool,
}

/// Terminal dispatch failure.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Every attempt failed; the last one with a transient error.
    #[error("providers unavailable")]
    Unavailable,
    /// Every attempt failed; the last one exceeded its deadline.
    #[error("provider deadline exceeded")]
    TimedOut,
    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
    /// A provider returned a malformed payload.
    #[error("invalid provider response")]
    InvalidResponse,
}

#[cfg(test)]
mod tests {
    use super::RetryPolicy;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn backoff_doubles_from_the_base_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(250),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(250));
        assert_eq!(policy.delay_before(40), Duration::from_millis(250));
    }
}
