//! Upstream completion provider abstraction.

use crate::types::{Message, SessionContext};
use async_trait::async_trait;
use meridian_protocol::SessionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prompt sent to a provider for one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub session_id: SessionId,
    pub context: SessionContext,
    /// Prior messages, oldest first.
    pub history: Vec<Message>,
    /// Sanitized user message.
    pub message: String,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Assistant reply returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionReply {
    pub content: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl CompletionReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Failure reported by a provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Transient upstream failure (network, 5xx, overload).
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// The provider gave up waiting on its own upstream.
    #[error("provider timed out: {0}")]
    Timeout(String),
    /// The provider answered with a payload that cannot be used.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Malformed responses are never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::InvalidResponse(_))
    }
}

/// LLM completion capability. Implementations wrap a concrete vendor SDK.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Short provider name recorded in response metadata.
    fn name(&self) -> &str;
    /// Produce an assistant reply for the request.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionReply, ProviderError>;
}
