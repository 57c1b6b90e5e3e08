//! Chat sessions and the chat request pipeline for Meridian.
//!
//! [`SessionStore`] owns session state (optionally persisted through a
//! [`StateStore`]); [`ChatService`] validates, rate limits and sanitizes each
//! message before dispatching it to a [`ProviderClient`] under a
//! [`RetryPolicy`].

pub mod chat;
pub mod error;
pub mod provider;
pub mod retry;
pub mod sessions;
pub mod state;
pub mod types;

pub use chat::{ChatReply, ChatService, ChatServiceBuilder, SendMessageRequest};
pub use error::CoreError;
pub use provider::{CompletionReply, CompletionRequest, ProviderClient, ProviderError, TokenUsage};
pub use retry::{DispatchError, Dispatched, RetryPolicy};
pub use sessions::{SessionStore, SessionTurn};
pub use state::{JsonlStateStore, StateError, StateStore};
pub use types::{
    Message, Session, SessionContext, SessionMetadata, SessionStatus, SessionSummary,
    estimate_tokens, is_valid_session_id,
};
