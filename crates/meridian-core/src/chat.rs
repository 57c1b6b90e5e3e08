//! Chat service: validate, rate limit, sanitize, dispatch, compose.
//!
//! Every operation answers with an [`Envelope`]. Internal errors are logged
//! and mapped to fixed user-facing messages.

use crate::error::CoreError;
use crate::provider::{CompletionRequest, ProviderClient};
use crate::retry::{DispatchError, RetryPolicy};
use crate::sessions::SessionStore;
use crate::types::{Message, Session, SessionContext, estimate_tokens, is_valid_session_id};
use chrono::Utc;
use log::{debug, info, warn};
use meridian_config::{ChatConfig, MeridianConfig, OversizeAction};
use meridian_guard::{ContentSanitizer, RateLimitPolicy, RateLimiter, rate_limit_key};
use meridian_protocol::{
    CancelToken, Envelope, ErrorBody, ErrorCode, RequestTimer, ResponseMetadata, Role, SessionId,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MSG_SESSION_REQUIRED: &str = "A session id is required.";
const MSG_SESSION_INVALID: &str = "The session id contains unsupported characters.";
const MSG_SESSION_NOT_FOUND: &str = "The requested session was not found.";
const MSG_SESSION_CLOSED: &str = "This session has been closed and no longer accepts messages.";
const MSG_EMPTY_MESSAGE: &str = "Message must not be empty.";
const MSG_FILTERED_EMPTY: &str = "Message has no content left after filtering.";
const MSG_RATE_LIMITED: &str = "Rate limit exceeded. Please try again later.";
const MSG_STORAGE_UNAVAILABLE: &str = "Session storage is temporarily unavailable.";
const MSG_LIMITER_UNAVAILABLE: &str =
    "Request limits could not be checked. Please try again later.";
const MSG_PROVIDER_UNAVAILABLE: &str =
    "The assistant is temporarily unavailable. Please try again later.";
const MSG_PROVIDER_TIMEOUT: &str = "The assistant took too long to respond. Please try again.";
const MSG_CANCELLED: &str = "The request was cancelled before the assistant replied.";
const MSG_INVALID_RESPONSE: &str = "The assistant returned a response that could not be used.";

/// Input for [`ChatService::send_message`].
#[derive(Debug, Clone, Default)]
pub struct SendMessageRequest {
    pub session_id: SessionId,
    pub message: String,
    /// Authenticated user, when known. Rate limits key on it.
    pub user_id: Option<UserId>,
    /// Per-request override of `chat.allow_fallback`.
    pub allow_fallback: Option<bool>,
    pub cancel: Option<CancelToken>,
}

impl SendMessageRequest {
    pub fn new(session_id: impl Into<SessionId>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = Some(allow);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Successful chat turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    /// The stored user message.
    pub message: Message,
    /// The stored assistant message.
    pub response: Message,
    /// Session snapshot after both messages were appended.
    pub session: Session,
}

/// Builder for [`ChatService`]. Unset collaborators are built from config.
pub struct ChatServiceBuilder {
    config: MeridianConfig,
    provider: Arc<dyn ProviderClient>,
    fallbacks: Vec<Arc<dyn ProviderClient>>,
    sessions: Option<SessionStore>,
    limiter: Option<RateLimiter>,
    sanitizer: Option<ContentSanitizer>,
}

impl ChatServiceBuilder {
    /// Add a fallback provider, tried after the primary when fallback is allowed.
    pub fn fallback(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.fallbacks.push(provider);
        self
    }

    pub fn sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn sanitizer(mut self, sanitizer: ContentSanitizer) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn build(self) -> Result<ChatService, CoreError> {
        let sessions = match self.sessions {
            Some(sessions) => sessions,
            None => SessionStore::from_config(&self.config.sessions)?,
        };
        let limiter = self.limiter.unwrap_or_else(|| {
            RateLimiter::new(RateLimitPolicy::from_config(&self.config.rate_limit))
        });
        let sanitizer = match self.sanitizer {
            Some(sanitizer) => sanitizer,
            None => ContentSanitizer::from_config(&self.config.sanitizer)?,
        };
        info!(
            "chat service ready (provider={}, fallbacks={})",
            self.provider.name(),
            self.fallbacks.len()
        );
        Ok(ChatService {
            retry: RetryPolicy::from_config(&self.config.chat),
            options: self.config.chat,
            provider: self.provider,
            fallbacks: self.fallbacks,
            sessions,
            limiter,
            sanitizer,
        })
    }
}

/// Orchestrates sessions, rate limiting, sanitization and provider dispatch.
pub struct ChatService {
    options: ChatConfig,
    retry: RetryPolicy,
    provider: Arc<dyn ProviderClient>,
    fallbacks: Vec<Arc<dyn ProviderClient>>,
    sessions: SessionStore,
    limiter: RateLimiter,
    sanitizer: ContentSanitizer,
}

impl ChatService {
    /// Start building a service around `provider`.
    pub fn builder(
        config: &MeridianConfig,
        provider: Arc<dyn ProviderClient>,
    ) -> ChatServiceBuilder {
        ChatServiceBuilder {
            config: config.clone(),
            provider,
            fallbacks: Vec::new(),
            sessions: None,
            limiter: None,
            sanitizer: None,
        }
    }

    /// Underlying session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Create a session with a generated id.
    pub fn create_session(&self, context: SessionContext) -> Envelope<Session> {
        let timer = RequestTimer::start();
        match self.sessions.create(context) {
            Ok(session) => Envelope::ok(session, timer.metadata()),
            Err(err) => Envelope::fail(core_error_body(&err), timer.metadata()),
        }
    }

    /// Fetch a session snapshot.
    pub fn get_session(&self, session_id: &str) -> Envelope<Session> {
        let timer = RequestTimer::start();
        let result = require_session_id(session_id)
            .and_then(|id| self.sessions.get(id).map_err(|err| core_error_body(&err)));
        finish(result, timer.metadata())
    }

    /// Close a session and return its final snapshot.
    pub fn close_session(&self, session_id: &str) -> Envelope<Session> {
        let timer = RequestTimer::start();
        let result = require_session_id(session_id).and_then(|id| {
            self.sessions
                .close(id)
                .and_then(|()| self.sessions.get(id))
                .map_err(|err| core_error_body(&err))
        });
        finish(result, timer.metadata())
    }

    /// Close every session idle past the configured TTL and forget rate
    /// limit keys with no requests left in their window.
    pub fn sweep_expired_sessions(&self) -> Envelope<Vec<SessionId>> {
        let timer = RequestTimer::start();
        let now = Utc::now();
        if let Err(err) = self.limiter.sweep_at(now) {
            warn!("rate limit sweep failed (error={})", err);
        }
        let result = self
            .sessions
            .expire_idle(now)
            .map_err(|err| core_error_body(&err));
        finish(result, timer.metadata())
    }

    /// Run one chat turn.
    pub async fn send_message(&self, request: SendMessageRequest) -> Envelope<ChatReply> {
        let timer = RequestTimer::start();
        let mut metadata = timer.metadata();
        let result = self.run_turn(request, &mut metadata).await;
        metadata.processing_time_ms = timer.elapsed_ms();
        finish(result, metadata)
    }

    async fn run_turn(
        &self,
        request: SendMessageRequest,
        metadata: &mut ResponseMetadata,
    ) -> Result<ChatReply, ErrorBody> {
        // Validating
        let session_id = require_session_id(&request.session_id)?;
        let text = self.validate_message(&request.message)?;
        let exists = self.check_session(session_id)?;

        // RateLimiting
        let key = rate_limit_key(request.user_id.as_deref(), session_id);
        let decision = self.limiter.check(&key).map_err(|err| {
            warn!("rate limit check failed (key={}, error={})", key, err);
            ErrorBody::new(ErrorCode::ServiceUnavailable, MSG_LIMITER_UNAVAILABLE)
        })?;
        if !decision.allowed {
            return Err(
                ErrorBody::new(ErrorCode::RateLimit, MSG_RATE_LIMITED).with_reset(decision.reset_at)
            );
        }

        // Sanitizing
        let inbound = self.sanitizer.sanitize(&text);
        metadata.content_filtered = Some(inbound.flagged);
        if inbound.cleaned.trim().is_empty() {
            return Err(ErrorBody::new(ErrorCode::Validation, MSG_FILTERED_EMPTY));
        }
        if !exists {
            self.create_missing_session(session_id)?;
        }

        // Dispatching: the turn lock is held until the reply is stored.
        let _turn = self
            .sessions
            .turn(session_id)
            .await
            .map_err(|err| core_error_body(&err))?;
        let session = self
            .sessions
            .get(session_id)
            .map_err(|err| core_error_body(&err))?;
        if session.is_closed() {
            return Err(ErrorBody::new(ErrorCode::Validation, MSG_SESSION_CLOSED));
        }
        let completion = CompletionRequest {
            session_id: session.id.clone(),
            context: session.context.clone(),
            history: session
                .recent_messages(self.options.history_window)
                .to_vec(),
            message: inbound.cleaned.clone(),
        };
        let allow_fallback = request
            .allow_fallback
            .unwrap_or(self.options.allow_fallback);
        let mut providers = vec![self.provider.clone()];
        if allow_fallback {
            providers.extend(self.fallbacks.iter().cloned());
        }
        let cancel = request.cancel.unwrap_or_default();
        let started = tokio::time::Instant::now();
        let dispatched = self
            .retry
            .dispatch(&providers, &completion, &cancel)
            .await
            .map_err(|err| dispatch_error_body(session_id, err))?;
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if dispatched.fallback_used {
            metadata.fallback_used = Some(true);
            metadata.original_provider = Some(self.provider.name().to_string());
            metadata.actual_provider = Some(dispatched.provider.clone());
        }

        // Composing
        let outbound = self.sanitizer.sanitize(&dispatched.reply.content);
        if outbound.cleaned.trim().is_empty() {
            warn!(
                "provider returned empty reply (session_id={}, provider={})",
                session_id, dispatched.provider
            );
            return Err(ErrorBody::new(ErrorCode::InvalidResponse, MSG_INVALID_RESPONSE));
        }
        if outbound.flagged {
            debug!("provider reply filtered (session_id={})", session_id);
            metadata.content_filtered = Some(true);
        }

        let user_message = Message::estimated(Role::User, inbound.cleaned);
        let assistant_tokens = dispatched
            .reply
            .usage
            .map(|usage| usage.completion_tokens)
            .unwrap_or_else(|| estimate_tokens(&outbound.cleaned));
        let assistant_message = Message::new(Role::Assistant, outbound.cleaned, assistant_tokens);
        metadata.tokens_used = Some(
            dispatched
                .reply
                .usage
                .map(|usage| usage.total())
                .unwrap_or_else(|| {
                    user_message
                        .token_count
                        .saturating_add(assistant_message.token_count)
                }),
        );

        let session = self
            .sessions
            .append_messages(
                session_id,
                vec![user_message.clone(), assistant_message.clone()],
                Some(response_time_ms),
            )
            .map_err(|err| core_error_body(&err))?;
        info!(
            "chat turn completed (session_id={}, provider={}, attempts={}, response_ms={})",
            session_id, dispatched.provider, dispatched.attempts, response_time_ms
        );
        Ok(ChatReply {
            message: user_message,
            response: assistant_message,
            session,
        })
    }

    /// Reject empty messages and apply the oversize policy.
    fn validate_message(&self, message: &str) -> Result<String, ErrorBody> {
        if message.trim().is_empty() {
            return Err(ErrorBody::new(ErrorCode::Validation, MSG_EMPTY_MESSAGE));
        }
        let limit = self.options.max_message_chars;
        if message.chars().count() <= limit {
            return Ok(message.to_string());
        }
        match self.options.oversize_action {
            OversizeAction::Reject => Err(ErrorBody::new(
                ErrorCode::Validation,
                format!("Message exceeds the maximum length of {limit} characters."),
            )),
            OversizeAction::Truncate => {
                debug!("truncating oversized message (limit={})", limit);
                Ok(message.chars().take(limit).collect())
            }
        }
    }

    /// Read-only session check. Returns false for an unknown id that may be
    /// auto-created once the request is admitted.
    fn check_session(&self, session_id: &str) -> Result<bool, ErrorBody> {
        match self.sessions.get(session_id) {
            Ok(session) if session.is_closed() => {
                Err(ErrorBody::new(ErrorCode::Validation, MSG_SESSION_CLOSED))
            }
            Ok(_) => Ok(true),
            Err(CoreError::UnknownSession(_)) if self.options.auto_create_sessions => Ok(false),
            Err(err) => Err(core_error_body(&err)),
        }
    }

    fn create_missing_session(&self, session_id: &str) -> Result<(), ErrorBody> {
        match self
            .sessions
            .create_with_id(session_id, SessionContext::default())
        {
            Ok(_) => {
                debug!("session auto-created (session_id={})", session_id);
                Ok(())
            }
            // Another turn created it first; the closed check runs under the turn lock.
            Err(CoreError::SessionExists(_)) => Ok(()),
            Err(err) => Err(core_error_body(&err)),
        }
    }
}

fn require_session_id(session_id: &str) -> Result<&str, ErrorBody> {
    if session_id.trim().is_empty() {
        return Err(ErrorBody::new(ErrorCode::Validation, MSG_SESSION_REQUIRED));
    }
    if !is_valid_session_id(session_id) {
        return Err(ErrorBody::new(ErrorCode::Validation, MSG_SESSION_INVALID));
    }
    Ok(session_id)
}

fn finish<T>(result: Result<T, ErrorBody>, metadata: ResponseMetadata) -> Envelope<T> {
    match result {
        Ok(data) => Envelope::ok(data, metadata),
        Err(error) => Envelope::fail(error, metadata),
    }
}

/// Map internal errors to user-facing error bodies.
fn core_error_body(err: &CoreError) -> ErrorBody {
    match err {
        CoreError::UnknownSession(_) => ErrorBody::new(ErrorCode::NotFound, MSG_SESSION_NOT_FOUND),
        CoreError::SessionClosed(_) => ErrorBody::new(ErrorCode::Validation, MSG_SESSION_CLOSED),
        CoreError::InvalidSessionId(_) => {
            ErrorBody::new(ErrorCode::Validation, MSG_SESSION_INVALID)
        }
        other => {
            warn!("session operation failed (error={})", other);
            ErrorBody::new(ErrorCode::ServiceUnavailable, MSG_STORAGE_UNAVAILABLE)
        }
    }
}

fn dispatch_error_body(session_id: &str, err: DispatchError) -> ErrorBody {
    warn!("chat dispatch failed (session_id={}, error={})", session_id, err);
    match err {
        DispatchError::Unavailable => {
            ErrorBody::new(ErrorCode::ServiceUnavailable, MSG_PROVIDER_UNAVAILABLE)
        }
        DispatchError::TimedOut => ErrorBody::new(ErrorCode::Timeout, MSG_PROVIDER_TIMEOUT),
        DispatchError::Cancelled => ErrorBody::new(ErrorCode::Timeout, MSG_CANCELLED),
        DispatchError::InvalidResponse => {
            ErrorBody::new(ErrorCode::InvalidResponse, MSG_INVALID_RESPONSE)
        }
    }
}
