//! Session and message types.

use chrono::{DateTime, Utc};
use meridian_protocol::{Role, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Longest accepted session id.
const MAX_SESSION_ID_LEN: usize = 128;

/// Whether `id` can name a session: non-empty, at most 128 characters of
/// `[A-Za-z0-9._-]`, not starting with a dot.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
}

/// Approximate token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Message stored in a session transcript. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    /// Sanitized message text.
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub token_count: u32,
}

impl Message {
    /// Build a message stamped with a fresh id and the current time.
    pub fn new(role: Role, content: impl Into<String>, token_count: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            token_count,
        }
    }

    /// Build a message whose token count is estimated from its content.
    pub fn estimated(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self::new(role, content, tokens)
    }
}

/// Visitor context attached to a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    /// Free-form attributes supplied by the caller.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Closed,
}

/// Aggregate usage for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub total_tokens: u64,
    pub message_count: usize,
    /// Completed provider round trips.
    pub turn_count: u64,
    pub average_response_time_ms: f64,
}

impl SessionMetadata {
    /// Fold appended messages and an optional response time into the totals.
    pub fn record(&mut self, messages: &[Message], response_time_ms: Option<u64>) {
        self.message_count += messages.len();
        self.total_tokens += messages
            .iter()
            .map(|message| u64::from(message.token_count))
            .sum::<u64>();
        if let Some(elapsed) = response_time_ms {
            let turns = self.turn_count as f64;
            self.average_response_time_ms =
                (self.average_response_time_ms * turns + elapsed as f64) / (turns + 1.0);
            self.turn_count += 1;
        }
    }
}

/// Full session transcript with messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    /// Ordered list of messages in the session.
    pub messages: Vec<Message>,
    pub context: SessionContext,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: SessionMetadata,
}

impl Session {
    /// Empty active session created now.
    pub fn new(id: SessionId, context: SessionContext) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            context,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            metadata: SessionMetadata::default(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == SessionStatus::Closed
    }

    /// The last `window` messages, oldest first.
    pub fn recent_messages(&self, window: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }
}

/// Summary view of a session for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub status: SessionStatus,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            status: session.status,
            message_count: session.messages.len(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}
