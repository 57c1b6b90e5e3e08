//! Wire types shared by the Meridian service layer.
//!
//! Every public operation answers with an [`Envelope`]: a success flag, an
//! optional payload, an optional [`ErrorBody`] and request metadata.

mod envelope;

/// Cloneable, sticky cancellation handle for in-flight upstream calls.
pub use tokio_util::sync::CancellationToken as CancelToken;
pub use envelope::{Envelope, ErrorBody, RequestTimer, ResponseMetadata};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque session identifier supplied by callers.
pub type SessionId = String;
/// Opaque user identifier supplied by the external identity layer.
pub type UserId = String;

/// Error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad or missing input. Never retried.
    Validation,
    /// Quota exceeded. The caller must back off until the reset hint.
    RateLimit,
    /// Unknown identifier.
    NotFound,
    /// Upstream provider failed after bounded retries.
    ServiceUnavailable,
    /// Upstream call exceeded its deadline or was cancelled.
    Timeout,
    /// Upstream returned a malformed payload.
    InvalidResponse,
}

impl ErrorCode {
    /// Return the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InvalidResponse => "INVALID_RESPONSE",
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ServiceUnavailable | ErrorCode::Timeout | ErrorCode::RateLimit
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to parse a closed enum from its wire string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message written by the site visitor.
    User,
    /// Message produced by the provider.
    Assistant,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// User feedback recorded against a recommended item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InteractionAction {
    Click,
    Like,
    Dislike,
    Dismiss,
}

impl InteractionAction {
    /// Return the action as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionAction::Click => "click",
            InteractionAction::Like => "like",
            InteractionAction::Dislike => "dislike",
            InteractionAction::Dismiss => "dismiss",
        }
    }

    /// Positive actions raise confidence for similar items.
    pub fn is_positive(&self) -> bool {
        matches!(self, InteractionAction::Click | InteractionAction::Like)
    }
}

impl FromStr for InteractionAction {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "click" => Ok(InteractionAction::Click),
            "like" => Ok(InteractionAction::Like),
            "dislike" => Ok(InteractionAction::Dislike),
            "dismiss" => Ok(InteractionAction::Dismiss),
            other => Err(ParseEnumError {
                kind: "interaction action",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn error_code_uses_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorCode::ServiceUnavailable).expect("encode"),
            json!("SERVICE_UNAVAILABLE")
        );
        assert_eq!(ErrorCode::RateLimit.to_string(), "RATE_LIMIT");
        assert!(!ErrorCode::Validation.is_retryable());
    }

    #[test]
    fn closed_enums_reject_unknown_values() {
        assert_eq!("assistant".parse::<Role>(), Ok(Role::Assistant));
        assert!("system".parse::<Role>().is_err());
        assert_eq!(
            "dismiss".parse::<InteractionAction>(),
            Ok(InteractionAction::Dismiss)
        );
        let err = "share".parse::<InteractionAction>().unwrap_err();
        assert_eq!(err.to_string(), "unknown interaction action: share");
    }

    #[test]
    fn role_decodes_from_lowercase_json() {
        let role: Role = serde_json::from_value(json!("user")).expect("decode");
        assert_eq!(role, Role::User);
        assert!(serde_json::from_value::<Role>(json!("tool")).is_err());
    }
}
