//! Response envelope returned by every service operation.

use crate::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Structured error returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    /// Error kind.
    pub code: ErrorCode,
    /// User-visible message. Never carries internal details.
    pub message: String,
    /// Earliest time a rate-limited caller should retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<DateTime<Utc>>,
}

impl ErrorBody {
    /// Build an error without a reset hint.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            reset: None,
        }
    }

    /// Attach a reset hint.
    pub fn with_reset(mut self, reset: DateTime<Utc>) -> Self {
        self.reset = Some(reset);
        self
    }
}

/// Request metadata attached to every envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Wall time spent handling the request, in milliseconds.
    #[serde(rename = "processingTime")]
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_filtered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_provider: Option<String>,
}

/// Tracks request identity and elapsed time from the start of handling.
#[derive(Debug, Clone)]
pub struct RequestTimer {
    request_id: Uuid,
    timestamp: DateTime<Utc>,
    started: Instant,
}

impl RequestTimer {
    /// Start timing a new request.
    pub fn start() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Identifier assigned to this request.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Milliseconds elapsed since the request started.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Snapshot metadata for the response being assembled.
    pub fn metadata(&self) -> ResponseMetadata {
        ResponseMetadata {
            request_id: self.request_id,
            timestamp: self.timestamp,
            processing_time_ms: self.elapsed_ms(),
            ..ResponseMetadata::default()
        }
    }
}

/// Logical response envelope: `{ success, data?, error?, metadata }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
}

impl<T> Envelope<T> {
    /// Successful envelope carrying `data`.
    pub fn ok(data: T, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    /// Failed envelope carrying `error`.
    pub fn fail(error: ErrorBody, metadata: ResponseMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata,
        }
    }

    /// Error code of a failed envelope.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|error| error.code)
    }

    /// Convert into a `Result`, dropping the metadata.
    pub fn into_result(self) -> Result<T, ErrorBody> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(ErrorBody::new(
                ErrorCode::InvalidResponse,
                "The response did not contain any data.",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn envelope_serializes_camel_case_metadata() {
        let timer = RequestTimer::start();
        let mut metadata = timer.metadata();
        metadata.content_filtered = Some(true);
        let envelope = Envelope::ok(json!({ "answer": 42 }), metadata);

        let value = serde_json::to_value(&envelope).expect("encode");
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["metadata"]["contentFiltered"], json!(true));
        assert!(value["metadata"].get("processingTime").is_some());
        assert!(value["metadata"].get("fallbackUsed").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failed_envelope_exposes_error_code() {
        let envelope: Envelope<()> = Envelope::fail(
            ErrorBody::new(ErrorCode::Validation, "Message must not be empty."),
            RequestTimer::start().metadata(),
        );
        assert_eq!(envelope.error_code(), Some(ErrorCode::Validation));
        let err = envelope.into_result().unwrap_err();
        assert_eq!(err.message, "Message must not be empty.");
    }
}
