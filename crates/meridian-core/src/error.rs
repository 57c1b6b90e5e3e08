//! Error types for the core crate.

use crate::state::StateError;
use meridian_guard::GuardError;
use meridian_protocol::SessionId;
use thiserror::Error;

/// Errors returned by session and chat operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Session id is unknown to the store.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    /// Session exists but no longer accepts messages.
    #[error("session closed: {0}")]
    SessionClosed(SessionId),
    /// A session with this id already exists.
    #[error("session already exists: {0}")]
    SessionExists(SessionId),
    /// Session id is empty or contains unsupported characters.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),
    /// State store error.
    #[error("state error: {0}")]
    State(#[from] StateError),
    /// Guard construction or store error.
    #[error("guard error: {0}")]
    Guard(#[from] GuardError),
    /// Persistence was requested but no location could be resolved.
    #[error("session path unavailable: {0}")]
    SessionPath(String),
}
