//! Session persistence using JSONL rollouts.

use crate::types::{
    Message, Session, SessionContext, SessionMetadata, SessionStatus, SessionSummary,
    is_valid_session_id,
};
use chrono::{DateTime, Utc};
use log::{debug, info};
use meridian_protocol::SessionId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current rollout format version.
const SCHEMA_VERSION: u32 = 1;

/// Persistent store abstraction for sessions and messages.
pub trait StateStore: Send + Sync {
    /// Record a new session creation.
    fn record_session(&self, session: &Session) -> Result<(), StateError>;
    /// Append messages to a session as one unit.
    fn append_messages(
        &self,
        session_id: &str,
        messages: &[Message],
        response_time_ms: Option<u64>,
    ) -> Result<(), StateError>;
    /// Mark a session closed.
    fn close_session(&self, session_id: &str, closed_at: DateTime<Utc>) -> Result<(), StateError>;
    /// Load a session by id.
    fn load_session(&self, session_id: &str) -> Result<Option<Session>, StateError>;
    /// List all session summaries, most recently updated first.
    fn list_sessions(&self) -> Result<Vec<SessionSummary>, StateError>;
}

/// Errors returned by the state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("missing session metadata")]
    MissingMetadata,
    #[error("session already exists: {0}")]
    SessionExists(SessionId),
    #[error("invalid session id: {0:?}")]
    InvalidId(String),
}

/// Internal JSONL event representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RolloutEvent {
    SchemaVersion {
        version: u32,
    },
    SessionCreated {
        session_id: SessionId,
        context: SessionContext,
        created_at: DateTime<Utc>,
    },
    Message {
        session_id: SessionId,
        message: Message,
        /// Provider round trip that produced this message, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_time_ms: Option<u64>,
    },
    SessionClosed {
        session_id: SessionId,
        closed_at: DateTime<Utc>,
    },
}

#[derive(Default)]
struct RolloutState {
    version: Option<u32>,
    context: Option<SessionContext>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    status: SessionStatus,
    messages: Vec<Message>,
    metadata: SessionMetadata,
}

impl RolloutState {
    fn apply(&mut self, event: RolloutEvent) -> Result<(), StateError> {
        match event {
            RolloutEvent::SchemaVersion { version } => {
                self.version = Some(version);
                if version > SCHEMA_VERSION {
                    return Err(StateError::UnsupportedSchema(version));
                }
            }
            RolloutEvent::SessionCreated {
                context,
                created_at,
                ..
            } => {
                self.context = Some(context);
                self.created_at = Some(created_at);
                self.updated_at = Some(created_at);
            }
            RolloutEvent::Message {
                message,
                response_time_ms,
                ..
            } => {
                self.metadata
                    .record(std::slice::from_ref(&message), response_time_ms);
                self.touch(message.created_at);
                self.messages.push(message);
            }
            RolloutEvent::SessionClosed { closed_at, .. } => {
                self.status = SessionStatus::Closed;
                self.touch(closed_at);
            }
        }
        Ok(())
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        if self.updated_at.is_none_or(|current| current < at) {
            self.updated_at = Some(at);
        }
    }

    fn finish(self, session_id: &str) -> Result<Session, StateError> {
        let _ = self.version.ok_or(StateError::MissingMetadata)?;
        let context = self.context.ok_or(StateError::MissingMetadata)?;
        let created_at = self.created_at.ok_or(StateError::MissingMetadata)?;
        Ok(Session {
            id: session_id.to_string(),
            messages: self.messages,
            context,
            status: self.status,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            metadata: self.metadata,
        })
    }
}

/// JSONL-backed state store implementation.
pub struct JsonlStateStore {
    /// Root directory for session rollouts.
    root: PathBuf,
    /// Serialize write access to rollout files.
    write_lock: Mutex<()>,
}

impl JsonlStateStore {
    /// Create a new JSONL store under the given root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StateError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized JSONL state store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Build the rollout file path for a session.
    fn rollout_path(&self, session_id: &str) -> Result<PathBuf, StateError> {
        if !is_valid_session_id(session_id) {
            return Err(StateError::InvalidId(session_id.to_string()));
        }
        Ok(self.root.join(format!("{session_id}.jsonl")))
    }

    /// Append events to an existing rollout file in a single write.
    fn write_events(&self, session_id: &str, events: &[RolloutEvent]) -> Result<(), StateError> {
        let mut buffer = String::new();
        for event in events {
            buffer.push_str(&serde_json::to_string(event)?);
            buffer.push('\n');
        }
        let path = self.rollout_path(session_id)?;
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(buffer.as_bytes())?;
        Ok(())
    }

    /// Create a new rollout file and write the initial event.
    fn write_new_rollout(&self, session_id: &str, event: &RolloutEvent) -> Result<(), StateError> {
        let path = self.rollout_path(session_id)?;
        let _guard = self.write_lock.lock();
        if path.exists() {
            return Err(StateError::SessionExists(session_id.to_string()));
        }
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        let header = serde_json::to_string(&RolloutEvent::SchemaVersion {
            version: SCHEMA_VERSION,
        })?;
        writeln!(file, "{header}")?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read and reconstruct a session from its rollout file.
    fn read_rollout(&self, session_id: &str) -> Result<Option<Session>, StateError> {
        let path = self.rollout_path(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let file = OpenOptions::new().read(true).open(&path)?;
        let reader = BufReader::new(file);
        let mut rollout = RolloutState::default();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: RolloutEvent = serde_json::from_str(&line)?;
            rollout.apply(event)?;
        }
        Ok(Some(rollout.finish(session_id)?))
    }
}

impl StateStore for JsonlStateStore {
    fn record_session(&self, session: &Session) -> Result<(), StateError> {
        info!("recording session creation (session_id={})", session.id);
        let event = RolloutEvent::SessionCreated {
            session_id: session.id.clone(),
            context: session.context.clone(),
            created_at: session.created_at,
        };
        self.write_new_rollout(&session.id, &event)
    }

    fn append_messages(
        &self,
        session_id: &str,
        messages: &[Message],
        response_time_ms: Option<u64>,
    ) -> Result<(), StateError> {
        debug!(
            "appending message events (session_id={}, count={})",
            session_id,
            messages.len()
        );
        let last = messages.len().saturating_sub(1);
        let events: Vec<RolloutEvent> = messages
            .iter()
            .enumerate()
            .map(|(idx, message)| RolloutEvent::Message {
                session_id: session_id.to_string(),
                message: message.clone(),
                response_time_ms: if idx == last { response_time_ms } else { None },
            })
            .collect();
        self.write_events(session_id, &events)
    }

    fn close_session(&self, session_id: &str, closed_at: DateTime<Utc>) -> Result<(), StateError> {
        info!("recording session close (session_id={})", session_id);
        let event = RolloutEvent::SessionClosed {
            session_id: session_id.to_string(),
            closed_at,
        };
        self.write_events(session_id, std::slice::from_ref(&event))
    }

    fn load_session(&self, session_id: &str) -> Result<Option<Session>, StateError> {
        self.read_rollout(session_id)
    }

    /// List all sessions by scanning rollout files.
    fn list_sessions(&self) -> Result<Vec<SessionSummary>, StateError> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_valid_session_id(session_id) {
                continue;
            }
            if let Some(session) = self.read_rollout(session_id)? {
                summaries.push(SessionSummary::from(&session));
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonlStateStore, StateError, StateStore};
    use crate::types::{Message, Session, SessionContext, SessionStatus};
    use chrono::Utc;
    use meridian_protocol::Role;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn jsonl_state_store_round_trip() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let context = SessionContext {
            industry: Some("retail".to_string()),
            ..SessionContext::default()
        };
        let session = Session::new("s1".to_string(), context.clone());
        store.record_session(&session).expect("record session");

        let messages = vec![
            Message::new(Role::User, "hello", 2),
            Message::new(Role::Assistant, "hi there", 3),
        ];
        store
            .append_messages("s1", &messages, Some(120))
            .expect("append messages");
        let closed_at = Utc::now();
        store.close_session("s1", closed_at).expect("close");

        let loaded = store.load_session("s1").expect("load").expect("session");
        assert_eq!(loaded.context, context);
        assert_eq!(loaded.messages, messages);
        assert_eq!(loaded.status, SessionStatus::Closed);
        assert_eq!(loaded.metadata.total_tokens, 5);
        assert_eq!(loaded.metadata.turn_count, 1);
        assert_eq!(loaded.metadata.average_response_time_ms, 120.0);
        assert_eq!(loaded.updated_at, closed_at);

        let summaries = store.list_sessions().expect("summaries");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "s1");
        assert_eq!(summaries[0].message_count, 2);
    }

    #[test]
    fn duplicate_sessions_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let session = Session::new("dup".to_string(), SessionContext::default());
        store.record_session(&session).expect("record");
        let err = store.record_session(&session).unwrap_err();
        assert!(matches!(err, StateError::SessionExists(id) if id == "dup"));
    }

    #[test]
    fn unsafe_ids_never_touch_the_filesystem() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        let err = store.load_session("../escape").unwrap_err();
        assert!(matches!(err, StateError::InvalidId(_)));
    }

    #[test]
    fn missing_sessions_load_as_none() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlStateStore::new(temp.path()).expect("store");
        assert!(store.load_session("nope").expect("load").is_none());
    }
}
