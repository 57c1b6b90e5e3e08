//! In-memory session store with optional persistence via StateStore.
//!
//! Each session lives in its own slot: a short-held mutex guards the session
//! state and a fair async "turn" lock serializes whole chat turns, so
//! requests on different sessions never share a lock.

use crate::error::CoreError;
use crate::state::{JsonlStateStore, StateError, StateStore};
use crate::types::{
    Message, Session, SessionContext, SessionStatus, SessionSummary, is_valid_session_id,
};
use chrono::{DateTime, Duration, Utc};
use directories::UserDirs;
use log::{debug, info};
use meridian_config::SessionsConfig;
use meridian_protocol::SessionId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

struct SessionSlot {
    state: Mutex<Session>,
    turn: Arc<tokio::sync::Mutex<()>>,
}

impl SessionSlot {
    fn new(session: Session) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(session),
            turn: Arc::new(tokio::sync::Mutex::new(())),
        })
    }
}

/// Exclusive right to run a chat turn on one session. Released on drop.
pub struct SessionTurn {
    session_id: SessionId,
    _guard: OwnedMutexGuard<()>,
}

impl SessionTurn {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Session storage facade used by the chat service.
#[derive(Clone)]
pub struct SessionStore {
    /// In-memory session slots.
    slots: Arc<RwLock<HashMap<SessionId, Arc<SessionSlot>>>>,
    /// Optional persistent store for sessions.
    state_store: Option<Arc<dyn StateStore>>,
    /// Idle time after which `expire_idle` closes a session.
    ttl: Option<Duration>,
}

impl SessionStore {
    /// Create a new session store with an optional backing store.
    pub fn new(state_store: Option<Arc<dyn StateStore>>, ttl: Option<Duration>) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            state_store,
            ttl,
        }
    }

    /// Build a store from the sessions config section.
    pub fn from_config(config: &SessionsConfig) -> Result<Self, CoreError> {
        let ttl = config
            .ttl_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds);
        let state_store: Option<Arc<dyn StateStore>> = if config.persist {
            let root = match &config.path {
                Some(path) => PathBuf::from(path),
                None => default_sessions_path()?,
            };
            Some(Arc::new(JsonlStateStore::new(root)?))
        } else {
            None
        };
        info!(
            "session store ready (persist={}, ttl_secs={:?})",
            config.persist, config.ttl_secs
        );
        Ok(Self::new(state_store, ttl))
    }

    /// Create a session with a generated id.
    pub fn create(&self, context: SessionContext) -> Result<Session, CoreError> {
        self.create_with_id(Uuid::new_v4().to_string(), context)
    }

    /// Create a session under a caller-chosen id.
    pub fn create_with_id(
        &self,
        session_id: impl Into<SessionId>,
        context: SessionContext,
    ) -> Result<Session, CoreError> {
        let session_id = session_id.into();
        if !is_valid_session_id(&session_id) {
            return Err(CoreError::InvalidSessionId(session_id));
        }
        let session = Session::new(session_id.clone(), context);

        let mut slots = self.slots.write();
        if slots.contains_key(&session_id) {
            return Err(CoreError::SessionExists(session_id));
        }
        if let Some(store) = &self.state_store {
            store.record_session(&session).map_err(|err| match err {
                StateError::SessionExists(id) => CoreError::SessionExists(id),
                other => CoreError::State(other),
            })?;
        }
        slots.insert(session_id.clone(), SessionSlot::new(session.clone()));
        info!("created session (session_id={})", session_id);
        Ok(session)
    }

    /// Snapshot a session from cache or the persistent store.
    pub fn get(&self, session_id: &str) -> Result<Session, CoreError> {
        let slot = self.slot(session_id)?;
        let session = slot.state.lock().clone();
        Ok(session)
    }

    /// Append a single message.
    pub fn append_message(&self, session_id: &str, message: Message) -> Result<Session, CoreError> {
        self.append_messages(session_id, vec![message], None)
    }

    /// Append messages as one unit: either all are visible or none are.
    pub fn append_messages(
        &self,
        session_id: &str,
        messages: Vec<Message>,
        response_time_ms: Option<u64>,
    ) -> Result<Session, CoreError> {
        let slot = self.slot(session_id)?;
        let mut session = slot.state.lock();
        if session.is_closed() {
            return Err(CoreError::SessionClosed(session_id.to_string()));
        }
        if let Some(store) = &self.state_store {
            store.append_messages(session_id, &messages, response_time_ms)?;
        }
        debug!(
            "appending messages (session_id={}, count={})",
            session_id,
            messages.len()
        );
        session.metadata.record(&messages, response_time_ms);
        if let Some(last) = messages.last() {
            session.updated_at = session.updated_at.max(last.created_at);
        }
        session.messages.extend(messages);
        Ok(session.clone())
    }

    /// Close a session. Closing an already closed session is a no-op.
    pub fn close(&self, session_id: &str) -> Result<(), CoreError> {
        let slot = self.slot(session_id)?;
        let mut session = slot.state.lock();
        close_locked(&mut session, self.state_store.as_deref(), Utc::now())
    }

    /// List all session summaries, using persistence when configured.
    pub fn list(&self) -> Result<Vec<SessionSummary>, CoreError> {
        if let Some(store) = &self.state_store {
            return Ok(store.list_sessions()?);
        }
        let mut summaries: Vec<SessionSummary> = self
            .slots
            .read()
            .values()
            .map(|slot| SessionSummary::from(&*slot.state.lock()))
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Close active sessions idle for longer than the TTL. Returns their ids.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> Result<Vec<SessionId>, CoreError> {
        let Some(ttl) = self.ttl else {
            return Ok(Vec::new());
        };
        let slots: Vec<Arc<SessionSlot>> = self.slots.read().values().cloned().collect();
        let mut expired = Vec::new();
        for slot in slots {
            let mut session = slot.state.lock();
            let idle_since = session.updated_at.checked_add_signed(ttl);
            if session.is_closed() || idle_since.is_none_or(|deadline| deadline > now) {
                continue;
            }
            close_locked(&mut session, self.state_store.as_deref(), now)?;
            expired.push(session.id.clone());
        }
        if !expired.is_empty() {
            info!("expired idle sessions (count={})", expired.len());
        }
        expired.sort();
        Ok(expired)
    }

    /// Wait for exclusive use of a session for one chat turn.
    ///
    /// Waiters are served in the order they started waiting.
    pub async fn turn(&self, session_id: &str) -> Result<SessionTurn, CoreError> {
        let turn = self.slot(session_id)?.turn.clone();
        let guard = turn.lock_owned().await;
        Ok(SessionTurn {
            session_id: session_id.to_string(),
            _guard: guard,
        })
    }

    fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, CoreError> {
        if let Some(slot) = self.slots.read().get(session_id) {
            return Ok(slot.clone());
        }
        self.resume(session_id)
    }

    /// Load a session missing from memory out of the persistent store.
    fn resume(&self, session_id: &str) -> Result<Arc<SessionSlot>, CoreError> {
        let unknown = || CoreError::UnknownSession(session_id.to_string());
        let Some(store) = &self.state_store else {
            return Err(unknown());
        };
        if !is_valid_session_id(session_id) {
            return Err(unknown());
        }
        let session = store.load_session(session_id)?.ok_or_else(unknown)?;
        debug!("loaded session from store (session_id={})", session_id);
        let slot = self
            .slots
            .write()
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSlot::new(session))
            .clone();
        Ok(slot)
    }
}

fn close_locked(
    session: &mut Session,
    store: Option<&dyn StateStore>,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    if session.is_closed() {
        return Ok(());
    }
    if let Some(store) = store {
        store.close_session(&session.id, now)?;
    }
    session.status = SessionStatus::Closed;
    session.updated_at = session.updated_at.max(now);
    info!("closed session (session_id={})", session.id);
    Ok(())
}

fn default_sessions_path() -> Result<PathBuf, CoreError> {
    UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".meridian").join("sessions"))
        .ok_or_else(|| CoreError::SessionPath("home directory not found".to_string()))
}
