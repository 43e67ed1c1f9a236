use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::session::Session;

type SessionSlot = Arc<Mutex<Session>>;

/// In-memory message sequences keyed by session id.
///
/// Every session has its own lock, so writers on one session are serialized
/// while other sessions proceed independently. The outer map lock is only held
/// long enough to find or insert a slot.
#[derive(Default)]
pub struct MessageStore {
    sessions: RwLock<HashMap<String, SessionSlot>>,
}

fn poisoned<T>(_: T) -> AgentError {
    AgentError::Storage("message store lock poisoned".to_string())
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, session_id: &str) -> AgentResult<Option<SessionSlot>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    fn get_or_create(&self, session_id: &str) -> AgentResult<SessionSlot> {
        if let Some(slot) = self.get(session_id)? {
            return Ok(slot);
        }
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let slot = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(session_id))));
        Ok(slot.clone())
    }

    /// Add a message to the end of the session, merging by message id
    pub fn append(&self, session_id: &str, message: Message) -> AgentResult<()> {
        let slot = self.get_or_create(session_id)?;
        let mut session = slot.lock().map_err(poisoned)?;
        session.append(message);
        Ok(())
    }

    /// The full ordered sequence; an unknown id starts a new, empty session
    pub fn read(&self, session_id: &str) -> AgentResult<Vec<Message>> {
        let slot = self.get_or_create(session_id)?;
        let session = slot.lock().map_err(poisoned)?;
        Ok(session.messages.clone())
    }

    /// A copy of the session if it exists; never creates one
    pub fn find(&self, session_id: &str) -> AgentResult<Option<Session>> {
        match self.get(session_id)? {
            Some(slot) => Ok(Some(slot.lock().map_err(poisoned)?.clone())),
            None => Ok(None),
        }
    }

    /// A copy of the whole session, creating an empty one on first sight
    pub fn snapshot(&self, session_id: &str) -> AgentResult<Session> {
        let slot = self.get_or_create(session_id)?;
        let session = slot.lock().map_err(poisoned)?;
        Ok(session.clone())
    }

    /// Overwrite the stored session with `session`
    pub fn replace(&self, session_id: &str, mut session: Session) -> AgentResult<()> {
        session.id = session_id.to_string();
        let slot = self.get_or_create(session_id)?;
        let mut stored = slot.lock().map_err(poisoned)?;
        *stored = session;
        Ok(())
    }

    pub fn session_ids(&self) -> AgentResult<Vec<String>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
