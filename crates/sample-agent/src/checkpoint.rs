use async_trait::async_trait;
use chrono::Utc;

use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::session::Session;
use crate::store::MessageStore;

/// Persists whole sessions at request boundaries.
///
/// A request loads once before the conversation graph runs and saves once after
/// it finishes; the turns in between only touch the loaded copy.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Load the session, or an empty one when the id has never been seen
    async fn load(&self, session_id: &str) -> AgentResult<Session>;

    /// Commit the session as the latest checkpoint for `session_id`
    async fn save(&self, session_id: &str, session: &Session) -> AgentResult<()>;

    /// The checkpointed messages, for reading only. Unknown ids are empty.
    async fn messages(&self, session_id: &str) -> AgentResult<Vec<Message>> {
        Ok(self.load(session_id).await?.messages)
    }
}

/// Checkpointer that keeps snapshots in process memory
#[derive(Default)]
pub struct MemoryCheckpointer {
    store: MessageStore,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(&self, session_id: &str) -> AgentResult<Session> {
        self.store.snapshot(session_id)
    }

    async fn save(&self, session_id: &str, session: &Session) -> AgentResult<()> {
        let mut checkpoint = session.clone();
        checkpoint.updated_at = Utc::now();
        tracing::debug!(
            session_id,
            messages = checkpoint.len(),
            "saving session checkpoint"
        );
        self.store.replace(session_id, checkpoint)
    }

    async fn messages(&self, session_id: &str) -> AgentResult<Vec<Message>> {
        Ok(self
            .store
            .find(session_id)?
            .map(|session| session.messages)
            .unwrap_or_default())
    }
}
