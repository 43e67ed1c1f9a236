use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::message::Message;

/// One conversation thread: its messages in conversational order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new<S: Into<String>>(id: S) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message, merging it into any message that carries the same id.
    ///
    /// A merge updates the stored content in place; the stored role and tool
    /// call links survive it. Returns true when an existing message was merged.
    pub fn append(&mut self, message: Message) -> bool {
        self.updated_at = Utc::now();
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                existing.content = message.content;
                if !message.tool_calls.is_empty() {
                    existing.tool_calls = message.tool_calls;
                }
                if existing.tool_call_id.is_none() {
                    existing.tool_call_id = message.tool_call_id;
                }
                true
            }
            None => {
                self.messages.push(message);
                false
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = Message>>(&mut self, messages: I) {
        for message in messages {
            self.append(message);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
