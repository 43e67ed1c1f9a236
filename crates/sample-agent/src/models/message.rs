use super::role::Role;
use super::tool::ToolCall;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A single call requested by the model, identified so its result can answer it
pub struct ToolRequest {
    pub id: String,
    pub tool_call: ToolCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    /// Stable identity used when merging a message into a session
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    pub created: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolRequest>,
    /// Set on tool messages: the call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            id: new_message_id(),
            role,
            created: Utc::now().timestamp(),
            content: String::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Self::new(Role::System)
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a tool result message answering the call `call_id`
    pub fn tool<S: Into<String>>(call_id: S) -> Self {
        let mut message = Self::new(Role::Tool);
        message.tool_call_id = Some(call_id.into());
        message
    }

    /// Replace the generated id, e.g. with one supplied by a client
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    /// Add text content to the message
    pub fn with_text<S: AsRef<str>>(mut self, text: S) -> Self {
        self.content.push_str(text.as_ref());
        self
    }

    /// Add a tool request to the message
    pub fn with_tool_call<S: Into<String>>(mut self, id: S, tool_call: ToolCall) -> Self {
        self.tool_calls.push(ToolRequest {
            id: id.into(),
            tool_call,
        });
        self
    }

    pub fn text(&self) -> &str {
        &self.content
    }

    pub fn tool_requests(&self) -> &[ToolRequest] {
        &self.tool_calls
    }

    /// True for assistant messages that ask for at least one tool call
    pub fn is_tool_call(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Tool calls of the most recent assistant message that no tool message has answered yet.
///
/// An empty result means the history is ready for another model turn.
pub fn pending_tool_calls(messages: &[Message]) -> Vec<&ToolRequest> {
    let Some(position) = messages.iter().rposition(|m| m.role == Role::Assistant) else {
        return Vec::new();
    };

    let answered: HashSet<&str> = messages[position + 1..]
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    messages[position]
        .tool_calls
        .iter()
        .filter(|request| !answered.contains(request.id.as_str()))
        .collect()
}
