use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::checkpoint::Checkpointer;
use crate::errors::{AgentError, AgentResult};
use crate::gateway::ModelGateway;
use crate::models::message::{pending_tool_calls, Message, ToolRequest};
use crate::models::role::Role;
use crate::models::tool::Tool;
use crate::prompt_template::load_prompt_file;
use crate::registry::ToolRegistry;

type SessionLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

pub const DEFAULT_INSTRUCTIONS: &str = "You are a highly capable assistant.";

/// Where the conversation graph is between steps
#[derive(Debug)]
enum Node {
    ModelTurn,
    ToolDispatch(Vec<ToolRequest>),
    End,
}

/// Everything one request added to a session
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub session_id: String,
    /// Messages produced while answering, in order: assistant and tool messages
    pub messages: Vec<Message>,
    /// The final assistant message, which requests no tools
    pub reply: Message,
}

/// Agent drives the model through tool calls until it produces a reply
pub struct Agent {
    gateway: ModelGateway,
    tools: Arc<ToolRegistry>,
    checkpointer: Arc<dyn Checkpointer>,
    instructions: String,
    max_turns: Option<usize>,
    session_locks: SessionLocks,
}

/// A claim on one session's lock table entry.
///
/// The entry is removed when the last claim on it goes away, including a
/// claim dropped while still waiting for the lock.
struct SessionLock<'a> {
    table: &'a SessionLocks,
    session_id: String,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl SessionLock<'_> {
    async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.mutex.lock().await
    }
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        let Ok(mut locks) = self.table.lock() else {
            return;
        };
        // one reference in the table plus this claim
        let unclaimed = locks
            .get(&self.session_id)
            .map_or(false, |mutex| Arc::strong_count(mutex) == 2);
        if unclaimed {
            locks.remove(&self.session_id);
        }
    }
}

impl Agent {
    pub fn new(
        gateway: ModelGateway,
        tools: Arc<ToolRegistry>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self {
            gateway,
            tools,
            checkpointer,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            max_turns: None,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the base system instruction
    pub fn with_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Fail a request once the model has been called `max_turns` times without
    /// settling on a reply. `None` leaves the loop unbounded.
    pub fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tools.tools()
    }

    pub fn system_prompt(&self) -> AgentResult<String> {
        let context = json!({
            "instructions": self.instructions,
            "tools": self.tools.tools(),
        });
        load_prompt_file("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    fn ensure_ready(&self, messages: &[Message], turns: usize) -> AgentResult<()> {
        let pending = pending_tool_calls(messages);
        if !pending.is_empty() {
            return Err(AgentError::UnresolvedToolCalls(
                pending.into_iter().map(|r| r.id.clone()).collect(),
            ));
        }
        match self.max_turns {
            Some(max) if turns >= max => Err(AgentError::TurnLimit(max)),
            _ => Ok(()),
        }
    }

    /// Run the conversation graph over `messages`, yielding every message it adds.
    ///
    /// The stream ends after the first assistant message that requests no tools.
    /// Tool calls from one assistant message run concurrently, but their results
    /// are yielded in the order the calls were requested, and the model is not
    /// called again until all of them are in.
    pub fn reply(&self, messages: &[Message]) -> BoxStream<'_, AgentResult<Message>> {
        let mut messages = messages.to_vec();

        Box::pin(async_stream::try_stream! {
            let system_prompt = self.system_prompt()?;
            let tools = self.tools.tools();
            let mut turns = 0;
            let mut node = Node::ModelTurn;

            loop {
                node = match node {
                    Node::ModelTurn => {
                        self.ensure_ready(&messages, turns)?;
                        turns += 1;
                        tracing::debug!(turn = turns, history = messages.len(), "model turn");

                        let response = self.gateway.complete(&system_prompt, &messages, &tools).await?;
                        messages.push(response.clone());
                        let next = if response.is_tool_call() {
                            Node::ToolDispatch(response.tool_calls.clone())
                        } else {
                            Node::End
                        };
                        yield response;
                        next
                    }
                    Node::ToolDispatch(requests) => {
                        let outputs = futures::future::join_all(
                            requests.iter().map(|request| self.tools.dispatch(request)),
                        )
                        .await;
                        for output in outputs {
                            messages.push(output.clone());
                            yield output;
                        }
                        Node::ModelTurn
                    }
                    Node::End => break,
                };
            }
        })
    }

    fn session_lock(&self, session_id: &str) -> AgentResult<SessionLock<'_>> {
        let mut locks = self
            .session_locks
            .lock()
            .map_err(|_| AgentError::Internal("session lock table poisoned".into()))?;
        let mutex = locks.entry(session_id.to_string()).or_default().clone();
        Ok(SessionLock {
            table: &self.session_locks,
            session_id: session_id.to_string(),
            mutex,
        })
    }

    /// Answer one request on a session.
    ///
    /// Loads the session checkpoint, merges `incoming` into it, runs the graph to
    /// completion and saves once. `on_message` sees each produced message as soon
    /// as it exists. If the returned future is dropped before it resolves, or the
    /// run fails, the checkpoint is left as it was.
    pub async fn respond<F>(
        &self,
        session_id: &str,
        incoming: Vec<Message>,
        mut on_message: F,
    ) -> AgentResult<Turn>
    where
        F: FnMut(&Message) + Send,
    {
        let lock = self.session_lock(session_id)?;
        let _guard = lock.acquire().await;

        let mut session = self.checkpointer.load(session_id).await?;
        session.extend(incoming);
        tracing::info!(session_id, history = session.len(), "starting turn");

        let mut produced = Vec::new();
        {
            let mut stream = self.reply(&session.messages);
            while let Some(message) = stream.try_next().await? {
                on_message(&message);
                produced.push(message);
            }
        }

        let reply = produced
            .last()
            .filter(|m| m.role == Role::Assistant && !m.is_tool_call())
            .cloned()
            .ok_or_else(|| AgentError::Internal("conversation ended without a reply".into()))?;

        session.extend(produced.iter().cloned());
        self.checkpointer.save(session_id, &session).await?;
        tracing::info!(session_id, produced = produced.len(), "turn complete");

        Ok(Turn {
            session_id: session_id.to_string(),
            messages: produced,
            reply,
        })
    }

    /// The checkpointed messages of a session; empty for unknown ids
    pub async fn history(&self, session_id: &str) -> AgentResult<Vec<Message>> {
        self.checkpointer.messages(session_id).await
    }
}
