use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::base::{Provider, Usage};
use super::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::Tool;

/// A scripted provider: returns pre-configured results in order and records
/// every history it was asked to complete.
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<Message, ProviderError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock provider that can also fail on chosen calls
    pub fn with_results(results: Vec<Result<Message, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The message histories received so far, one per call
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system: &str,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(Message, Usage), ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| ProviderError::InvalidResponse("mock provider lock poisoned".into()))?
            .pop_front();

        match next {
            Some(result) => result.map(|message| (message, Usage::default())),
            // Return empty response if no more pre-configured responses
            None => Ok((Message::assistant().with_text(""), Usage::default())),
        }
    }
}
