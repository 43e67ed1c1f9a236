use std::sync::Arc;
use std::time::Duration;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::Provider;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Stateless front of the provider: one call in, one assistant message out.
///
/// Transient provider failures are retried up to `max_retries` times with a
/// linearly growing delay before the turn fails with `AgentError::Gateway`.
pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    max_retries: u32,
    backoff: Duration,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> AgentResult<Message> {
        let mut attempt = 0;
        loop {
            match self.provider.complete(system, messages, tools).await {
                Ok((message, usage)) => {
                    tracing::debug!(
                        attempt,
                        input_tokens = ?usage.input_tokens,
                        output_tokens = ?usage.output_tokens,
                        "model turn completed"
                    );
                    return Ok(message);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, max_retries = self.max_retries, error = %e, "retrying model request");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "model request failed");
                    return Err(AgentError::Gateway(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::errors::ProviderError;
    use crate::providers::mock::MockProvider;
    use reqwest::StatusCode;

    fn unavailable() -> Result<Message, ProviderError> {
        Err(ProviderError::Server(StatusCode::SERVICE_UNAVAILABLE))
    }

    fn gateway(provider: Arc<MockProvider>) -> ModelGateway {
        ModelGateway::new(provider).with_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let provider = Arc::new(MockProvider::with_results(vec![
            unavailable(),
            unavailable(),
            Ok(Message::assistant().with_text("finally")),
        ]));

        let message = gateway(provider.clone())
            .complete("system", &[Message::user().with_text("hi")], &[])
            .await
            .unwrap();

        assert_eq!(message.text(), "finally");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let provider = Arc::new(MockProvider::with_results(vec![
            unavailable(),
            unavailable(),
            unavailable(),
            Ok(Message::assistant().with_text("too late")),
        ]));

        let result = gateway(provider.clone())
            .complete("system", &[Message::user().with_text("hi")], &[])
            .await;

        assert!(matches!(result, Err(AgentError::Gateway(_))));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_failures() {
        let provider = Arc::new(MockProvider::with_results(vec![
            Err(ProviderError::Rejected {
                status: StatusCode::UNAUTHORIZED,
                body: "bad key".into(),
            }),
            Ok(Message::assistant().with_text("unreachable")),
        ]));

        let result = gateway(provider.clone())
            .complete("system", &[Message::user().with_text("hi")], &[])
            .await;

        assert!(matches!(result, Err(AgentError::Gateway(reason)) if reason.contains("401")));
        assert_eq!(provider.call_count(), 1);
    }
}
