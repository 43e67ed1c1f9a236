use anyhow::Result;
use sample_agent::{
    agent::Agent,
    checkpoint::MemoryCheckpointer,
    gateway::ModelGateway,
    providers::openai::OpenAiProvider,
    registry::ToolRegistry,
    tools::OpenFileTool,
};
use std::sync::Arc;

use crate::configuration::Settings;

pub const AGENT_NAME: &str = "sample_agent";
pub const AGENT_DESCRIPTION: &str = "A general assistant that can open local files.";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub name: String,
    pub description: String,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent: Arc::new(agent),
            name: AGENT_NAME.to_string(),
            description: AGENT_DESCRIPTION.to_string(),
        }
    }

    /// Build the agent once from settings: provider, gateway, tools, checkpointer
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let max_retries = settings.provider.max_retries;
        let provider = OpenAiProvider::new(settings.provider.into_config())?;
        tracing::info!(model = %provider.config().model, host = %provider.config().host, "using provider");
        let gateway = ModelGateway::new(Arc::new(provider)).with_max_retries(max_retries);

        let mut registry = ToolRegistry::new();
        registry.register(OpenFileTool::default())?;

        let agent = Agent::new(
            gateway,
            Arc::new(registry),
            Arc::new(MemoryCheckpointer::new()),
        )
        .with_max_turns(settings.agent.max_turns);

        Ok(Self::new(agent))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use sample_agent::models::message::Message;
    use sample_agent::providers::errors::ProviderError;
    use sample_agent::providers::mock::MockProvider;
    use sample_agent::tools::FileOpener;
    use std::path::Path;
    use std::time::Duration;

    struct NoopOpener;

    impl FileOpener for NoopOpener {
        fn open(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// State around a scripted provider, with `open_file` wired to a no-op opener
    pub fn scripted_state(
        results: Vec<Result<Message, ProviderError>>,
    ) -> (AppState, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::with_results(results));
        let gateway = ModelGateway::new(provider.clone()).with_backoff(Duration::ZERO);

        let mut registry = ToolRegistry::new();
        registry
            .register(OpenFileTool::new(Arc::new(NoopOpener)))
            .unwrap();

        let agent = Agent::new(
            gateway,
            Arc::new(registry),
            Arc::new(MemoryCheckpointer::new()),
        );
        (AppState::new(agent), provider)
    }

    #[test]
    fn test_new_state_describes_agent() {
        let (state, _provider) = scripted_state(vec![]);
        assert_eq!(state.name, "sample_agent");
        assert_eq!(
            state.agent.tools().iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["open_file"]
        );
    }
}
