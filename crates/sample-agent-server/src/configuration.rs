use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment, File};
use sample_agent::gateway::DEFAULT_MAX_RETRIES;
use sample_agent::providers::configs::{
    OpenAiProviderConfig, DEFAULT_MODEL, DEFAULT_TEMPERATURE, OPENAI_COMPATIBLE_HOST,
};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

#[derive(Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("host", &self.host)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ProviderSettings {
    pub fn into_config(self) -> OpenAiProviderConfig {
        let mut config = OpenAiProviderConfig::new(self.host, self.api_key);
        config.model = self.model;
        config.temperature = self.temperature;
        config.max_tokens = self.max_tokens;
        config
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentSettings {
    /// Model calls allowed per request before it fails; unbounded when unset
    #[serde(default)]
    pub max_turns: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.host", default_provider_host())?
            .set_default("provider.model", default_model())?
            .set_default("provider.temperature", DEFAULT_TEMPERATURE as f64)?
            .set_default("provider.max_retries", default_max_retries())?
            // Optional settings file next to the binary's working directory
            .add_source(File::with_name("sample-agent").required(false))
            .add_source(
                Environment::with_prefix("AGENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // Hosting platforms hand out the listen port as a bare PORT
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?;

        let settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                return match &err {
                    config::ConfigError::NotFound(field) => Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    }),
                    _ => Err(ConfigError::Other(err)),
                };
            }
        };

        if settings.provider.api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }

        if settings.agent.max_turns == Some(0) {
            return Err(ConfigError::InvalidValue {
                env_var: to_env_var("agent.max_turns"),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(settings)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_provider_host() -> String {
    OPENAI_COMPATIBLE_HOST.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
