use std::env;
use std::fmt::{self, Debug, Formatter};

use segment_agent_core::{AgentBuilder, DEFAULT_MAX_STEPS};
use segment_agent_mcp::{McpClientConfigBuilder, McpToolProvider};
use segment_agent_openai_model::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAIConfigBuilder, OpenAIProvider,
};

use crate::feedback::FeedbackConfig;
use crate::prompt::SYSTEM_PROMPT;

/// The error returned when the environment is incomplete or malformed.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A variable could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    Invalid {
        /// The name of the variable.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Application configuration.
#[derive(Clone, PartialEq)]
pub struct Config {
    /// The endpoint of the MCP server that serves the tools.
    pub mcp_server_url: String,
    /// The API key of the model provider.
    pub openai_api_key: String,
    /// The API root of the model provider.
    pub openai_base_url: String,
    /// The model identifier.
    pub openai_model: String,
    /// The maximum number of model steps per turn.
    pub max_steps: usize,
    /// Feedback settings. Feedback is disabled when absent.
    pub feedback: Option<FeedbackConfig>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let max_steps = match get("AGENT_MAX_STEPS") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(steps) if steps > 0 => steps,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "AGENT_MAX_STEPS",
                        value,
                    });
                }
            },
            None => DEFAULT_MAX_STEPS,
        };

        let feedback = get("LANGSMITH_API_KEY_FEEDBACK").map(|api_key| {
            let config = FeedbackConfig::with_api_key(api_key);
            match get("LANGSMITH_ENDPOINT") {
                Some(endpoint) => config.with_endpoint(endpoint),
                None => config,
            }
        });

        Ok(Self {
            mcp_server_url: require("MCP_SERVER_URL")?,
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            openai_model: get("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            max_steps,
            feedback,
        })
    }

    /// Creates an agent builder wired to the configured model and MCP
    /// server, with the sales assistant prompt.
    pub fn agent_builder(&self) -> AgentBuilder {
        let model_config = OpenAIConfigBuilder::with_api_key(&self.openai_api_key)
            .with_base_url(&self.openai_base_url)
            .with_model(&self.openai_model)
            .build();
        let tool_provider = McpToolProvider::new(
            McpClientConfigBuilder::with_url(&self.mcp_server_url)
                .with_client_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
                .build(),
        );
        AgentBuilder::with_model_provider(OpenAIProvider::new(model_config))
            .with_tool_provider(tool_provider)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_max_steps(self.max_steps)
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mcp_server_url", &self.mcp_server_url)
            .field("openai_api_key", &"<redacted>")
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("max_steps", &self.max_steps)
            .field("feedback", &self.feedback)
            .finish()
    }
}
