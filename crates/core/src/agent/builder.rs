use std::sync::Arc;
use std::time::Duration;

use segment_agent_model::ModelProvider;

use super::{Agent, DEFAULT_MAX_STEPS, TranscriptFn};
use crate::invocation::RunId;
use crate::model_client::ModelClient;
use crate::tool::{ToolCache, ToolProvider};

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    tool_cache: Option<ToolCache>,
    system_prompt: String,
    max_steps: usize,
    turn_timeout: Option<Duration>,
    on_transcript: Option<TranscriptFn>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            tool_cache: None,
            system_prompt: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            turn_timeout: None,
            on_transcript: None,
        }
    }

    /// Fetches tools from `provider` into a new cache.
    #[inline]
    pub fn with_tool_provider<P: ToolProvider>(self, provider: P) -> Self {
        self.with_tool_cache(ToolCache::new(provider))
    }

    /// Uses an existing tool cache, which may be shared with other agents.
    #[inline]
    pub fn with_tool_cache(mut self, tool_cache: ToolCache) -> Self {
        self.tool_cache = Some(tool_cache);
        self
    }

    /// Sets the static instructions. The date prefix is added per turn.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the maximum number of model steps in one turn.
    ///
    /// Defaults to [`DEFAULT_MAX_STEPS`]. Zero is treated as one.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Fails a turn that takes longer than `timeout`.
    #[inline]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    /// Attaches a callback to be invoked with every streamed text delta.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&RunId, String) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Builds the agent.
    ///
    /// Without a tool provider the agent runs with an empty tool set.
    pub fn build(self) -> Agent {
        let Self {
            model_client,
            tool_cache,
            system_prompt,
            max_steps,
            turn_timeout,
            on_transcript,
        } = self;
        Agent {
            model_client,
            tool_cache: tool_cache
                .unwrap_or_else(|| ToolCache::from_tools(vec![])),
            system_prompt: system_prompt.into(),
            max_steps,
            turn_timeout,
            on_transcript,
        }
    }
}
