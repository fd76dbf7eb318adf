mod builder;
mod prompt;

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use segment_agent_model::{
    ModelMessage, ModelProviderError, ModelRequest, ToolCallRequest,
};
use tracing::Instrument;

use crate::conversation::{ConversationState, Message};
use crate::invocation::{InvocationConfig, RunId};
use crate::model_client::ModelClient;
use crate::tool::{self, Executor as ToolExecutor, ToolCache, ToolSetSource};
pub use builder::AgentBuilder;
pub use prompt::dated_system_prompt;

/// The default upper bound of model steps in one turn.
pub const DEFAULT_MAX_STEPS: usize = 25;

type TranscriptFn = Arc<dyn Fn(&RunId, String) + Send + Sync>;

/// The result of a successful turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// The conversation extended with every message produced by the turn.
    pub state: ConversationState,
    /// The run identifier of this turn.
    pub run_id: RunId,
    /// Where the tools used by this turn came from.
    pub tool_source: ToolSetSource,
    /// The number of model steps taken.
    pub steps: usize,
}

impl TurnOutcome {
    /// Returns the final answer of the model.
    #[inline]
    pub fn answer(&self) -> Option<&str> {
        self.state.last_assistant_text()
    }
}

/// The reason a turn failed.
///
/// A failed turn never produces a partial state.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The tool list could not be fetched.
    #[error("failed to resolve tools: {0}")]
    ToolResolution(#[source] tool::Error),
    /// A tool call failed in a way that the model cannot recover from.
    #[error("tool invocation failed: {0}")]
    ToolInvocation(#[source] tool::Error),
    /// The model request failed.
    #[error("model request failed: {0}")]
    Model(Box<dyn ModelProviderError>),
    /// The model kept calling tools after the step limit.
    #[error("no final answer after {0} model steps")]
    StepLimitExceeded(usize),
    /// The turn did not finish in time.
    #[error("turn timed out after {0:?}")]
    TimedOut(Duration),
}

/// The turn executor.
///
/// An agent binds a model, a tool cache and a system prompt. Each call to
/// [`execute_turn`](Self::execute_turn) runs the reasoning loop over a
/// conversation until the model answers without calling tools.
///
/// Agents are cheap to clone and clones share the tool cache, so several
/// turns can run concurrently.
#[derive(Clone)]
pub struct Agent {
    model_client: ModelClient,
    tool_cache: ToolCache,
    system_prompt: Arc<str>,
    max_steps: usize,
    turn_timeout: Option<Duration>,
    on_transcript: Option<TranscriptFn>,
}

impl Agent {
    /// Returns the tool cache of this agent.
    #[inline]
    pub fn tool_cache(&self) -> &ToolCache {
        &self.tool_cache
    }

    /// Returns the system prompt without the date prefix.
    #[inline]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Runs one turn over `state`.
    ///
    /// The returned state starts with the messages of `state`, followed by
    /// every assistant and tool message produced by this turn. On error
    /// nothing is returned and `state` stays as it was.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned future cancels in-flight model and tool calls.
    pub async fn execute_turn(
        &self,
        state: &ConversationState,
        config: &InvocationConfig,
    ) -> Result<TurnOutcome, TurnError> {
        let run_id = config.resolve_run_id();
        let span = info_span!("turn", run_id = %run_id);
        let fut = self.run_loop(state.clone(), run_id).instrument(span);
        match self.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| {
                    warn!("turn timed out after {limit:?}");
                    Err(TurnError::TimedOut(limit))
                }),
            None => fut.await,
        }
    }

    async fn run_loop(
        &self,
        mut state: ConversationState,
        run_id: RunId,
    ) -> Result<TurnOutcome, TurnError> {
        let system_prompt =
            dated_system_prompt(&self.system_prompt, Local::now().date_naive());

        let (tools, tool_source) = self
            .tool_cache
            .resolve()
            .await
            .map_err(TurnError::ToolResolution)?;
        debug!("using {} tools from {tool_source}", tools.len());
        let executor = ToolExecutor::with_tools(&tools);
        let definitions = executor.definitions();

        let mut steps = 0;
        loop {
            if steps >= self.max_steps {
                warn!("step limit reached: {}", self.max_steps);
                return Err(TurnError::StepLimitExceeded(self.max_steps));
            }
            steps += 1;

            let mut messages = Vec::with_capacity(state.len() + 1);
            messages.push(ModelMessage::System(system_prompt.clone()));
            messages.extend(
                state.messages().iter().map(|m| m.as_model_message().clone()),
            );
            let req = ModelRequest {
                messages,
                tools: definitions.clone(),
            };

            let resp = self
                .model_client
                .send_request(req, self.transcript_sink(&run_id))
                .await
                .map_err(TurnError::Model)?;
            debug!(
                step = steps,
                tool_calls = resp.tool_calls.len(),
                finish_reason = ?resp.finish_reason,
                "model step finished"
            );

            if resp.tool_calls.is_empty() {
                state.push(Message::assistant(resp.transcript));
                break;
            }

            log_tool_calls(&resp.tool_calls);
            let results = executor
                .execute_all(&resp.tool_calls)
                .await
                .map_err(TurnError::ToolInvocation)?;

            state.push(ModelMessage::Assistant {
                content: resp.transcript,
                tool_calls: resp.tool_calls,
            });
            for result in results {
                state.push(ModelMessage::Tool(result));
            }
        }

        info!(steps, "turn finished");
        Ok(TurnOutcome {
            state,
            run_id,
            tool_source,
            steps,
        })
    }

    fn transcript_sink(
        &self,
        run_id: &RunId,
    ) -> impl Fn(String) + Send + 'static {
        let on_transcript = self.on_transcript.clone();
        let run_id = run_id.clone();
        move |delta| {
            if let Some(on_transcript) = &on_transcript {
                on_transcript(&run_id, delta);
            }
        }
    }
}

fn log_tool_calls(tool_calls: &[ToolCallRequest]) {
    for call in tool_calls {
        info!(id = %call.id, name = %call.name, "model requested a tool");
    }
}
