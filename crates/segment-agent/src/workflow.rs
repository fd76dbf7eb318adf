//! The graph driver: one agent turn, optionally followed by a feedback
//! step that suspends the run until the user rates the answer.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use segment_agent_core::{
    Agent, ConversationState, InvocationConfig, TurnError, TurnOutcome,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::feedback::{Feedback, FeedbackRating, FeedbackSink};

/// The question shown to the user when a run awaits feedback.
pub const FEEDBACK_PROMPT: &str =
    "Provide your feedback for the answer in the following format: score=5, comment=great";

/// How many runs may wait for feedback at once unless configured otherwise.
pub const DEFAULT_MAX_SUSPENDED_RUNS: usize = 1024;

/// Identifies a suspended run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResumeToken(String);

impl ResumeToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps a token received from a client.
    #[inline]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a run ended.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    /// The run is complete.
    Completed(TurnOutcome),
    /// The answer is ready and the run waits for a rating.
    ///
    /// Call [`Workflow::resume`] with the token and the user's reply.
    AwaitingFeedback {
        /// The token to resume the run with.
        token: ResumeToken,
        /// The question to show to the user.
        prompt: &'static str,
        /// The outcome of the agent turn.
        outcome: TurnOutcome,
    },
}

impl RunOutcome {
    /// Returns the outcome of the agent turn.
    #[inline]
    pub fn turn(&self) -> &TurnOutcome {
        match self {
            RunOutcome::Completed(outcome) => outcome,
            RunOutcome::AwaitingFeedback { outcome, .. } => outcome,
        }
    }
}

/// The error returned by [`Workflow`].
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The agent turn failed.
    #[error(transparent)]
    Turn(#[from] TurnError),
    /// No run is suspended under the token.
    #[error("no suspended run for token {0}")]
    UnknownToken(ResumeToken),
}

/// Drives `start -> agent -> [feedback] -> end`.
///
/// The feedback step only exists when a sink is configured. Suspended
/// runs are kept in memory until they are resumed or discarded. Once more
/// than [`max_suspended_runs`](Self::with_max_suspended_runs) runs are
/// waiting, the oldest one is dropped and its token becomes unknown.
pub struct Workflow {
    agent: Agent,
    feedback: Option<Arc<dyn FeedbackSink>>,
    suspended: Mutex<Suspended>,
    max_suspended_runs: usize,
}

#[derive(Default)]
struct Suspended {
    runs: HashMap<ResumeToken, (u64, TurnOutcome)>,
    next_seq: u64,
}

impl Suspended {
    fn insert(&mut self, token: ResumeToken, outcome: TurnOutcome, max: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.runs.insert(token, (seq, outcome));

        while self.runs.len() > max {
            let Some(oldest) = self
                .runs
                .iter()
                .min_by_key(|(_, (seq, _))| *seq)
                .map(|(token, _)| token.clone())
            else {
                break;
            };
            if let Some((_, outcome)) = self.runs.remove(&oldest) {
                warn!(
                    run_id = %outcome.run_id,
                    token = %oldest,
                    "dropping suspended run that was never resumed"
                );
            }
        }
    }

    fn remove(&mut self, token: &ResumeToken) -> Option<TurnOutcome> {
        self.runs.remove(token).map(|(_, outcome)| outcome)
    }
}

impl Workflow {
    /// Creates a workflow without the feedback step.
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            feedback: None,
            suspended: Mutex::default(),
            max_suspended_runs: DEFAULT_MAX_SUSPENDED_RUNS,
        }
    }

    /// Enables the feedback step.
    pub fn with_feedback<S: FeedbackSink + 'static>(mut self, sink: S) -> Self {
        self.feedback = Some(Arc::new(sink));
        self
    }

    /// Bounds how many runs may wait for feedback at once. At least one
    /// run is always kept.
    pub fn with_max_suspended_runs(mut self, max: usize) -> Self {
        self.max_suspended_runs = max.max(1);
        self
    }

    /// Returns the agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Runs the agent once over `state`.
    pub async fn run(
        &self,
        state: &ConversationState,
        config: &InvocationConfig,
    ) -> Result<RunOutcome, WorkflowError> {
        let outcome = self.agent.execute_turn(state, config).await?;
        if self.feedback.is_none() {
            return Ok(RunOutcome::Completed(outcome));
        }

        let token = ResumeToken::generate();
        debug!(run_id = %outcome.run_id, %token, "run suspended for feedback");
        self.suspended.lock().await.insert(
            token.clone(),
            outcome.clone(),
            self.max_suspended_runs,
        );
        Ok(RunOutcome::AwaitingFeedback {
            token,
            prompt: FEEDBACK_PROMPT,
            outcome,
        })
    }

    /// Resumes a suspended run with the user's reply to
    /// [`FEEDBACK_PROMPT`].
    ///
    /// A reply that cannot be parsed, or feedback that cannot be
    /// submitted, is logged and the run still completes.
    pub async fn resume(
        &self,
        token: &ResumeToken,
        payload: &str,
    ) -> Result<TurnOutcome, WorkflowError> {
        let outcome = self.take(token).await?;
        let Some(sink) = &self.feedback else {
            return Ok(outcome);
        };

        match payload.parse::<FeedbackRating>() {
            Ok(rating) => {
                let feedback =
                    Feedback::user_rating(outcome.run_id.clone(), rating);
                if let Err(err) = sink.submit(feedback).await {
                    error!(run_id = %outcome.run_id, "failed to submit feedback: {err}");
                } else {
                    info!(run_id = %outcome.run_id, "feedback recorded");
                }
            }
            Err(err) => {
                warn!(run_id = %outcome.run_id, "ignoring malformed feedback {payload:?}: {err}");
            }
        }
        Ok(outcome)
    }

    /// Completes a suspended run without feedback.
    pub async fn discard(
        &self,
        token: &ResumeToken,
    ) -> Result<TurnOutcome, WorkflowError> {
        self.take(token).await
    }

    /// Returns the number of suspended runs.
    pub async fn suspended_runs(&self) -> usize {
        self.suspended.lock().await.runs.len()
    }

    async fn take(&self, token: &ResumeToken) -> Result<TurnOutcome, WorkflowError> {
        self.suspended
            .lock()
            .await
            .remove(token)
            .ok_or_else(|| WorkflowError::UnknownToken(token.clone()))
    }
}
