//! Core logic of the agent: conversation state, tool resolution, and the
//! turn executor that drives the model until it produces a final answer.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
pub mod invocation;
mod model_client;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, DEFAULT_MAX_STEPS, TurnError, TurnOutcome,
    dated_system_prompt,
};
pub use conversation::{ConversationState, Message, Role};
pub use invocation::{InvocationConfig, RunId};
