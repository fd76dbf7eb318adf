//! A sales intelligence assistant for dental and orthodontic practices.
//!
//! The crate wires the agent core to an OpenAI-compatible model and an MCP
//! tool server, and adds an optional feedback step on top of each turn.
//! It ships two binaries: an interactive CLI and a one-shot feedback
//! submission tool.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
pub mod feedback;
mod prompt;
pub mod workflow;

pub use config::{Config, ConfigError};
pub use prompt::SYSTEM_PROMPT;
pub use workflow::{ResumeToken, RunOutcome, Workflow, WorkflowError};

/// Re-exports of [`segment_agent_core`] crate.
pub mod core {
    pub use segment_agent_core::*;
}
