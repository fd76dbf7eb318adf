//! An MCP client for the streamable HTTP transport, built on `rmcp`.
//!
//! Only the tool surface is used: `tools/list` and `tools/call`. The
//! client is exposed to the agent through [`McpToolProvider`], which turns
//! every listed tool into a [`ToolDescriptor`](segment_agent_core::tool::ToolDescriptor)
//! bound to the shared connection.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;
mod config;
mod error;
mod provider;
mod transport;

pub use client::{CallToolOutput, McpClient, McpTool};
pub use config::{DEFAULT_REQUEST_TIMEOUT, McpClientConfig, McpClientConfigBuilder};
pub use error::McpError;
pub use provider::McpToolProvider;
