use std::error::Error as StdError;
use std::time::Duration;

use rmcp::service::ServiceError;

/// Error type for MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The handshake with the server failed.
    #[error("failed to connect to MCP server: {0}")]
    Connect(#[source] Box<dyn StdError + Send + Sync>),

    /// A request on an established session failed.
    #[error("MCP request failed: {0}")]
    Service(#[from] ServiceError),

    /// The handshake or a request took longer than the configured timeout.
    #[error("MCP request timed out after {0:?}")]
    TimedOut(Duration),
}

impl McpError {
    /// Returns `true` if the error was reported by a reachable server
    /// about the request itself, rather than by the transport.
    #[inline]
    pub fn is_server_error(&self) -> bool {
        matches!(self, McpError::Service(ServiceError::McpError(_)))
    }
}
