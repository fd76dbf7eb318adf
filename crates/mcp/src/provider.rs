use segment_agent_core::tool::{
    Error as ToolError, ToolDescriptor, ToolInvoker, ToolProvider, ToolResult,
};
use serde_json::{Map, Value};

use crate::{McpClient, McpClientConfig, McpError};

/// Serves the tools of an MCP server to the agent.
///
/// Transport failures are reported as [`ToolError::unavailable`], which
/// fails the turn. Errors the server reports about a call are reported as
/// [`ToolError::execution_error`], which the model gets to see.
#[derive(Clone, Debug)]
pub struct McpToolProvider {
    client: McpClient,
}

impl McpToolProvider {
    /// Creates a provider backed by a new client.
    #[inline]
    pub fn new(config: McpClientConfig) -> Self {
        Self::with_client(McpClient::new(config))
    }

    /// Creates a provider backed by `client`.
    #[inline]
    pub fn with_client(client: McpClient) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    #[inline]
    pub fn client(&self) -> &McpClient {
        &self.client
    }
}

impl ToolProvider for McpToolProvider {
    fn fetch_tools(
        &self,
    ) -> impl Future<Output = Result<Vec<ToolDescriptor>, ToolError>> + Send + 'static
    {
        let client = self.client.clone();
        async move {
            let tools = client.list_tools().await.map_err(|err| {
                ToolError::unavailable()
                    .with_reason(format!("failed to list tools: {err}"))
            })?;
            Ok(tools
                .into_iter()
                .map(|tool| {
                    let invoker = McpToolInvoker {
                        client: client.clone(),
                        name: tool.name.clone(),
                    };
                    ToolDescriptor::new(
                        tool.name,
                        tool.description,
                        tool.input_schema,
                        invoker,
                    )
                })
                .collect())
        }
    }
}

struct McpToolInvoker {
    client: McpClient,
    name: String,
}

impl ToolInvoker for McpToolInvoker {
    fn invoke(
        &self,
        arguments: Value,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let name = self.name.clone();
        async move {
            let arguments = into_arguments(arguments)?;
            let output = client
                .call_tool(&name, arguments)
                .await
                .map_err(error_from_mcp)?;
            if output.is_error {
                return Err(ToolError::execution_error().with_reason(output.text));
            }
            Ok(output.text)
        }
    }
}

fn into_arguments(arguments: Value) -> Result<Map<String, Value>, ToolError> {
    match arguments {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ToolError::invalid_input().with_reason(format!(
            "arguments must be a JSON object, got: {other}"
        ))),
    }
}

fn error_from_mcp(err: McpError) -> ToolError {
    if err.is_server_error() {
        ToolError::execution_error().with_reason(err.to_string())
    } else {
        ToolError::unavailable().with_reason(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rmcp::model::ErrorData;
    use rmcp::service::ServiceError;
    use segment_agent_core::tool::ErrorKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_into_arguments() {
        let map = into_arguments(json!({ "query": "SELECT 1" })).unwrap();
        assert_eq!(map["query"], "SELECT 1");
        assert!(into_arguments(Value::Null).unwrap().is_empty());

        let err = into_arguments(json!("{\"query\": ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_error_mapping() {
        let err = error_from_mcp(McpError::Service(ServiceError::McpError(
            ErrorData::invalid_params("missing argument `query`", None),
        )));
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
        assert!(!err.is_fatal());

        let err = error_from_mcp(McpError::Service(ServiceError::TransportClosed));
        assert!(err.is_fatal());

        let err = error_from_mcp(McpError::TimedOut(Duration::from_secs(30)));
        assert!(err.is_fatal());
    }
}
