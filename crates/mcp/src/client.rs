use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use rmcp::RoleClient;
use rmcp::model::{CallToolRequestParam, CallToolResult, RawContent};
use rmcp::service::{RunningService, ServiceError};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::transport::{Handler, HttpTransport};
use crate::{McpClientConfig, McpError};

type Service = RunningService<RoleClient, Handler>;

/// A tool listed by the server.
#[derive(Clone, Debug, PartialEq)]
pub struct McpTool {
    /// The name of the tool.
    pub name: String,
    /// The description of the tool, empty if the server gave none.
    pub description: String,
    /// The JSON schema of the tool's arguments.
    pub input_schema: Value,
}

/// The output of a `tools/call` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallToolOutput {
    /// The text parts of the result, joined by newlines.
    pub text: String,
    /// Whether the server flagged the result as a tool error.
    pub is_error: bool,
}

struct Inner {
    http: reqwest::Client,
    config: McpClientConfig,
    service: Mutex<Option<Arc<Service>>>,
}

/// A client connected to one MCP server over streamable HTTP.
///
/// The connection is established lazily by the first request and shared
/// by every clone of the client. A request that fails in the transport,
/// including a session the server no longer knows, drops the connection
/// and the next request performs a new handshake.
#[derive(Clone)]
pub struct McpClient {
    inner: Arc<Inner>,
}

impl McpClient {
    /// Creates a client. No request is sent until the first call.
    pub fn new(config: McpClientConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Creates a client that sends requests through `http`.
    pub fn with_http_client(config: McpClientConfig, http: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                service: Mutex::new(None),
            }),
        }
    }

    /// Lists every tool of the server, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let tools = self
            .send(|service| async move { service.peer().list_all_tools().await })
            .await?;
        debug!("listed {} tools", tools.len());
        Ok(tools
            .into_iter()
            .map(|tool| McpTool {
                name: tool.name.into_owned(),
                description: tool
                    .description
                    .map(|d| d.into_owned())
                    .unwrap_or_default(),
                input_schema: Value::Object(Arc::unwrap_or_clone(
                    tool.input_schema,
                )),
            })
            .collect())
    }

    /// Calls a tool.
    ///
    /// A result flagged with `isError` is returned as an output, not as an
    /// error. Errors are reserved for transport and protocol failures.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolOutput, McpError> {
        let params = CallToolRequestParam {
            name: name.to_owned().into(),
            arguments: Some(arguments),
        };
        let result = self
            .send(move |service| async move {
                service.peer().call_tool(params).await
            })
            .await?;
        Ok(CallToolOutput {
            is_error: result.is_error.unwrap_or(false),
            text: output_text(result),
        })
    }

    async fn send<T, F, Fut>(&self, request: F) -> Result<T, McpError>
    where
        F: FnOnce(Arc<Service>) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let service = self.service().await?;
        let timeout = self.inner.config.request_timeout();
        let err = match tokio::time::timeout(timeout, request(Arc::clone(&service)))
            .await
        {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => McpError::from(err),
            Err(_) => McpError::TimedOut(timeout),
        };
        if !err.is_server_error() {
            self.disconnect(&service).await;
        }
        Err(err)
    }

    async fn service(&self) -> Result<Arc<Service>, McpError> {
        // Holding the lock across the handshake makes concurrent first
        // requests share one connection.
        let mut current = self.inner.service.lock().await;
        if let Some(service) = &*current {
            return Ok(Arc::clone(service));
        }
        let service = Arc::new(self.connect().await?);
        *current = Some(Arc::clone(&service));
        Ok(service)
    }

    async fn connect(&self) -> Result<Service, McpError> {
        let config = &self.inner.config;
        let transport = StreamableHttpClientTransport::with_client(
            HttpTransport::new(self.inner.http.clone(), config),
            StreamableHttpClientTransportConfig::with_uri(config.url()),
        );
        let timeout = config.request_timeout();
        let service = tokio::time::timeout(
            timeout,
            rmcp::serve_client(Handler::new(config), transport),
        )
        .await
        .map_err(|_| McpError::TimedOut(timeout))?
        .map_err(|err| McpError::Connect(Box::new(err)))?;

        if let Some(info) = service.peer().peer_info() {
            info!(
                url = config.url(),
                server = %info.server_info.name,
                server_version = %info.server_info.version,
                protocol_version = %info.protocol_version,
                "MCP session initialized"
            );
        }
        Ok(service)
    }

    /// Forgets `failed` unless another request already replaced it.
    async fn disconnect(&self, failed: &Arc<Service>) {
        let mut current = self.inner.service.lock().await;
        if current
            .as_ref()
            .is_some_and(|service| Arc::ptr_eq(service, failed))
        {
            warn!("MCP connection lost, the next request will reconnect");
            *current = None;
        }
    }
}

impl Debug for McpClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn output_text(result: CallToolResult) -> String {
    let parts: Vec<String> = result
        .content
        .into_iter()
        .map(|content| match content.raw {
            RawContent::Text(text) => text.text,
            _ => "[non-text content]".to_owned(),
        })
        .collect();
    match result.structured_content {
        Some(value) if parts.is_empty() => value.to_string(),
        _ => parts.join("\n"),
    }
}
