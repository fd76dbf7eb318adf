//! The HTTP side of the streamable HTTP transport and the client handler.

use std::borrow::Cow;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use reqwest::{RequestBuilder, StatusCode};
use rmcp::model::{
    ClientCapabilities, ClientInfo, ClientJsonRpcMessage, Implementation,
    LoggingLevel, LoggingMessageNotificationParam, ProtocolVersion,
    ServerJsonRpcMessage,
};
use rmcp::service::NotificationContext;
use rmcp::transport::streamable_http_client::{
    SseError, StreamableHttpClient, StreamableHttpError,
    StreamableHttpPostResponse,
};
use rmcp::{ClientHandler, RoleClient};
use sse_stream::{Sse, SseStream};

use crate::McpClientConfig;

const SESSION_HEADER: &str = "mcp-session-id";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const ACCEPT_VALUE: &str = "application/json, text/event-stream";

type TransportResult<T> = Result<T, StreamableHttpError<reqwest::Error>>;

/// Sends the transport's messages through a shared `reqwest` client,
/// attaching the configured headers to every request.
#[derive(Clone)]
pub(crate) struct HttpTransport {
    http: reqwest::Client,
    headers: Arc<[(String, String)]>,
}

impl HttpTransport {
    pub(crate) fn new(http: reqwest::Client, config: &McpClientConfig) -> Self {
        Self {
            http,
            headers: config.headers().into(),
        }
    }

    fn decorate(
        &self,
        mut req: RequestBuilder,
        session_id: Option<&str>,
        auth_token: Option<String>,
    ) -> RequestBuilder {
        req = req.header(ACCEPT, ACCEPT_VALUE);
        for (name, value) in self.headers.iter() {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(session_id) = session_id {
            req = req.header(SESSION_HEADER, session_id);
        }
        if let Some(token) = auth_token {
            req = req.bearer_auth(token);
        }
        req
    }
}

fn content_type(headers: &HeaderMap) -> Option<mime::Mime> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn is_event_stream(value: &mime::Mime) -> bool {
    value.essence_str() == mime::TEXT_EVENT_STREAM.essence_str()
}

fn is_json(value: &mime::Mime) -> bool {
    value.essence_str() == mime::APPLICATION_JSON.essence_str()
}

impl StreamableHttpClient for HttpTransport {
    type Error = reqwest::Error;

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        auth_token: Option<String>,
    ) -> TransportResult<StreamableHttpPostResponse> {
        let req = self.decorate(
            self.http.post(uri.as_ref()),
            session_id.as_deref(),
            auth_token,
        );
        let resp = req.json(&message).send().await.map_err(StreamableHttpError::Client)?;
        let status = resp.status();

        // The server forgot the session. The connection is unusable and
        // the client has to handshake again.
        if status == StatusCode::NOT_FOUND && session_id.is_some() {
            warn!("MCP session expired");
            return Err(StreamableHttpError::UnexpectedServerResponse(
                Cow::from("session expired"),
            ));
        }
        let resp = resp.error_for_status().map_err(StreamableHttpError::Client)?;
        if matches!(status, StatusCode::ACCEPTED | StatusCode::NO_CONTENT) {
            return Ok(StreamableHttpPostResponse::Accepted);
        }

        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        match content_type(resp.headers()) {
            Some(mime) if is_event_stream(&mime) => {
                let stream =
                    SseStream::from_byte_stream(resp.bytes_stream()).boxed();
                Ok(StreamableHttpPostResponse::Sse(stream, session_id))
            }
            Some(mime) if is_json(&mime) => {
                let message: ServerJsonRpcMessage = resp.json().await.map_err(StreamableHttpError::Client)?;
                Ok(StreamableHttpPostResponse::Json(message, session_id))
            }
            other => {
                let body = resp.bytes().await.map_err(StreamableHttpError::Client)?;
                if body.iter().all(u8::is_ascii_whitespace) {
                    return Ok(StreamableHttpPostResponse::Accepted);
                }
                Err(StreamableHttpError::UnexpectedContentType(
                    other.map(|mime| mime.to_string()),
                ))
            }
        }
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        auth_token: Option<String>,
    ) -> TransportResult<()> {
        let req = self.decorate(
            self.http.delete(uri.as_ref()),
            Some(session_id.as_ref()),
            auth_token,
        );
        let resp = req.send().await.map_err(StreamableHttpError::Client)?;
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        resp.error_for_status().map_err(StreamableHttpError::Client)?;
        Ok(())
    }

    async fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        auth_token: Option<String>,
    ) -> TransportResult<BoxStream<'static, Result<Sse, SseError>>> {
        let mut req = self.decorate(
            self.http.get(uri.as_ref()),
            Some(session_id.as_ref()),
            auth_token,
        );
        if let Some(last_event_id) = last_event_id {
            req = req.header(LAST_EVENT_ID_HEADER, last_event_id);
        }
        let resp = req.send().await.map_err(StreamableHttpError::Client)?;
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Err(StreamableHttpError::ServerDoesNotSupportSse);
        }
        let resp = resp.error_for_status().map_err(StreamableHttpError::Client)?;
        match content_type(resp.headers()) {
            Some(mime) if is_event_stream(&mime) => {
                Ok(SseStream::from_byte_stream(resp.bytes_stream()).boxed())
            }
            other => Err(StreamableHttpError::UnexpectedContentType(
                other.map(|mime| mime.to_string()),
            )),
        }
    }
}

/// Announces the client in the handshake and forwards server log messages
/// to `tracing`. Requests from the server, such as `ping`, are answered by
/// the default handlers.
#[derive(Clone, Debug)]
pub(crate) struct Handler {
    info: ClientInfo,
}

impl Handler {
    pub(crate) fn new(config: &McpClientConfig) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: ProtocolVersion::LATEST,
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: config.client_name().to_owned(),
                    title: None,
                    version: config.client_version().to_owned(),
                    icons: None,
                    website_url: None,
                },
            },
        }
    }
}

impl ClientHandler for Handler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let LoggingMessageNotificationParam {
            level,
            logger,
            data,
        } = params;
        let logger = logger.as_deref().unwrap_or("server");
        match level {
            LoggingLevel::Emergency
            | LoggingLevel::Alert
            | LoggingLevel::Critical
            | LoggingLevel::Error => error!(%logger, "{data}"),
            LoggingLevel::Warning => warn!(%logger, "{data}"),
            LoggingLevel::Notice | LoggingLevel::Info => info!(%logger, "{data}"),
            _ => debug!(%logger, "{data}"),
        }
    }
}
