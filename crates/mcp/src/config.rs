use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

/// How long a single request may take unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`McpClientConfig`].
#[derive(Clone, PartialEq)]
pub struct McpClientConfigBuilder {
    url: String,
    headers: Vec<(String, String)>,
    client_name: Option<String>,
    client_version: Option<String>,
    request_timeout: Option<Duration>,
}

impl McpClientConfigBuilder {
    /// Creates a builder for the server endpoint at `url`.
    #[inline]
    pub fn with_url<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            headers: vec![],
            client_name: None,
            client_version: None,
            request_timeout: None,
        }
    }

    /// Adds a header sent with every request, such as an authorization
    /// token.
    #[inline]
    pub fn with_header<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the client name and version announced in the handshake.
    #[inline]
    pub fn with_client_info<N, V>(mut self, name: N, version: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.client_name = Some(name.into());
        self.client_version = Some(version.into());
        self
    }

    /// Bounds the handshake and every request sent to the server.
    #[inline]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> McpClientConfig {
        McpClientConfig {
            url: self.url,
            headers: self.headers,
            client_name: self
                .client_name
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_owned()),
            client_version: self
                .client_version
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned()),
            request_timeout: self
                .request_timeout
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

impl Debug for McpClientConfigBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClientConfigBuilder")
            .field("url", &self.url)
            .field("headers", &RedactedHeaders(&self.headers))
            .field("client_name", &self.client_name)
            .field("client_version", &self.client_version)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Configuration for [`McpClient`](crate::McpClient).
#[derive(Clone, PartialEq)]
pub struct McpClientConfig {
    url: String,
    headers: Vec<(String, String)>,
    client_name: String,
    client_version: String,
    request_timeout: Duration,
}

impl McpClientConfig {
    /// Returns the server endpoint.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the timeout applied to the handshake and to each request.
    #[inline]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[inline]
    pub(crate) fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[inline]
    pub(crate) fn client_name(&self) -> &str {
        &self.client_name
    }

    #[inline]
    pub(crate) fn client_version(&self) -> &str {
        &self.client_version
    }
}

impl Debug for McpClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClientConfig")
            .field("url", &self.url)
            .field("headers", &RedactedHeaders(&self.headers))
            .field("client_name", &self.client_name)
            .field("client_version", &self.client_version)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

struct RedactedHeaders<'a>(&'a [(String, String)]);

impl Debug for RedactedHeaders<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(name, _)| (name, "<redacted>")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_redaction() {
        let config = McpClientConfigBuilder::with_url("http://localhost:8000/mcp")
            .with_header("Authorization", "Bearer secret-token")
            .build();
        assert_eq!(config.url(), "http://localhost:8000/mcp");
        assert_eq!(config.client_name(), "segment-agent-mcp");
        assert_eq!(config.headers().len(), 1);
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);

        let debug = format!("{config:?}");
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("secret-token"));
    }
}
