//! Transport abstraction for MCP connections
//!
//! A [`Transport`] knows how to reach one kind of server and perform the
//! protocol handshake; [`TransportFactory`] picks the implementation from the
//! server configuration and enforces the configuration/security policy.

mod http;
mod retry;
mod stdio;

use std::time::Duration;

use async_trait::async_trait;
use mcplink_core::{McpClientResult, OAuthTokens, ServerConfig, TransportConfig, TransportType};
use rmcp::transport::IntoTransport;
use rmcp::{RoleClient, ServiceExt};

pub use http::{validate_url, HttpTransport};
pub use retry::StreamRetryPolicy;
pub use stdio::{merge_environment, StdioTransport};

use super::handler::{McpClient, McpClientHandler};
use super::oauth::OAuthProvider;

/// Result of a transport connection attempt
pub enum TransportConnectResult {
    /// Successfully connected
    Connected(McpClient),
    /// Server demands authorization
    OAuthRequired { server_url: String },
    /// Connection failed
    Failed(String),
}

impl std::fmt::Debug for TransportConnectResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected(_) => write!(f, "Connected"),
            Self::OAuthRequired { server_url } => write!(f, "OAuthRequired({})", server_url),
            Self::Failed(error) => write!(f, "Failed({})", error),
        }
    }
}

/// Transport trait for MCP connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dial the server and run the handshake with `handler` answering
    /// server-initiated requests.
    async fn connect(&self, handler: McpClientHandler) -> TransportConnectResult;

    fn transport_type(&self) -> TransportType;

    /// Description for logging
    fn description(&self) -> String;
}

/// Everything a transport needs besides the configuration itself.
#[derive(Clone)]
pub struct TransportOptions {
    pub tokens: Option<OAuthTokens>,
    pub oauth: Option<OAuthProvider>,
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            tokens: None,
            oauth: None,
            connect_timeout: Duration::from_secs(60),
        }
    }
}

/// Factory for creating transport instances
pub struct TransportFactory;

impl TransportFactory {
    /// Run the configuration and security policy without building anything.
    pub fn validate(config: &ServerConfig) -> McpClientResult<()> {
        match &config.transport {
            TransportConfig::Stdio { command, .. } => StdioTransport::validate(&config.id, command),
            TransportConfig::Http { url, .. } => validate_url(&config.id, url).map(|_| ()),
        }
    }

    pub fn create(config: &ServerConfig, options: TransportOptions) -> McpClientResult<Box<dyn Transport>> {
        Self::validate(config)?;
        match &config.transport {
            TransportConfig::Stdio { command, args, env } => Ok(Box::new(StdioTransport::new(
                config.id.clone(),
                command.clone(),
                args.clone(),
                env.clone(),
                options.connect_timeout,
            ))),
            TransportConfig::Http {
                url,
                headers,
                stream_retry,
            } => Ok(Box::new(HttpTransport::new(
                config.id.clone(),
                url.clone(),
                headers.clone(),
                stream_retry.clone().unwrap_or_default(),
                options,
            ))),
        }
    }
}

/// Run the MCP handshake over `transport`, bounded by `timeout`.
pub(crate) async fn handshake<T, E, A>(
    handler: McpClientHandler,
    transport: T,
    timeout: Duration,
) -> Result<McpClient, String>
where
    T: IntoTransport<RoleClient, E, A>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(timeout, handler.serve(transport)).await {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(e)) => Err(format!("MCP handshake failed: {:#}", e)),
        Err(_) => Err(format!("Connection timeout ({:?})", timeout)),
    }
}
