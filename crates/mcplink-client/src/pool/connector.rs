//! Dialing seam between the connection service and the transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_core::{McpClientError, McpClientResult, OAuthTokens, ServerConfig};
use tracing::debug;

use super::client::{ClientHandle, CloseNotifier, RmcpClient};
use super::handler::McpClientHandler;
use super::oauth::OAuthProvider;
use super::transport::{TransportConnectResult, TransportFactory, TransportOptions};

/// Everything needed to open one connection generation.
pub struct ConnectRequest {
    pub config: ServerConfig,
    pub handler: McpClientHandler,
    pub tokens: Option<OAuthTokens>,
    pub oauth_provider: Option<OAuthProvider>,
    /// Must be told when the connection dies on its own.
    pub close_notifier: CloseNotifier,
    pub connect_timeout: Duration,
}

/// Opens connections. The production implementation goes through the
/// transport factory; tests substitute scripted connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: ConnectRequest) -> McpClientResult<Arc<dyn ClientHandle>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TransportConnector;

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(&self, request: ConnectRequest) -> McpClientResult<Arc<dyn ClientHandle>> {
        let ConnectRequest {
            config,
            handler,
            tokens,
            oauth_provider,
            close_notifier,
            connect_timeout,
        } = request;

        let transport = TransportFactory::create(
            &config,
            TransportOptions {
                tokens,
                oauth: oauth_provider,
                connect_timeout,
            },
        )?;
        let description = transport.description();
        debug!(server_id = %config.id, transport = %description, "[TransportConnector] Dialing");

        match transport.connect(handler).await {
            TransportConnectResult::Connected(client) => {
                Ok(Arc::new(RmcpClient::spawn(client, description, close_notifier)))
            }
            TransportConnectResult::OAuthRequired { server_url } => Err(McpClientError::auth(
                &config.id,
                format!("authorization required for {}", server_url),
            )),
            TransportConnectResult::Failed(message) => {
                Err(McpClientError::connection(&config.id, message))
            }
        }
    }
}
