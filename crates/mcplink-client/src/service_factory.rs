//! Service Factory - wiring of the client services
//!
//! Hosts get the registry, request handlers and connection service from one
//! call instead of assembling them by hand.

use std::sync::Arc;

use futures::future::join_all;
use mcplink_core::{
    ClientConfig, ConnectionEvent, McpClientResult, OAuthDelegate, SamplingHost,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::pool::{ConnectOutcome, ConnectionRegistry, ConnectionService, Connector, TransportConnector};
use crate::requests::RequestHandlerService;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Bundle of the client services
#[derive(Clone)]
pub struct ClientServices {
    pub registry: Arc<ConnectionRegistry>,
    pub connection_service: Arc<ConnectionService>,
    pub request_handlers: Arc<RequestHandlerService>,
    pub event_tx: broadcast::Sender<ConnectionEvent>,
    config: ClientConfig,
}

impl ClientServices {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect every configured server concurrently. One failing server never
    /// prevents the others from connecting.
    pub async fn connect_all(&self) -> Vec<(String, McpClientResult<ConnectOutcome>)> {
        let attempts = self.config.servers.iter().map(|server| {
            let service = Arc::clone(&self.connection_service);
            let server = server.clone();
            async move {
                let id = server.id.clone();
                (id, service.connect_server(server).await)
            }
        });
        let results = join_all(attempts).await;

        let connected = results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(ConnectOutcome::Connected)))
            .count();
        for (server_id, result) in &results {
            if let Err(e) = result {
                warn!(
                    server_id = %server_id,
                    error = %e,
                    kind = e.name(),
                    "[ServiceFactory] Server failed to connect"
                );
            }
        }
        info!(
            total = results.len(),
            connected,
            "[ServiceFactory] Initial connections finished"
        );
        results
    }
}

/// Factory for creating client services
pub struct ServiceFactory;

impl ServiceFactory {
    /// Wire the services against real transports.
    pub fn create(
        config: ClientConfig,
        host: Arc<dyn SamplingHost>,
        oauth_delegate: Option<Arc<dyn OAuthDelegate>>,
    ) -> ClientServices {
        Self::create_with_connector(config, host, oauth_delegate, Arc::new(TransportConnector))
    }

    /// Same as [`ServiceFactory::create`] with a custom connector.
    pub fn create_with_connector(
        config: ClientConfig,
        host: Arc<dyn SamplingHost>,
        oauth_delegate: Option<Arc<dyn OAuthDelegate>>,
        connector: Arc<dyn Connector>,
    ) -> ClientServices {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry = Arc::new(ConnectionRegistry::new());
        let request_handlers = Arc::new(RequestHandlerService::new(host));

        let mut builder = ConnectionService::builder(
            Arc::clone(&registry),
            connector,
            Arc::clone(&request_handlers),
        )
        .with_event_tx(event_tx.clone())
        .with_settings(config.connect_timeout(), config.health_check_timeout());
        if let Some(delegate) = oauth_delegate {
            builder = builder.with_oauth_delegate(delegate);
        }
        let connection_service = builder.build();

        for server in &config.servers {
            connection_service.register_config(server.clone());
        }
        info!(
            servers = config.servers.len(),
            "[ServiceFactory] Client services created"
        );

        ClientServices {
            registry,
            connection_service,
            request_handlers,
            event_tx,
            config,
        }
    }
}
