//! Connection Service - server connection lifecycle
//!
//! ConnectionService is responsible for:
//! - Connecting to MCP servers through the [`Connector`] seam
//! - Preparing OAuth material before an HTTP dial
//! - Reacting to client errors and unexpected closes (see `reconnect`)
//! - Idle health checks for HTTP servers (see `health`)
//! - Operation-level retry for tool and resource calls (see `operations`)
//!
//! All registry mutations happen inside short synchronous closures; no record
//! lock is ever held across an `.await`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use mcplink_core::{
    ConnectionEvent, ConnectionState, GrantType, McpClientError, McpClientResult, OAuthConfig,
    OAuthDelegate, OAuthTokens, ServerConfig, ServerIdentity, TransportType,
};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::classify::{classify, to_client_error, ErrorClass};
use super::client::{ClientHandle, CloseNotifier};
use super::connector::{ConnectRequest, Connector};
use super::handler::McpClientHandler;
use super::oauth::{AuthSink, OAuthProvider};
use super::registry::{ConnectionRegistry, ConnectionSnapshot};
use super::transport::TransportFactory;
use crate::requests::RequestHandlerService;

/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Health-check ping timeout
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of a successful `connect_server` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Handshake completed; the record is `connected`
    Connected,
    /// No token yet for an authorization-code server. The record is
    /// `disconnected` and the user has to visit the URL, after which the host
    /// calls `complete_authorization`.
    AuthorizationPending { authorization_url: Option<String> },
}

enum OAuthPreparation {
    Ready {
        tokens: Option<OAuthTokens>,
        provider: Option<OAuthProvider>,
    },
    Pending(Option<String>),
}

/// How a successful handshake lands in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    /// Create the record if needed
    Upsert,
    /// Only update an existing record; a record removed mid-dial stays removed
    Existing,
}

pub struct ConnectionServiceBuilder {
    registry: Arc<ConnectionRegistry>,
    connector: Arc<dyn Connector>,
    requests: Arc<RequestHandlerService>,
    oauth_delegate: Option<Arc<dyn OAuthDelegate>>,
    event_tx: Option<broadcast::Sender<ConnectionEvent>>,
    connect_timeout: Duration,
    health_check_timeout: Duration,
}

impl ConnectionServiceBuilder {
    pub fn with_oauth_delegate(mut self, delegate: Arc<dyn OAuthDelegate>) -> Self {
        self.oauth_delegate = Some(delegate);
        self
    }

    pub fn with_event_tx(mut self, event_tx: broadcast::Sender<ConnectionEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn with_settings(mut self, connect_timeout: Duration, health_check_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.health_check_timeout = health_check_timeout;
        self
    }

    pub fn build(self) -> Arc<ConnectionService> {
        let event_tx = self
            .event_tx
            .unwrap_or_else(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0);
        Arc::new_cyclic(|weak| ConnectionService {
            registry: self.registry,
            connector: self.connector,
            requests: self.requests,
            oauth_delegate: self.oauth_delegate,
            event_tx,
            connect_timeout: self.connect_timeout,
            health_check_timeout: self.health_check_timeout,
            known_configs: DashMap::new(),
            weak: weak.clone(),
        })
    }
}

/// Connection Service handles server connection lifecycle
pub struct ConnectionService {
    pub(crate) registry: Arc<ConnectionRegistry>,
    connector: Arc<dyn Connector>,
    requests: Arc<RequestHandlerService>,
    pub(crate) oauth_delegate: Option<Arc<dyn OAuthDelegate>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    connect_timeout: Duration,
    pub(crate) health_check_timeout: Duration,
    /// Configurations the host registered, connected or not
    known_configs: DashMap<String, ServerConfig>,
    /// Timers and close notifiers hold this instead of a strong reference
    pub(crate) weak: Weak<ConnectionService>,
}

impl ConnectionService {
    pub fn builder(
        registry: Arc<ConnectionRegistry>,
        connector: Arc<dyn Connector>,
        requests: Arc<RequestHandlerService>,
    ) -> ConnectionServiceBuilder {
        ConnectionServiceBuilder {
            registry,
            connector,
            requests,
            oauth_delegate: None,
            event_tx: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
        }
    }

    pub fn new(
        registry: Arc<ConnectionRegistry>,
        connector: Arc<dyn Connector>,
        requests: Arc<RequestHandlerService>,
    ) -> Arc<Self> {
        Self::builder(registry, connector, requests).build()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    pub fn snapshot(&self, server_id: &str) -> Option<ConnectionSnapshot> {
        self.registry.snapshot(server_id)
    }

    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.registry.snapshots()
    }

    /// Make a configuration known so `connect_server_by_id` can find it.
    pub fn register_config(&self, config: ServerConfig) {
        debug!(server_id = %config.id, "[ConnectionService] Registered configuration");
        self.known_configs.insert(config.id.clone(), config);
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        let kind = event.type_name();
        if self.event_tx.send(event).is_err() {
            debug!(event = kind, "[ConnectionService] No event subscribers");
        }
    }

    pub(crate) fn emit_status(
        &self,
        server_id: &str,
        state: ConnectionState,
        generation: u64,
        message: Option<String>,
    ) {
        self.emit(ConnectionEvent::StatusChanged {
            server_id: server_id.to_string(),
            state,
            generation,
            message,
        });
    }

    fn config_for(&self, server_id: &str) -> McpClientResult<ServerConfig> {
        self.registry
            .read(server_id, |r| r.config.clone())
            .or_else(|| self.known_configs.get(server_id).map(|c| c.value().clone()))
            .ok_or_else(|| McpClientError::not_found(server_id))
    }

    /// Connect to a server and register it as `connected`.
    ///
    /// Configuration and security errors surface before anything is
    /// registered. Every other dial failure is returned as a connection error;
    /// retrying is up to the caller or the reconnection scheduler.
    pub async fn connect_server(&self, config: ServerConfig) -> McpClientResult<ConnectOutcome> {
        self.establish(config, Registration::Upsert).await
    }

    /// Connect using the stored configuration for `server_id`.
    pub async fn connect_server_by_id(&self, server_id: &str) -> McpClientResult<ConnectOutcome> {
        let config = self.config_for(server_id)?;
        self.connect_server(config).await
    }

    pub(crate) async fn establish(
        &self,
        config: ServerConfig,
        registration: Registration,
    ) -> McpClientResult<ConnectOutcome> {
        let server_id = config.id.clone();

        if let Err(e) = TransportFactory::validate(&config) {
            warn!(
                server_id = %server_id,
                error = %e,
                "[ConnectionService] Rejected server configuration"
            );
            return Err(e);
        }
        if registration == Registration::Upsert || self.registry.contains(&server_id) {
            self.known_configs.insert(server_id.clone(), config.clone());
        }

        info!(
            server_id = %server_id,
            transport = %config.transport_type(),
            "[ConnectionService] Connecting"
        );

        let (tokens, oauth_provider) = match config.http_oauth() {
            Some(descriptor) => match self.prepare_oauth(&config, descriptor, registration).await? {
                OAuthPreparation::Ready { tokens, provider } => (tokens, provider),
                OAuthPreparation::Pending(authorization_url) => {
                    info!(
                        server_id = %server_id,
                        "[ConnectionService] Waiting for user authorization"
                    );
                    let generation = self
                        .registry
                        .read(&server_id, |r| r.generation)
                        .unwrap_or_default();
                    self.emit_status(
                        &server_id,
                        ConnectionState::Disconnected,
                        generation,
                        Some("authorization required".to_string()),
                    );
                    return Ok(ConnectOutcome::AuthorizationPending { authorization_url });
                }
            },
            None => (None, None),
        };

        let generation = self.registry.next_generation();
        let handler = McpClientHandler::new(
            ServerIdentity::new(&server_id, config.display_name()),
            Arc::clone(&self.requests),
            Arc::clone(&self.registry),
            Some(self.event_tx.clone()),
        );
        let request = ConnectRequest {
            config: config.clone(),
            handler,
            tokens: tokens.clone(),
            oauth_provider,
            close_notifier: CloseNotifier::new(self.weak.clone(), &server_id, generation),
            connect_timeout: self.connect_timeout,
        };

        let client = match self.connector.connect(request).await {
            Ok(client) => client,
            Err(e) => {
                let err = match e {
                    McpClientError::Configuration { .. }
                    | McpClientError::Security { .. }
                    | McpClientError::Auth { .. }
                    | McpClientError::Connection { .. } => e,
                    other => McpClientError::connection(&server_id, other.message()),
                };
                error!(
                    server_id = %server_id,
                    error = %err,
                    "[ConnectionService] Connection failed"
                );
                self.registry.update(&server_id, |r| {
                    r.last_error = Some(err.clone());
                });
                return Err(err);
            }
        };

        let capabilities = client.capabilities();
        let apply = |record: &mut super::registry::ConnectionRecord| {
            let previous = record.client.replace(Arc::clone(&client));
            record.replace_config(config.clone());
            record.state = ConnectionState::Connected;
            record.generation = generation;
            record.retry.reset();
            record.last_error = None;
            record.pending_auth_url = None;
            record.last_activity = Instant::now();
            record.invalidate_cache();
            record.capabilities = capabilities.clone();
            record.cancel_reconnect_timer();
            if let Some(tokens) = &tokens {
                record.set_tokens(tokens.clone());
            }
            previous
        };
        let previous = match registration {
            Registration::Upsert => Some(self.registry.upsert(&config, apply)),
            Registration::Existing => self.registry.update(&server_id, apply),
        };

        let Some(previous) = previous else {
            info!(
                server_id = %server_id,
                "[ConnectionService] Server removed while connecting, closing new connection"
            );
            self.close_quietly(&server_id, client).await;
            return Err(McpClientError::not_found(&server_id));
        };
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &client) {
                self.close_quietly(&server_id, previous).await;
            }
        }

        info!(
            server_id = %server_id,
            generation,
            transport = %client.description(),
            "[ConnectionService] Connected"
        );
        self.emit_status(&server_id, ConnectionState::Connected, generation, None);

        if config.transport_type() == TransportType::Http {
            self.schedule_health_check(&server_id);
        }
        Ok(ConnectOutcome::Connected)
    }

    /// Complete the OAuth descriptor and obtain a usable token, or start the
    /// authorization-code flow when there is none.
    ///
    /// Under `Registration::Existing` a record that disappeared (cleanup or
    /// removal while reconnecting) is never recreated.
    async fn prepare_oauth(
        &self,
        config: &ServerConfig,
        descriptor: &OAuthConfig,
        registration: Registration,
    ) -> McpClientResult<OAuthPreparation> {
        let server_id = config.id.as_str();
        let seed = |record: &mut super::registry::ConnectionRecord| {
            record.replace_config(config.clone());
            record.tokens()
        };
        let known_tokens = match registration {
            Registration::Upsert => self.registry.upsert(config, seed),
            Registration::Existing => self
                .registry
                .update(server_id, seed)
                .ok_or_else(|| McpClientError::not_found(server_id))?,
        };

        let delegate = self.oauth_delegate.clone();
        let descriptor = match &delegate {
            Some(delegate) => delegate
                .ensure_oauth_config(server_id, descriptor)
                .await
                .map_err(|e| {
                    McpClientError::auth(server_id, format!("OAuth configuration incomplete: {:#}", e))
                })?,
            None => descriptor.clone(),
        };
        self.registry
            .update(server_id, |r| r.set_oauth_config(descriptor.clone()));

        let tokens = match (known_tokens.or_else(|| descriptor.tokens.clone()), &delegate) {
            (Some(tokens), Some(delegate)) => {
                match delegate.ensure_valid_token(server_id, &descriptor, &tokens).await {
                    Ok(valid) => Some(valid),
                    Err(e) => {
                        warn!(
                            server_id = %server_id,
                            error = %e,
                            "[ConnectionService] Stored token unusable, starting a new grant"
                        );
                        None
                    }
                }
            }
            (tokens, _) => tokens,
        };

        let sink = AuthSink::new(Arc::clone(&self.registry), server_id, Some(self.event_tx.clone()));
        match (tokens, descriptor.grant_type) {
            (Some(tokens), GrantType::AuthorizationCode) => {
                self.registry.update(server_id, |r| r.set_tokens(tokens.clone()));
                let provider =
                    OAuthProvider::new(server_id, descriptor, Some(tokens.clone()), delegate, sink);
                Ok(OAuthPreparation::Ready {
                    tokens: Some(tokens),
                    provider: Some(provider),
                })
            }
            (Some(tokens), GrantType::ClientCredentials) => {
                self.registry.update(server_id, |r| r.set_tokens(tokens.clone()));
                Ok(OAuthPreparation::Ready {
                    tokens: Some(tokens),
                    provider: None,
                })
            }
            (None, GrantType::ClientCredentials) => {
                let delegate = delegate.ok_or_else(|| {
                    McpClientError::auth(server_id, "client_credentials grant requires an OAuth delegate")
                })?;
                debug!(server_id = %server_id, "[ConnectionService] Running client credentials grant");
                let tokens = delegate
                    .client_credentials(server_id, &descriptor)
                    .await
                    .map_err(|e| {
                        McpClientError::auth(server_id, format!("client credentials grant failed: {:#}", e))
                    })?;
                self.registry.update(server_id, |r| r.set_tokens(tokens.clone()));
                Ok(OAuthPreparation::Ready {
                    tokens: Some(tokens),
                    provider: None,
                })
            }
            (None, GrantType::AuthorizationCode) => {
                self.registry.update(server_id, |r| {
                    r.state = ConnectionState::Disconnected;
                });
                let provider = OAuthProvider::new(server_id, descriptor, None, delegate, sink);
                Ok(OAuthPreparation::Pending(provider.redirect_to_authorization().await))
            }
        }
    }

    /// Completion hook for the authorization-code flow: store the tokens the
    /// host obtained and connect.
    pub async fn complete_authorization(
        &self,
        server_id: &str,
        tokens: OAuthTokens,
    ) -> McpClientResult<ConnectOutcome> {
        let config = self.config_for(server_id)?;
        if config.http_oauth().is_none() {
            return Err(McpClientError::configuration(
                server_id,
                "server has no OAuth descriptor",
            ));
        }

        self.registry.upsert(&config, |record| {
            record.set_tokens(tokens.clone());
            record.pending_auth_url = None;
        });
        if let Some(delegate) = &self.oauth_delegate {
            if let Err(e) = delegate.store_tokens(server_id, &tokens).await {
                warn!(
                    server_id = %server_id,
                    error = %e,
                    "[ConnectionService] Failed to persist tokens"
                );
            }
        }

        info!(server_id = %server_id, "[ConnectionService] Authorization completed");
        self.connect_server(config).await
    }

    /// Refresh the token of an OAuth server through the delegate. Returns
    /// whether a token is available afterwards.
    pub(crate) async fn refresh_token(&self, server_id: &str) -> bool {
        let Some(session) = self.registry.read(server_id, |r| r.oauth.clone()).flatten() else {
            return false;
        };
        let (Some(tokens), Some(delegate)) = (session.tokens, &self.oauth_delegate) else {
            return false;
        };
        match delegate
            .ensure_valid_token(server_id, &session.config, &tokens)
            .await
        {
            Ok(fresh) => {
                self.registry.update(server_id, |r| r.set_tokens(fresh));
                true
            }
            Err(e) => {
                warn!(
                    server_id = %server_id,
                    error = %e,
                    "[ConnectionService] Token refresh failed"
                );
                false
            }
        }
    }

    /// Error callback from a live connection, a health check or an operation.
    ///
    /// `generation` is the connection generation the error belongs to; errors
    /// from an older generation are ignored.
    pub fn handle_client_error(&self, server_id: &str, generation: Option<u64>, message: &str) {
        let class = classify(message);
        let outcome = self.registry.update(server_id, |record| {
            if generation.is_some_and(|g| g != record.generation)
                || record.state == ConnectionState::Reconnecting
                || (record.state == ConnectionState::Disconnected && record.client.is_none())
            {
                return None;
            }
            record.mark_disconnected(Some(to_client_error(server_id, message)));
            let transport = record.transport_type();
            let drop_client = match transport {
                TransportType::Stdio => true,
                TransportType::Http => class == ErrorClass::Session,
            };
            let client = if drop_client { record.client.take() } else { None };
            Some((transport, client, record.generation))
        });

        let (transport, client, current) = match outcome {
            Some(Some(outcome)) => outcome,
            Some(None) => {
                debug!(
                    server_id = %server_id,
                    generation = ?generation,
                    "[ConnectionService] Ignoring stale client error"
                );
                return;
            }
            None => {
                debug!(server_id = %server_id, "[ConnectionService] Error for unknown server");
                return;
            }
        };

        warn!(
            server_id = %server_id,
            transport = %transport,
            class = ?class,
            error = %message,
            "[ConnectionService] Client error"
        );
        self.emit_status(
            server_id,
            ConnectionState::Disconnected,
            current,
            Some(message.to_string()),
        );
        if let Some(client) = client {
            self.spawn_close(server_id, client);
        }

        match (transport, class) {
            (TransportType::Stdio, _) => self.schedule_reconnection(server_id),
            (TransportType::Http, ErrorClass::Session) => {
                info!(
                    server_id = %server_id,
                    "[ConnectionService] Session lost, scheduling full reconnection"
                );
                self.schedule_reconnection(server_id);
            }
            (TransportType::Http, ErrorClass::Auth) => {
                warn!(
                    server_id = %server_id,
                    "[ConnectionService] Authorization rejected, deferring to the caller"
                );
            }
            (TransportType::Http, ErrorClass::Transient) => {
                debug!(
                    server_id = %server_id,
                    "[ConnectionService] Leaving recovery to the streaming transport"
                );
            }
        }
    }

    /// Close callback: the connection of `generation` ended without being
    /// asked to. Always schedules exactly one reconnection.
    pub fn handle_close(&self, server_id: &str, generation: u64, reason: &str) {
        let outcome = self.registry.update(server_id, |record| {
            if record.generation != generation
                || record.state == ConnectionState::Reconnecting
                || record.client.is_none()
            {
                return None;
            }
            record.mark_disconnected(Some(McpClientError::connection(
                server_id,
                format!("connection closed: {}", reason),
            )));
            record.client.take()
        });

        let Some(Some(client)) = outcome else {
            debug!(
                server_id = %server_id,
                generation,
                "[ConnectionService] Ignoring close of a superseded connection"
            );
            return;
        };

        warn!(
            server_id = %server_id,
            generation,
            reason = %reason,
            "[ConnectionService] Connection closed unexpectedly"
        );
        self.emit_status(
            server_id,
            ConnectionState::Disconnected,
            generation,
            Some(format!("connection closed: {}", reason)),
        );
        self.spawn_close(server_id, client);
        self.schedule_reconnection(server_id);
    }

    /// Remove a server entirely, closing its connection.
    pub async fn remove_server(&self, server_id: &str) -> McpClientResult<()> {
        self.known_configs.remove(server_id);
        let client = self
            .registry
            .remove(server_id)
            .ok_or_else(|| McpClientError::not_found(server_id))?;
        if let Some(client) = client {
            self.close_quietly(server_id, client).await;
        }
        info!(server_id = %server_id, "[ConnectionService] Server removed");
        self.emit_status(
            server_id,
            ConnectionState::Disconnected,
            0,
            Some("removed".to_string()),
        );
        Ok(())
    }

    /// Close every connection and cancel every timer. Individual close
    /// failures are logged and never abort the teardown.
    pub async fn cleanup(&self) {
        let clients = self.registry.drain();
        let count = clients.len();
        info!(count, "[ConnectionService] Closing all connections");

        let closes = clients.into_iter().map(|(server_id, client)| async move {
            if let Err(e) = client.close().await {
                warn!(
                    server_id = %server_id,
                    error = %e,
                    "[ConnectionService] Failed to close connection"
                );
            }
        });
        futures::future::join_all(closes).await;

        info!(count, "[ConnectionService] Cleanup complete");
    }

    pub(crate) async fn close_quietly(&self, server_id: &str, client: Arc<dyn ClientHandle>) {
        if let Err(e) = client.close().await {
            debug!(
                server_id = %server_id,
                error = %e,
                "[ConnectionService] Ignoring close failure"
            );
        }
    }

    /// Close from a synchronous callback.
    fn spawn_close(&self, server_id: &str, client: Arc<dyn ClientHandle>) {
        let server_id = server_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.close().await {
                debug!(
                    server_id = %server_id,
                    error = %e,
                    "[ConnectionService] Ignoring close failure"
                );
            }
        });
    }
}
