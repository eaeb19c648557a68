//! Client-side OAuth plumbing for HTTP connections
//!
//! [`OAuthProvider`] is handed to the HTTP transport. It carries the current
//! descriptor and tokens, knows how to start an authorization flow through the
//! host's [`OAuthDelegate`], and writes refreshed tokens back to the registry.

use std::sync::Arc;

use mcplink_core::{ConnectionEvent, OAuthConfig, OAuthDelegate, OAuthTokens};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::registry::ConnectionRegistry;

/// Where authorization state for one server is recorded.
#[derive(Clone)]
pub struct AuthSink {
    registry: Arc<ConnectionRegistry>,
    server_id: String,
    event_tx: Option<broadcast::Sender<ConnectionEvent>>,
}

impl AuthSink {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        server_id: impl Into<String>,
        event_tx: Option<broadcast::Sender<ConnectionEvent>>,
    ) -> Self {
        Self {
            registry,
            server_id: server_id.into(),
            event_tx,
        }
    }

    /// Remember the URL the user has to visit and tell subscribers about it.
    pub fn store_authorization_url(&self, url: &str) {
        let stored = self
            .registry
            .update(&self.server_id, |record| {
                record.pending_auth_url = Some(url.to_string());
            })
            .is_some();
        if !stored {
            debug!(server_id = %self.server_id, "[AuthSink] No record for authorization URL");
        }

        info!(server_id = %self.server_id, "[AuthSink] Authorization required");
        if let Some(tx) = &self.event_tx {
            let event = ConnectionEvent::AuthorizationRequired {
                server_id: self.server_id.clone(),
                authorization_url: url.to_string(),
            };
            if tx.send(event).is_err() {
                debug!(server_id = %self.server_id, "[AuthSink] No event subscribers");
            }
        }
    }

    pub fn tokens_updated(&self, tokens: &OAuthTokens) {
        self.registry.update(&self.server_id, |record| {
            record.set_tokens(tokens.clone());
        });
    }
}

/// OAuth state handed to one HTTP connection attempt.
#[derive(Clone)]
pub struct OAuthProvider {
    server_id: String,
    config: OAuthConfig,
    tokens: Option<OAuthTokens>,
    delegate: Option<Arc<dyn OAuthDelegate>>,
    sink: AuthSink,
}

impl OAuthProvider {
    pub fn new(
        server_id: impl Into<String>,
        config: OAuthConfig,
        tokens: Option<OAuthTokens>,
        delegate: Option<Arc<dyn OAuthDelegate>>,
        sink: AuthSink,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            config,
            tokens,
            delegate,
            sink,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> Option<&OAuthTokens> {
        self.tokens.as_ref()
    }

    /// Ask the delegate for an authorization URL and record it as pending.
    /// Returns the URL when one could be produced.
    pub async fn redirect_to_authorization(&self) -> Option<String> {
        let delegate = self.delegate.as_ref()?;
        match delegate.authorization_url(&self.server_id, &self.config).await {
            Ok(url) => {
                self.sink.store_authorization_url(&url);
                Some(url)
            }
            Err(e) => {
                warn!(
                    server_id = %self.server_id,
                    error = %e,
                    "[OAuthProvider] Failed to build authorization URL"
                );
                None
            }
        }
    }

    /// Record tokens refreshed by the transport.
    pub async fn save_tokens(&self, tokens: OAuthTokens) {
        self.sink.tokens_updated(&tokens);
        if let Some(delegate) = &self.delegate {
            if let Err(e) = delegate.store_tokens(&self.server_id, &tokens).await {
                warn!(
                    server_id = %self.server_id,
                    error = %e,
                    "[OAuthProvider] Failed to persist refreshed tokens"
                );
            }
        }
    }
}
