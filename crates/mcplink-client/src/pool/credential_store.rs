//! In-memory CredentialStore adapter for rmcp's AuthClient.
//!
//! Seeds rmcp with the tokens the connection service already holds and feeds
//! tokens rmcp refreshes back through the [`OAuthProvider`].

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mcplink_core::OAuthTokens;
use oauth2::{basic::BasicTokenType, AccessToken, RefreshToken, TokenResponse};
use rmcp::transport::auth::{AuthError, CredentialStore, OAuthTokenResponse, StoredCredentials};
use tokio::sync::RwLock;
use tracing::debug;

use super::oauth::OAuthProvider;

pub struct MemoryCredentialStore {
    provider: OAuthProvider,
    credentials: RwLock<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new(provider: OAuthProvider) -> Self {
        let credentials = provider.tokens().map(|tokens| StoredCredentials {
            client_id: provider.config().client_id.clone().unwrap_or_default(),
            token_response: Some(to_token_response(tokens)),
        });
        Self {
            provider,
            credentials: RwLock::new(credentials),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<StoredCredentials>, AuthError> {
        Ok(self.credentials.read().await.clone())
    }

    async fn save(&self, credentials: StoredCredentials) -> Result<(), AuthError> {
        if let Some(response) = &credentials.token_response {
            debug!(
                server_id = %self.provider.server_id(),
                "[CredentialStore] Saving refreshed token"
            );
            self.provider.save_tokens(from_token_response(response)).await;
        }
        *self.credentials.write().await = Some(credentials);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        *self.credentials.write().await = None;
        debug!(server_id = %self.provider.server_id(), "[CredentialStore] Cleared tokens");
        Ok(())
    }
}

fn to_token_response(tokens: &OAuthTokens) -> OAuthTokenResponse {
    let expires_in = tokens.expires_at.map(|exp| {
        let remaining = exp - Utc::now();
        std::time::Duration::from_secs(remaining.num_seconds().max(0) as u64)
    });
    build_token_response(tokens.access_token.clone(), tokens.refresh_token.clone(), expires_in)
}

fn from_token_response(response: &OAuthTokenResponse) -> OAuthTokens {
    OAuthTokens {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
        expires_at: response
            .expires_in()
            .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64)),
        token_type: "Bearer".to_string(),
    }
}

/// Build an OAuthTokenResponse compatible with oauth2's StandardTokenResponse.
fn build_token_response(
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<std::time::Duration>,
) -> OAuthTokenResponse {
    use oauth2::{EmptyExtraTokenFields, StandardTokenResponse};

    let mut response = StandardTokenResponse::new(
        AccessToken::new(access_token),
        BasicTokenType::Bearer,
        EmptyExtraTokenFields {},
    );
    if let Some(refresh) = refresh_token {
        response.set_refresh_token(Some(RefreshToken::new(refresh)));
    }
    if let Some(expires) = expires_in {
        response.set_expires_in(Some(&expires));
    }
    response
}
