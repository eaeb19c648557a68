//! OAuth client-side collaborator.
//!
//! The authorization server exchange and the token store live in the host.
//! The connection service only asks for valid tokens, flows and URLs.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{OAuthConfig, OAuthTokens};

#[async_trait]
pub trait OAuthDelegate: Send + Sync {
    /// Complete a partial descriptor (client registration, stored tokens).
    async fn ensure_oauth_config(&self, server_id: &str, config: &OAuthConfig) -> Result<OAuthConfig>;

    /// Return a token that is valid right now, refreshing if needed.
    async fn ensure_valid_token(
        &self,
        server_id: &str,
        config: &OAuthConfig,
        tokens: &OAuthTokens,
    ) -> Result<OAuthTokens>;

    /// Run the client-credentials grant.
    async fn client_credentials(&self, server_id: &str, config: &OAuthConfig) -> Result<OAuthTokens>;

    /// Start an authorization-code flow and return the URL the user must visit.
    async fn authorization_url(&self, server_id: &str, config: &OAuthConfig) -> Result<String>;

    /// Persist tokens obtained or refreshed on the client side.
    async fn store_tokens(&self, _server_id: &str, _tokens: &OAuthTokens) -> Result<()> {
        Ok(())
    }
}
