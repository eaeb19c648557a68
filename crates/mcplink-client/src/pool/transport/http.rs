//! HTTP transport for MCP servers
//!
//! Connects over Streamable HTTP. With an OAuth provider the connection goes
//! through rmcp's AuthClient so tokens refresh transparently; with bare
//! tokens the bearer header is injected on every request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_core::{
    McpClientError, McpClientResult, OAuthTokens, StreamRetryConfig, TransportType,
};
use rmcp::transport::auth::{AuthClient, AuthorizationManager};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

use super::retry::StreamRetryPolicy;
use super::{handshake, Transport, TransportConnectResult, TransportOptions};
use crate::pool::classify::{has_status, normalize};
use crate::pool::credential_store::MemoryCredentialStore;
use crate::pool::handler::{McpClient, McpClientHandler};
use crate::pool::oauth::OAuthProvider;

/// Parse `url` and apply the transport security policy: HTTPS everywhere,
/// plain HTTP only towards localhost or a loopback address.
pub fn validate_url(server_id: &str, url: &str) -> McpClientResult<Url> {
    let url = url.trim();
    if url.is_empty() {
        return Err(McpClientError::configuration(
            server_id,
            "http transport requires a url",
        ));
    }
    let parsed = Url::parse(url)
        .map_err(|e| McpClientError::configuration(server_id, format!("Invalid URL '{}': {}", url, e)))?;

    let local = is_loopback(&parsed);
    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if local => Ok(parsed),
        scheme if local => Err(McpClientError::configuration(
            server_id,
            format!("unsupported URL scheme '{}'", scheme),
        )),
        scheme => Err(McpClientError::security(
            server_id,
            format!(
                "refusing {} connection to remote host {}; HTTPS is required outside localhost",
                scheme,
                parsed.host_str().unwrap_or_default()
            ),
        )),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// HTTP transport for Streamable HTTP MCP servers
pub struct HttpTransport {
    server_id: String,
    url: String,
    headers: HashMap<String, String>,
    stream_retry: StreamRetryConfig,
    tokens: Option<OAuthTokens>,
    oauth: Option<OAuthProvider>,
    connect_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        server_id: String,
        url: String,
        headers: HashMap<String, String>,
        stream_retry: StreamRetryConfig,
        options: TransportOptions,
    ) -> Self {
        Self {
            server_id,
            url,
            headers,
            stream_retry,
            tokens: options.tokens,
            oauth: options.oauth,
            connect_timeout: options.connect_timeout,
        }
    }

    /// Check if an error indicates OAuth is required
    fn requires_oauth(error_str: &str) -> bool {
        let error_lower = normalize(error_str);
        let oauth_indicators = [
            "unauthorized",
            "authrequired",
            "auth required",
            "invalid_token",
            "www-authenticate",
            "access token",
            "missing or invalid",
        ];
        has_status(&error_lower, "401") || oauth_indicators.iter().any(|s| error_lower.contains(s))
    }

    fn transport_config(&self) -> StreamableHttpClientTransportConfig {
        let mut config = StreamableHttpClientTransportConfig::with_uri(self.url.as_str());
        config.retry_config = Arc::new(StreamRetryPolicy::new(self.stream_retry.clone()));
        config
    }

    /// Build a reqwest HeaderMap from the configured headers.
    fn build_default_headers(&self) -> Result<reqwest::header::HeaderMap, String> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in &self.headers {
            let header_name =
                reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    let err = format!("Invalid header name '{}': {}", key, e);
                    error!(server_id = %self.server_id, "[HttpTransport] {}", err);
                    err
                })?;
            let header_value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
                let err = format!("Invalid header value for '{}': {}", key, e);
                error!(server_id = %self.server_id, "[HttpTransport] {}", err);
                err
            })?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }

    fn build_http_client(
        &self,
        header_map: reqwest::header::HeaderMap,
    ) -> Result<reqwest::Client, String> {
        reqwest::Client::builder()
            .default_headers(header_map)
            .build()
            .map_err(|e| {
                let err = format!("Failed to build HTTP client: {}", e);
                error!(server_id = %self.server_id, "[HttpTransport] {}", err);
                err
            })
    }

    /// Map a handshake outcome, turning auth-looking failures into OAuthRequired.
    async fn finish(&self, result: Result<McpClient, String>, mode: &str) -> TransportConnectResult {
        match result {
            Ok(client) => {
                info!(server_id = %self.server_id, mode, "[HttpTransport] HTTP server connected");
                TransportConnectResult::Connected(client)
            }
            Err(err) if Self::requires_oauth(&err) => {
                info!(
                    server_id = %self.server_id,
                    mode,
                    "[HttpTransport] Server requires OAuth authentication"
                );
                if let Some(provider) = &self.oauth {
                    provider.redirect_to_authorization().await;
                }
                TransportConnectResult::OAuthRequired {
                    server_url: self.url.clone(),
                }
            }
            Err(err) => {
                error!(server_id = %self.server_id, mode, "[HttpTransport] {}", err);
                TransportConnectResult::Failed(err)
            }
        }
    }

    /// Connect through rmcp's AuthClient, seeded with the known registration and tokens.
    async fn connect_with_auth(
        &self,
        handler: McpClientHandler,
        provider: &OAuthProvider,
        header_map: reqwest::header::HeaderMap,
    ) -> TransportConnectResult {
        debug!(
            server_id = %self.server_id,
            header_count = header_map.len(),
            "[HttpTransport] Connecting with OAuth via CredentialStore"
        );

        let mut auth_manager = match AuthorizationManager::new(self.url.as_str()).await {
            Ok(m) => m,
            Err(e) => {
                let err = format!("Failed to create auth manager: {}", e);
                error!(server_id = %self.server_id, "[HttpTransport] {}", err);
                return TransportConnectResult::Failed(err);
            }
        };
        auth_manager.set_credential_store(MemoryCredentialStore::new(provider.clone()));

        match auth_manager.initialize_from_store().await {
            Ok(true) => {
                debug!(server_id = %self.server_id, "[HttpTransport] Initialized from stored credentials");
            }
            Ok(false) => {
                debug!(server_id = %self.server_id, "[HttpTransport] No stored credentials found");
                provider.redirect_to_authorization().await;
                return TransportConnectResult::OAuthRequired {
                    server_url: self.url.clone(),
                };
            }
            Err(e) => {
                // Servers without discoverable metadata still accept the bearer token
                warn!(
                    server_id = %self.server_id,
                    error = %e,
                    "[HttpTransport] OAuth metadata discovery failed, trying manual token injection"
                );
                return self.connect_with_manual_token(handler, header_map).await;
            }
        }

        let base_client = match self.build_http_client(header_map) {
            Ok(c) => c,
            Err(err) => return TransportConnectResult::Failed(err),
        };
        let auth_client = AuthClient::new(base_client, auth_manager);
        let transport = StreamableHttpClientTransport::with_client(auth_client, self.transport_config());
        let result = handshake(handler, transport, self.connect_timeout).await;
        self.finish(result, "oauth").await
    }

    /// Connect with the bearer token injected as a default header. No refresh.
    async fn connect_with_manual_token(
        &self,
        handler: McpClientHandler,
        mut header_map: reqwest::header::HeaderMap,
    ) -> TransportConnectResult {
        let Some(tokens) = &self.tokens else {
            debug!(server_id = %self.server_id, "[HttpTransport] No stored token for manual injection");
            if let Some(provider) = &self.oauth {
                provider.redirect_to_authorization().await;
            }
            return TransportConnectResult::OAuthRequired {
                server_url: self.url.clone(),
            };
        };

        let auth_value = format!("Bearer {}", tokens.access_token);
        match reqwest::header::HeaderValue::from_str(&auth_value) {
            Ok(val) => {
                header_map.insert(reqwest::header::AUTHORIZATION, val);
            }
            Err(e) => {
                let err = format!("Invalid token format: {}", e);
                error!(server_id = %self.server_id, "[HttpTransport] {}", err);
                return TransportConnectResult::Failed(err);
            }
        }

        let client = match self.build_http_client(header_map) {
            Ok(c) => c,
            Err(err) => return TransportConnectResult::Failed(err),
        };
        let transport = StreamableHttpClientTransport::with_client(client, self.transport_config());
        let result = handshake(handler, transport, self.connect_timeout).await;
        self.finish(result, "bearer").await
    }

    async fn connect_without_auth(
        &self,
        handler: McpClientHandler,
        header_map: reqwest::header::HeaderMap,
    ) -> TransportConnectResult {
        debug!(
            server_id = %self.server_id,
            header_count = header_map.len(),
            "[HttpTransport] Trying connection without auth"
        );
        let client = match self.build_http_client(header_map) {
            Ok(c) => c,
            Err(err) => return TransportConnectResult::Failed(err),
        };
        let transport = StreamableHttpClientTransport::with_client(client, self.transport_config());
        let result = handshake(handler, transport, self.connect_timeout).await;
        self.finish(result, "plain").await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, handler: McpClientHandler) -> TransportConnectResult {
        info!(
            server_id = %self.server_id,
            url = %self.url,
            "[HttpTransport] Connecting to HTTP server"
        );

        if let Err(e) = validate_url(&self.server_id, &self.url) {
            return TransportConnectResult::Failed(e.message().to_string());
        }

        let header_map = match self.build_default_headers() {
            Ok(h) => h,
            Err(err) => return TransportConnectResult::Failed(err),
        };

        // An explicit Authorization header (e.g. a personal access token) wins over OAuth
        if header_map.contains_key(reqwest::header::AUTHORIZATION) {
            info!(
                server_id = %self.server_id,
                "[HttpTransport] Configured Authorization header, skipping OAuth"
            );
            return self.connect_without_auth(handler, header_map).await;
        }

        match (&self.oauth, &self.tokens) {
            (Some(provider), Some(_)) => self.connect_with_auth(handler, provider, header_map).await,
            (_, Some(_)) => self.connect_with_manual_token(handler, header_map).await,
            _ => self.connect_without_auth(handler, header_map).await,
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn description(&self) -> String {
        format!("http:{}", self.url)
    }
}
