use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default idle window before an HTTP health-check ping.
pub const DEFAULT_HEALTH_CHECK_IDLE_MINUTES: u64 = 5;

/// Configuration of one MCP server, as supplied by the host.
///
/// Immutable for the duration of a connection attempt; reconnection reuses
/// the copy stored on the connection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Unique server identifier, the registry key
    pub id: String,

    /// Display name (falls back to the identifier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub transport: TransportConfig,

    /// OAuth descriptor, only meaningful for HTTP servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthConfig>,

    #[serde(default = "default_true")]
    pub health_check_enabled: bool,

    #[serde(default = "default_idle_minutes")]
    pub health_check_idle_minutes: u64,
}

fn default_true() -> bool {
    true
}

fn default_idle_minutes() -> u64 {
    DEFAULT_HEALTH_CHECK_IDLE_MINUTES
}

impl ServerConfig {
    pub fn stdio(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self::new(
            id,
            TransportConfig::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
            },
        )
    }

    pub fn http(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(
            id,
            TransportConfig::Http {
                url: url.into(),
                headers: HashMap::new(),
                stream_retry: None,
            },
        )
    }

    fn new(id: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            id: id.into(),
            name: None,
            transport,
            oauth: None,
            health_check_enabled: true,
            health_check_idle_minutes: DEFAULT_HEALTH_CHECK_IDLE_MINUTES,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_oauth(mut self, oauth: OAuthConfig) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub fn with_health_check(mut self, enabled: bool, idle_minutes: u64) -> Self {
        self.health_check_enabled = enabled;
        self.health_check_idle_minutes = idle_minutes;
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport.transport_type()
    }

    /// OAuth descriptor if this is an HTTP server; stdio servers never authenticate.
    pub fn http_oauth(&self) -> Option<&OAuthConfig> {
        match self.transport {
            TransportConfig::Http { .. } => self.oauth.as_ref(),
            TransportConfig::Stdio { .. } => None,
        }
    }

    pub fn health_check_idle(&self) -> Duration {
        Duration::from_secs(self.health_check_idle_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    Stdio,
    Http,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Stdio => write!(f, "stdio"),
            TransportType::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default, rename = "streamRetry", skip_serializing_if = "Option::is_none")]
        stream_retry: Option<StreamRetryConfig>,
    },
}

impl TransportConfig {
    pub fn transport_type(&self) -> TransportType {
        match self {
            TransportConfig::Stdio { .. } => TransportType::Stdio,
            TransportConfig::Http { .. } => TransportType::Http,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            TransportConfig::Http { url, .. } => Some(url),
            TransportConfig::Stdio { .. } => None,
        }
    }
}

/// Reconnection parameters for the streaming HTTP transport's own SSE retry.
///
/// Independent of the connection service's backoff, which only kicks in once
/// the transport gives up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRetryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_growth_factor() -> f64 {
    1.5
}

fn default_max_retries() -> usize {
    2
}

impl Default for StreamRetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            growth_factor: default_growth_factor(),
            max_retries: default_max_retries(),
        }
    }
}

impl StreamRetryConfig {
    /// Delay before the `retry`-th (0-based) stream reconnection, or `None` once
    /// the retry budget is spent.
    pub fn delay_for_retry(&self, retry: usize) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let growth = self.growth_factor.max(1.0).powi(exponent);
        let millis = (self.initial_delay_ms as f64 * growth).min(self.max_delay_ms as f64);
        Some(Duration::from_millis(millis as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
}

/// OAuth descriptor for an HTTP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    pub grant_type: GrantType,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Tokens already known to the host (e.g. restored from its token store)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<OAuthTokens>,
}

impl OAuthConfig {
    pub fn new(grant_type: GrantType) -> Self {
        Self {
            grant_type,
            scopes: Vec::new(),
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            tokens: None,
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>, client_secret: Option<String>) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = client_secret;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_tokens(mut self, tokens: OAuthTokens) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthTokens {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            token_type: default_token_type(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True if the token expires within `skew` from now. Tokens without an
    /// expiry never expire.
    pub fn is_expired(&self, skew: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - skew <= Utc::now(),
            None => false,
        }
    }

    /// Remaining lifetime, clamped at zero.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at.map(|expires_at| {
            let remaining = (expires_at - Utc::now()).num_seconds().max(0);
            Duration::from_secs(remaining as u64)
        })
    }
}
