//! Error taxonomy for connection management.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to the host. Every variant names the affected server so
/// log lines can be correlated with registry state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum McpClientError {
    /// Missing command or URL; never retried
    #[error("[{server_id}] configuration error: {message}")]
    Configuration { server_id: String, message: String },

    /// Plain-HTTP remote URL; never retried
    #[error("[{server_id}] security error: {message}")]
    Security { server_id: String, message: String },

    /// Dial or handshake failure; retried per backoff policy
    #[error("[{server_id}] connection error: {message}")]
    Connection { server_id: String, message: String },

    /// Remote session lost; needs a full reconnect
    #[error("[{server_id}] session error: {message}")]
    Session { server_id: String, message: String },

    /// Credentials rejected or unavailable; left to the caller
    #[error("[{server_id}] authentication error: {message}")]
    Auth { server_id: String, message: String },

    /// Unclassified transport failure; left to the transport's own retry
    #[error("[{server_id}] transport error: {message}")]
    Transport { server_id: String, message: String },

    #[error("[{server_id}] server not found")]
    NotFound { server_id: String },
}

impl McpClientError {
    pub fn configuration(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn security(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Security {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn connection(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn session(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Session {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn auth(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn transport(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn not_found(server_id: impl Into<String>) -> Self {
        Self::NotFound {
            server_id: server_id.into(),
        }
    }

    /// Stable discriminant for hosts that match on error kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "ConfigurationError",
            Self::Security { .. } => "SecurityError",
            Self::Connection { .. } => "ConnectionError",
            Self::Session { .. } => "SessionError",
            Self::Auth { .. } => "AuthError",
            Self::Transport { .. } => "TransportError",
            Self::NotFound { .. } => "NotFoundError",
        }
    }

    pub fn server_id(&self) -> &str {
        match self {
            Self::Configuration { server_id, .. }
            | Self::Security { server_id, .. }
            | Self::Connection { server_id, .. }
            | Self::Session { server_id, .. }
            | Self::Auth { server_id, .. }
            | Self::Transport { server_id, .. }
            | Self::NotFound { server_id } => server_id,
        }
    }

    /// Message without the server prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Configuration { message, .. }
            | Self::Security { message, .. }
            | Self::Connection { message, .. }
            | Self::Session { message, .. }
            | Self::Auth { message, .. }
            | Self::Transport { message, .. } => message.clone(),
            Self::NotFound { .. } => "server not found".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Session { .. } | Self::Transport { .. }
        )
    }
}

pub type McpClientResult<T> = std::result::Result<T, McpClientError>;

/// Protocol-level error object returned to a server for a failed inbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("protocol error {code}: {message}")]
pub struct ProtocolError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProtocolError {
    pub const USER_REJECTED: i32 = -1;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self::new(Self::USER_REJECTED, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, message)
    }
}
