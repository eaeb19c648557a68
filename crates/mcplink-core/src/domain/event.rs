use serde::{Deserialize, Serialize};

use super::ConnectionState;

/// Connection lifecycle events broadcast to the host.
///
/// Serialized with a snake_case `type` tag:
/// ```json
/// { "type": "reconnect_scheduled", "server_id": "fs", "attempt": 2, "delay_ms": 2000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Registry state of a server changed
    StatusChanged {
        server_id: String,
        state: ConnectionState,
        generation: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A reconnection timer was armed
    ReconnectScheduled {
        server_id: String,
        attempt: u32,
        delay_ms: u64,
    },

    /// Backoff budget spent; the server stays disconnected until reset
    ReconnectExhausted { server_id: String, attempts: u32 },

    /// An authorization-code flow needs the user to visit a URL
    AuthorizationRequired {
        server_id: String,
        authorization_url: String,
    },

    ToolsChanged { server_id: String },

    ResourcesChanged { server_id: String },
}

impl ConnectionEvent {
    pub fn server_id(&self) -> &str {
        match self {
            ConnectionEvent::StatusChanged { server_id, .. }
            | ConnectionEvent::ReconnectScheduled { server_id, .. }
            | ConnectionEvent::ReconnectExhausted { server_id, .. }
            | ConnectionEvent::AuthorizationRequired { server_id, .. }
            | ConnectionEvent::ToolsChanged { server_id }
            | ConnectionEvent::ResourcesChanged { server_id } => server_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConnectionEvent::StatusChanged { .. } => "status_changed",
            ConnectionEvent::ReconnectScheduled { .. } => "reconnect_scheduled",
            ConnectionEvent::ReconnectExhausted { .. } => "reconnect_exhausted",
            ConnectionEvent::AuthorizationRequired { .. } => "authorization_required",
            ConnectionEvent::ToolsChanged { .. } => "tools_changed",
            ConnectionEvent::ResourcesChanged { .. } => "resources_changed",
        }
    }
}
