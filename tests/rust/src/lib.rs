//! Shared test utilities and fixtures for mcplink integration tests.

pub use mcplink_core::{ConnectionEvent, ConnectionState, ServerConfig};

/// Mock collaborator implementations
pub mod mocks;
pub use mocks::{ConnectScript, MockClient, MockConnector, MockOAuthDelegate, MockSamplingHost, PingBehavior};

pub use services::ConnectionServiceTestHarness;

/// Event testing utilities
pub mod events {
    use mcplink_core::{ConnectionEvent, ConnectionState};
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// Create a test event channel with sufficient capacity
    pub fn test_event_channel() -> (
        broadcast::Sender<ConnectionEvent>,
        broadcast::Receiver<ConnectionEvent>,
    ) {
        broadcast::channel(256)
    }

    /// Everything already sitting in the receiver, without waiting
    pub fn drain_events(rx: &mut broadcast::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for a specific event
    pub async fn wait_for_event<F>(
        rx: &mut broadcast::Receiver<ConnectionEvent>,
        timeout: Duration,
        predicate: F,
    ) -> Option<ConnectionEvent>
    where
        F: Fn(&ConnectionEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) if predicate(&event) => return Some(event),
                Ok(Ok(_)) => continue,
                Ok(Err(_)) => return None,
                Err(_) => return None,
            }
        }
    }

    /// Whether a StatusChanged event for the server reached `expected`
    pub fn has_status(events: &[ConnectionEvent], expected_server_id: &str, expected: ConnectionState) -> bool {
        events.iter().any(|e| {
            matches!(
                e,
                ConnectionEvent::StatusChanged { server_id, state, .. }
                    if server_id == expected_server_id && *state == expected
            )
        })
    }

    /// Delays of every ReconnectScheduled event, in milliseconds
    pub fn scheduled_delays(events: &[ConnectionEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                ConnectionEvent::ReconnectScheduled { delay_ms, .. } => Some(*delay_ms),
                _ => None,
            })
            .collect()
    }
}

/// Server configuration fixtures
pub mod fixtures {
    use mcplink_core::{GrantType, OAuthConfig, ServerConfig};

    /// A stdio server; the mock connector never spawns the command
    pub fn stdio_server(id: &str) -> ServerConfig {
        ServerConfig::stdio(id, "mcp-test-server", vec!["--stdio".to_string()])
    }

    /// A remote HTTPS server
    pub fn http_server(id: &str) -> ServerConfig {
        ServerConfig::http(id, "https://mcp.example.com/mcp")
    }

    pub fn authorization_code_server(id: &str) -> ServerConfig {
        http_server(id).with_oauth(
            OAuthConfig::new(GrantType::AuthorizationCode).with_scopes(vec!["mcp".to_string()]),
        )
    }

    pub fn client_credentials_server(id: &str) -> ServerConfig {
        http_server(id).with_oauth(
            OAuthConfig::new(GrantType::ClientCredentials)
                .with_client("svc-client", Some("svc-secret".to_string())),
        )
    }
}

/// Let spawned tasks run without advancing the paused clock
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
