//! Operation-level calls with one recovery retry
//!
//! A session error means the remote forgot us: reconnect and retry. An auth
//! error means the token was rejected: refresh, reconnect and retry. Anything
//! else goes through the client-error path and is returned.

use std::future::Future;
use std::sync::Arc;

use mcplink_core::{ConnectionState, McpClientError, McpClientResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::classify::{classify, to_client_error, ErrorClass};
use super::client::{ClientHandle, ToolCallResult};
use super::connection::ConnectionService;

impl ConnectionService {
    pub async fn call_tool(
        &self,
        server_id: &str,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> McpClientResult<ToolCallResult> {
        self.with_recovery(server_id, "call_tool", |client| {
            let arguments = arguments.clone();
            async move { client.call_tool(name, arguments).await }
        })
        .await
    }

    /// Tools of `server_id`, served from cache while the connection lasts.
    pub async fn list_tools(&self, server_id: &str) -> McpClientResult<Vec<Value>> {
        let cached = self
            .registry
            .read(server_id, |r| {
                (r.state == ConnectionState::Connected)
                    .then(|| r.tools.clone())
                    .flatten()
            })
            .flatten();
        if let Some(tools) = cached {
            return Ok(tools);
        }

        let tools = self
            .with_recovery(server_id, "list_tools", |client| async move {
                client.list_tools().await
            })
            .await?;
        self.registry.update(server_id, |r| r.tools = Some(tools.clone()));
        Ok(tools)
    }

    /// Resources of `server_id`, served from cache while the connection lasts.
    pub async fn list_resources(&self, server_id: &str) -> McpClientResult<Vec<Value>> {
        let cached = self
            .registry
            .read(server_id, |r| {
                (r.state == ConnectionState::Connected)
                    .then(|| r.resources.clone())
                    .flatten()
            })
            .flatten();
        if let Some(resources) = cached {
            return Ok(resources);
        }

        let resources = self
            .with_recovery(server_id, "list_resources", |client| async move {
                client.list_resources().await
            })
            .await?;
        self.registry
            .update(server_id, |r| r.resources = Some(resources.clone()));
        Ok(resources)
    }

    /// Current client of a usable connection.
    async fn usable_client(&self, server_id: &str) -> McpClientResult<(Arc<dyn ClientHandle>, u64)> {
        let current = self
            .registry
            .read(server_id, |r| {
                (r.state == ConnectionState::Connected)
                    .then(|| r.client.clone().map(|c| (c, r.generation)))
                    .flatten()
            })
            .ok_or_else(|| McpClientError::not_found(server_id))?;
        if let Some(current) = current {
            return Ok(current);
        }

        if !self.is_server_available(server_id).await {
            return Err(McpClientError::connection(server_id, "server unavailable"));
        }
        self.registry
            .read(server_id, |r| r.client.clone().map(|c| (c, r.generation)))
            .flatten()
            .ok_or_else(|| McpClientError::connection(server_id, "server unavailable"))
    }

    async fn with_recovery<T, F, Fut>(&self, server_id: &str, operation: &str, call: F) -> McpClientResult<T>
    where
        F: Fn(Arc<dyn ClientHandle>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let (client, generation) = self.usable_client(server_id).await?;
        let message = match call(client).await {
            Ok(value) => {
                self.record_activity(server_id);
                return Ok(value);
            }
            Err(e) => format!("{:#}", e),
        };

        match classify(&message) {
            ErrorClass::Session => {
                warn!(
                    server_id = %server_id,
                    operation,
                    error = %message,
                    "[ConnectionService] Session error, reconnecting before retry"
                );
            }
            ErrorClass::Auth => {
                warn!(
                    server_id = %server_id,
                    operation,
                    error = %message,
                    "[ConnectionService] Authorization error, refreshing token before retry"
                );
                if !self.refresh_token(server_id).await {
                    debug!(server_id = %server_id, "[ConnectionService] No token to refresh");
                }
            }
            ErrorClass::Transient => {
                self.handle_client_error(server_id, Some(generation), &message);
                return Err(to_client_error(server_id, &message));
            }
        }

        self.force_reconnect(server_id).await?;
        let (client, generation) = self.usable_client(server_id).await?;
        match call(client).await {
            Ok(value) => {
                self.record_activity(server_id);
                Ok(value)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(
                    server_id = %server_id,
                    operation,
                    error = %message,
                    "[ConnectionService] Retry after recovery failed"
                );
                self.handle_client_error(server_id, Some(generation), &message);
                Err(to_client_error(server_id, &message))
            }
        }
    }
}
