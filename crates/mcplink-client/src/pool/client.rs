//! Live protocol client handles.
//!
//! The connection service talks to a connected server only through
//! [`ClientHandle`]; the rmcp-backed implementation also watches the running
//! service and reports an unexpected close back to the service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::model::{CallToolRequestParams, ClientRequest, PingRequest};
use rmcp::service::{Peer, RunningServiceCancellationToken};
use rmcp::RoleClient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::connection::ConnectionService;
use super::handler::McpClient;

/// Result of a tool call, content blocks kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<Value>,
    pub is_error: bool,
}

/// Operations the connection service issues against a connected server.
#[async_trait]
pub trait ClientHandle: Send + Sync {
    /// e.g. "stdio:mcp-fs" or "http:https://mcp.example.com/mcp"
    fn description(&self) -> String;

    /// Server capabilities from the handshake
    fn capabilities(&self) -> Option<Value>;

    async fn ping(&self) -> Result<()>;

    async fn list_tools(&self) -> Result<Vec<Value>>;

    async fn list_resources(&self) -> Result<Vec<Value>>;

    async fn call_tool(&self, name: &str, arguments: Option<Map<String, Value>>) -> Result<ToolCallResult>;

    /// Close the connection. Must not report a close back to the service.
    async fn close(&self) -> Result<()>;
}

/// Reports lifecycle callbacks for one connection generation.
///
/// Callbacks from an older generation are ignored by the service, so a
/// notifier outliving its connection is harmless.
#[derive(Clone)]
pub struct CloseNotifier {
    service: Weak<ConnectionService>,
    server_id: String,
    generation: u64,
}

impl CloseNotifier {
    pub(crate) fn new(service: Weak<ConnectionService>, server_id: impl Into<String>, generation: u64) -> Self {
        Self {
            service,
            server_id: server_id.into(),
            generation,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The connection went away without being asked to.
    pub fn notify_closed(&self, reason: &str) {
        match self.service.upgrade() {
            Some(service) => service.handle_close(&self.server_id, self.generation, reason),
            None => debug!(server_id = %self.server_id, "[CloseNotifier] Service gone, dropping close"),
        }
    }

    /// The connection reported an error but may still be alive.
    ///
    /// `RmcpClient` only reports closes; this is the entry point for hosts
    /// and custom [`Connector`](super::Connector) clients that observe
    /// errors on a live connection.
    pub fn notify_error(&self, message: &str) {
        match self.service.upgrade() {
            Some(service) => {
                service.handle_client_error(&self.server_id, Some(self.generation), message)
            }
            None => debug!(server_id = %self.server_id, "[CloseNotifier] Service gone, dropping error"),
        }
    }
}

/// [`ClientHandle`] over an rmcp running service.
pub struct RmcpClient {
    description: String,
    peer: Peer<RoleClient>,
    capabilities: Option<Value>,
    cancel: Mutex<Option<RunningServiceCancellationToken>>,
    closing: Arc<AtomicBool>,
}

impl RmcpClient {
    /// Take ownership of a running service and start watching it.
    pub fn spawn(client: McpClient, description: String, notifier: CloseNotifier) -> Self {
        let peer = client.peer().clone();
        let capabilities = client
            .peer_info()
            .and_then(|info| serde_json::to_value(&info.capabilities).ok());
        let cancel = client.cancellation_token();
        let closing = Arc::new(AtomicBool::new(false));

        let watch_closing = closing.clone();
        tokio::spawn(async move {
            let reason = match client.waiting().await {
                Ok(reason) => format!("{:?}", reason),
                Err(e) => format!("service task failed: {}", e),
            };
            if watch_closing.load(Ordering::SeqCst) {
                debug!(
                    server_id = %notifier.server_id(),
                    reason = %reason,
                    "[McpClient] Closed on request"
                );
                return;
            }
            warn!(
                server_id = %notifier.server_id(),
                generation = notifier.generation(),
                reason = %reason,
                "[McpClient] Connection closed unexpectedly"
            );
            notifier.notify_closed(&reason);
        });

        Self {
            description,
            peer,
            capabilities,
            cancel: Mutex::new(Some(cancel)),
            closing,
        }
    }
}

#[async_trait]
impl ClientHandle for RmcpClient {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn capabilities(&self) -> Option<Value> {
        self.capabilities.clone()
    }

    async fn ping(&self) -> Result<()> {
        self.peer
            .send_request(ClientRequest::PingRequest(PingRequest::default()))
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("MCP ping failed: {}", e))
    }

    async fn list_tools(&self) -> Result<Vec<Value>> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| anyhow!("MCP list_tools failed: {}", e))?;
        Ok(tools
            .into_iter()
            .map(|tool| serde_json::to_value(tool).unwrap_or(Value::Null))
            .collect())
    }

    async fn list_resources(&self) -> Result<Vec<Value>> {
        let resources = self
            .peer
            .list_all_resources()
            .await
            .map_err(|e| anyhow!("MCP list_resources failed: {}", e))?;
        Ok(resources
            .into_iter()
            .map(|resource| serde_json::to_value(resource).unwrap_or(Value::Null))
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Option<Map<String, Value>>) -> Result<ToolCallResult> {
        let params = CallToolRequestParams {
            name: name.to_string().into(),
            arguments,
            task: None,
            meta: None,
        };
        let result = self
            .peer
            .call_tool(params)
            .await
            .map_err(|e| anyhow!("MCP call_tool failed: {}", e))?;

        Ok(ToolCallResult {
            content: result
                .content
                .into_iter()
                .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
                .collect(),
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        Ok(())
    }
}
