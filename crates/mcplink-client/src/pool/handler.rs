//! rmcp client handler
//!
//! One handler per connection. Inbound sampling, elicitation and logging
//! requests are routed into the [`RequestHandlerService`]; list-changed
//! notifications invalidate the record's caches.

use std::sync::Arc;

use mcplink_core::{ConnectionEvent, ServerIdentity};
use rmcp::model::{
    ClientInfo, CreateElicitationRequestParams, CreateElicitationResult,
    CreateMessageRequestParams, CreateMessageResult, ErrorData, Implementation,
    LoggingMessageNotificationParam,
};
use rmcp::service::{NotificationContext, RequestContext, RunningService};
use rmcp::RoleClient;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::conversion;
use super::registry::ConnectionRegistry;
use crate::requests::RequestHandlerService;

/// Type alias for the MCP client service
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    server: ServerIdentity,
    requests: Arc<RequestHandlerService>,
    registry: Arc<ConnectionRegistry>,
    event_tx: Option<broadcast::Sender<ConnectionEvent>>,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler")
            .field("server_id", &self.server.id)
            .field("event_tx", &self.event_tx.is_some())
            .finish()
    }
}

impl McpClientHandler {
    pub fn new(
        server: ServerIdentity,
        requests: Arc<RequestHandlerService>,
        registry: Arc<ConnectionRegistry>,
        event_tx: Option<broadcast::Sender<ConnectionEvent>>,
    ) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: conversion::client_capabilities(),
                client_info: Implementation {
                    name: "mcplink".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some(format!("mcplink ({})", server.name)),
                    icons: None,
                    website_url: None,
                    ..Default::default()
                },
                meta: None,
            },
            server,
            requests,
            registry,
            event_tx,
        }
    }

    pub fn server(&self) -> &ServerIdentity {
        &self.server
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.send(event).is_err() {
                debug!(server_id = %self.server.id, "[McpClientHandler] No event subscribers");
            }
        }
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn create_message(
        &self,
        params: CreateMessageRequestParams,
        context: RequestContext<RoleClient>,
    ) -> impl std::future::Future<Output = Result<CreateMessageResult, ErrorData>> + Send + '_ {
        async move {
            let (request, params_meta) =
                conversion::sampling_request(&params).map_err(conversion::error_data)?;
            let context_meta = serde_json::to_value(&context.meta).unwrap_or_default();
            let meta = conversion::request_meta(context_meta, params_meta);

            let response = self
                .requests
                .handle_sampling_request(&self.server, request, meta)
                .await
                .map_err(conversion::error_data)?;

            conversion::create_message_result(&response)
        }
    }

    fn create_elicitation(
        &self,
        request: CreateElicitationRequestParams,
        _context: RequestContext<RoleClient>,
    ) -> impl std::future::Future<Output = Result<CreateElicitationResult, ErrorData>> + Send + '_ {
        async move {
            let params = serde_json::to_value(&request).unwrap_or_default();
            let response = self
                .requests
                .handle_elicitation_request(&self.server, params)
                .await;
            conversion::elicitation_result(&response)
        }
    }

    fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let notification = conversion::server_notification(&params);
            self.requests
                .handle_notification_request(&self.server, notification)
                .await;
        }
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(
                server_id = %self.server.id,
                "[McpClientHandler] Server sent tools/list_changed"
            );
            if self.registry.update(&self.server.id, |r| r.tools = None).is_none() {
                warn!(server_id = %self.server.id, "[McpClientHandler] tools/list_changed for unregistered server");
            }
            self.emit(ConnectionEvent::ToolsChanged {
                server_id: self.server.id.clone(),
            });
        }
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(
                server_id = %self.server.id,
                "[McpClientHandler] Server sent resources/list_changed"
            );
            self.registry.update(&self.server.id, |r| r.resources = None);
            self.emit(ConnectionEvent::ResourcesChanged {
                server_id: self.server.id.clone(),
            });
        }
    }
}
