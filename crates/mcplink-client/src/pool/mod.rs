//! Connection pool - MCP client connection management
//!
//! - **ConnectionRegistry**: one record per server (state, client, timers, backoff)
//! - **TransportFactory**: builds stdio and streamable HTTP transports
//! - **ConnectionService**: connect, reconnect, health checks, operation retry
//! - **McpClientHandler**: answers server-initiated requests through the
//!   request handler service

mod classify;
mod client;
mod connection;
mod connector;
mod conversion;
mod credential_store;
mod handler;
mod health;
mod oauth;
mod operations;
mod reconnect;
mod registry;
pub mod transport;

pub use classify::{classify, to_client_error, ErrorClass};
pub use client::{ClientHandle, CloseNotifier, RmcpClient, ToolCallResult};
pub use connection::{
    ConnectOutcome, ConnectionService, ConnectionServiceBuilder, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_HEALTH_CHECK_TIMEOUT,
};
pub use connector::{ConnectRequest, Connector, TransportConnector};
pub use credential_store::MemoryCredentialStore;
pub use handler::{McpClient, McpClientHandler};
pub use oauth::{AuthSink, OAuthProvider};
pub use registry::{ConnectionRecord, ConnectionRegistry, ConnectionSnapshot};
pub use transport::{Transport, TransportConnectResult, TransportFactory, TransportOptions};
