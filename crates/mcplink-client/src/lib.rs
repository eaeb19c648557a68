//! mcplink client runtime
//!
//! Manages the lifecycle of connections to MCP servers:
//! - Connection registry with per-server state, backoff and timers
//! - stdio and streamable HTTP transports, OAuth for HTTP
//! - Reconnection with exponential backoff and idle health checks
//! - Handling of server-initiated sampling, elicitation and logging requests

pub mod logging;
pub mod pool;
pub mod requests;
pub mod service_factory;

pub use pool::{
    ClientHandle, CloseNotifier, ConnectOutcome, ConnectRequest, ConnectionRegistry,
    ConnectionService, ConnectionServiceBuilder, ConnectionSnapshot, Connector, McpClient,
    McpClientHandler, ToolCallResult, TransportConnector, TransportFactory,
};
pub use requests::{AutoApprovePolicy, RequestHandlerService, ERROR_MARKER};
pub use service_factory::{ClientServices, ServiceFactory};
