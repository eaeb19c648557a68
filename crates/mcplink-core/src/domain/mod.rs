//! Domain types for mcplink
//!
//! - Server configuration (`ServerConfig`, `TransportConfig`, OAuth descriptor)
//! - Connection lifecycle values (`ConnectionState`, `RetryPolicy`)
//! - Lifecycle events (`ConnectionEvent`)
//! - Inbound request payloads (sampling, elicitation, log notifications)

pub mod config;
mod event;
mod sampling;
mod server;
mod state;

pub use config::{ClientConfig, LoggingConfig};
pub use event::ConnectionEvent;
pub use sampling::*;
pub use server::*;
pub use state::{ConnectionState, RetryPolicy};
