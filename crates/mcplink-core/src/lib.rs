//! # mcplink core
//!
//! Domain types shared by the mcplink client runtime.
//!
//! ## Modules
//!
//! - `domain` - Server configuration, lifecycle state, events, inbound request payloads
//! - `error` - Error taxonomy surfaced to the host
//! - `oauth` - OAuth collaborator consumed by the connection service
//! - `host` - Sampling host and approval policy consumed by the request handlers

pub mod domain;
pub mod error;
pub mod host;
pub mod oauth;

pub use domain::*;
pub use error::{McpClientError, McpClientResult, ProtocolError};
pub use host::{ApprovalDecision, ApprovalPolicy, SamplingHost};
pub use oauth::OAuthDelegate;
