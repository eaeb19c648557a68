//! Transport integration tests
//!
//! Tests the real transports end to end:
//! - Streamable HTTP against an in-process rmcp server (sessions, list_changed)
//! - stdio command resolution failures
