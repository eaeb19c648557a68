//! Connection lifecycle integration tests
//!
//! Tests for the ConnectionService state machine against a scripted connector.
