//! Stream reconnection policy for the streamable HTTP transport

use std::time::Duration;

use mcplink_core::StreamRetryConfig;
use rmcp::transport::common::client_side_sse::SseRetryPolicy;

/// Exponential backoff for the transport's own SSE stream reconnection.
/// Once it gives up the connection closes and the service-level reconnect
/// takes over.
#[derive(Debug, Clone)]
pub struct StreamRetryPolicy {
    config: StreamRetryConfig,
}

impl StreamRetryPolicy {
    pub fn new(config: StreamRetryConfig) -> Self {
        Self { config }
    }
}

impl SseRetryPolicy for StreamRetryPolicy {
    fn retry(&self, current_times: usize) -> Option<Duration> {
        self.config.delay_for_retry(current_times)
    }
}
