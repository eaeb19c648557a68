//! Sampling approval policies

use async_trait::async_trait;
use mcplink_core::{ApprovalDecision, ApprovalPolicy, SamplingRequest, ServerIdentity};
use tracing::warn;

/// Approves every sampling request. Stand-in until the host wires a real
/// human-in-the-loop policy, so it complains on every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprovePolicy;

#[async_trait]
impl ApprovalPolicy for AutoApprovePolicy {
    async fn approve_sampling(
        &self,
        server: &ServerIdentity,
        request: &SamplingRequest,
    ) -> ApprovalDecision {
        warn!(
            server_id = %server.id,
            server_name = %server.name,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "[RequestHandler] AUTO-APPROVING sampling request without user review"
        );
        ApprovalDecision::Approved
    }
}
