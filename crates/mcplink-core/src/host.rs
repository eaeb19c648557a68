//! Host-side collaborators for server-initiated requests.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{
    CompletionRequest, CompletionResponse, ExecutionContext, ModelSelectionPreferences,
    RequestMeta, SamplingRequest, SamplingResponse, ServerIdentity,
};

/// The host's model registry and completion pipeline.
#[async_trait]
pub trait SamplingHost: Send + Sync {
    /// Pick a concrete model id for the given preferences.
    async fn select_model(&self, preferences: &ModelSelectionPreferences) -> Result<String>;

    /// Resolve the conversation/collaboration named by request metadata.
    async fn resolve_context(&self, meta: &RequestMeta) -> Result<Option<ExecutionContext>>;

    /// The context currently in focus, used when metadata names none.
    async fn current_context(&self) -> Result<Option<ExecutionContext>>;

    async fn complete(
        &self,
        context: &ExecutionContext,
        request: CompletionRequest,
    ) -> Result<CompletionResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected { reason: String },
}

/// Human-in-the-loop gate around sampling.
#[async_trait]
pub trait ApprovalPolicy: Send + Sync {
    async fn approve_sampling(
        &self,
        server: &ServerIdentity,
        request: &SamplingRequest,
    ) -> ApprovalDecision;

    /// Last look at a generated answer before it goes back to the server.
    async fn review_response(
        &self,
        _server: &ServerIdentity,
        response: SamplingResponse,
    ) -> SamplingResponse {
        response
    }
}
