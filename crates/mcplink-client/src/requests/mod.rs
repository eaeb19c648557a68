//! Request Handler Service
//!
//! Answers requests MCP servers send to the client: sampling (an LLM
//! completion on the server's behalf), elicitation and logging
//! notifications.

mod approval;
mod model_selection;

use std::sync::Arc;

use anyhow::Result;
use mcplink_core::{
    ApprovalDecision, ApprovalPolicy, CompletionRequest, ElicitationAction, ElicitationResponse,
    ElicitationStatus, ModelPreferences, NotificationLevel, ProtocolError, RequestMeta,
    SamplingHost, SamplingRequest, SamplingResponse, ServerIdentity, ServerNotification,
    StopReason,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

pub use approval::AutoApprovePolicy;
pub use model_selection::translate_preferences;

/// Prefix of sampling answers that failed soft.
pub const ERROR_MARKER: &str = "Error:";

pub struct RequestHandlerService {
    host: Arc<dyn SamplingHost>,
    approval: Arc<dyn ApprovalPolicy>,
}

impl RequestHandlerService {
    pub fn new(host: Arc<dyn SamplingHost>) -> Self {
        Self {
            host,
            approval: Arc::new(AutoApprovePolicy),
        }
    }

    pub fn with_approval_policy(mut self, policy: Arc<dyn ApprovalPolicy>) -> Self {
        self.approval = policy;
        self
    }

    /// Run a sampling request through approval, model selection, the host's
    /// completion pipeline and response review.
    ///
    /// A request whose execution context cannot be resolved gets an answer
    /// starting with [`ERROR_MARKER`] instead of an error.
    pub async fn handle_sampling_request(
        &self,
        server: &ServerIdentity,
        request: SamplingRequest,
        meta: RequestMeta,
    ) -> Result<SamplingResponse, ProtocolError> {
        info!(
            server_id = %server.id,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "[RequestHandler] Sampling request"
        );

        if request.messages.is_empty() {
            return Err(ProtocolError::invalid_params(
                "sampling request contains no messages",
            ));
        }

        if let ApprovalDecision::Rejected { reason } =
            self.approval.approve_sampling(server, &request).await
        {
            warn!(server_id = %server.id, reason = %reason, "[RequestHandler] Sampling rejected");
            return Err(ProtocolError::user_rejected(format!(
                "Sampling request rejected: {}",
                reason
            )));
        }

        let model = self
            .select_model_for_sampling(request.model_preferences.as_ref())
            .await
            .map_err(|e| {
                error!(server_id = %server.id, error = %e, "[RequestHandler] Model selection failed");
                ProtocolError::internal(format!("Model selection failed: {:#}", e))
            })?;
        debug!(server_id = %server.id, model = %model, "[RequestHandler] Selected model");

        let meta = meta.with_server(server);
        let resolved = if meta.has_context_ids() {
            self.host.resolve_context(&meta).await
        } else {
            self.host.current_context().await
        };
        let context = match resolved {
            Ok(Some(context)) => context,
            Ok(None) => {
                warn!(server_id = %server.id, "[RequestHandler] No execution context for sampling");
                return Ok(SamplingResponse::assistant_text(
                    format!("{} no execution context available for this sampling request", ERROR_MARKER),
                    model,
                    StopReason::EndTurn,
                ));
            }
            Err(e) => {
                warn!(
                    server_id = %server.id,
                    error = %e,
                    "[RequestHandler] Failed to resolve execution context"
                );
                return Ok(SamplingResponse::assistant_text(
                    format!("{} failed to resolve execution context: {:#}", ERROR_MARKER, e),
                    model,
                    StopReason::EndTurn,
                ));
            }
        };

        let completion = self
            .host
            .complete(
                &context,
                CompletionRequest {
                    model: model.clone(),
                    system_prompt: request.system_prompt,
                    messages: request.messages,
                    max_tokens: request.max_tokens,
                    temperature: request.temperature,
                    stop_sequences: request.stop_sequences,
                },
            )
            .await
            .map_err(|e| {
                error!(
                    server_id = %server.id,
                    context_id = %context.id,
                    error = %e,
                    "[RequestHandler] Completion failed"
                );
                ProtocolError::internal(format!("Sampling completion failed: {:#}", e))
            })?;

        let response = SamplingResponse::assistant_text(
            completion.text,
            completion.model.unwrap_or(model),
            StopReason::normalize(completion.stop_reason.as_deref()),
        );
        let response = self.approval.review_response(server, response).await;

        info!(
            server_id = %server.id,
            model = %response.model,
            stop_reason = %response.stop_reason.as_str(),
            "[RequestHandler] Sampling completed"
        );
        Ok(response)
    }

    /// Translate protocol preferences and let the host pick the model.
    pub async fn select_model_for_sampling(
        &self,
        preferences: Option<&ModelPreferences>,
    ) -> Result<String> {
        let selection = translate_preferences(preferences);
        self.host.select_model(&selection).await
    }

    /// Elicitation is not supported yet; servers get an explicit answer.
    pub async fn handle_elicitation_request(
        &self,
        server: &ServerIdentity,
        params: Value,
    ) -> ElicitationResponse {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        info!(
            server_id = %server.id,
            prompt = %message,
            "[RequestHandler] Elicitation request (not implemented)"
        );
        ElicitationResponse {
            status: ElicitationStatus::NotImplemented,
            action: ElicitationAction::Decline,
            message: "Elicitation is not supported by this client".to_string(),
        }
    }

    /// Re-emit a server log message through tracing.
    pub async fn handle_notification_request(
        &self,
        server: &ServerIdentity,
        notification: ServerNotification,
    ) {
        let logger = notification.logger.as_deref().unwrap_or("-");
        let message = notification.message();
        match notification.level {
            NotificationLevel::Debug => {
                debug!(server_id = %server.id, logger, "[ServerLog] {}", message)
            }
            NotificationLevel::Info | NotificationLevel::Notice => {
                info!(server_id = %server.id, logger, "[ServerLog] {}", message)
            }
            NotificationLevel::Warning => {
                warn!(server_id = %server.id, logger, "[ServerLog] {}", message)
            }
            NotificationLevel::Error
            | NotificationLevel::Critical
            | NotificationLevel::Alert
            | NotificationLevel::Emergency => {
                error!(server_id = %server.id, logger, "[ServerLog] {}", message)
            }
        }
    }
}
