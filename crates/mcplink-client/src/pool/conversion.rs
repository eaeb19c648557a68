//! Conversions between rmcp wire types and mcplink domain types.
//!
//! Both sides share the protocol's JSON shape, so conversions go through
//! `serde_json::Value` rather than field-by-field copies.

use mcplink_core::{
    ElicitationResponse, NotificationLevel, ProtocolError, RequestMeta, SamplingRequest,
    SamplingResponse, ServerNotification,
};
use rmcp::model::{
    ClientCapabilities, CreateElicitationResult, CreateMessageRequestParams, CreateMessageResult,
    ErrorCode, ErrorData, LoggingLevel, LoggingMessageNotificationParam,
};
use serde_json::{json, Map, Value};

/// Roots, sampling and elicitation.
pub fn client_capabilities() -> ClientCapabilities {
    serde_json::from_value(json!({
        "roots": { "listChanged": false },
        "sampling": {},
        "elicitation": {}
    }))
    .unwrap_or_default()
}

/// Split a createMessage request into the domain request and its `_meta` bag.
pub fn sampling_request(params: &CreateMessageRequestParams) -> Result<(SamplingRequest, Value), ProtocolError> {
    let mut value = serde_json::to_value(params)
        .map_err(|e| ProtocolError::invalid_params(format!("Unserializable sampling params: {}", e)))?;
    let meta = value
        .as_object_mut()
        .and_then(|obj| obj.remove("_meta"))
        .unwrap_or(Value::Null);
    let request = serde_json::from_value(value)
        .map_err(|e| ProtocolError::invalid_params(format!("Invalid sampling request: {}", e)))?;
    Ok((request, meta))
}

/// Merge request-context metadata with the params' own `_meta`; params win.
pub fn request_meta(context_meta: Value, params_meta: Value) -> RequestMeta {
    let mut merged = Map::new();
    for source in [context_meta, params_meta] {
        if let Value::Object(obj) = source {
            merged.extend(obj);
        }
    }
    RequestMeta::from_value(&Value::Object(merged))
}

pub fn create_message_result(response: &SamplingResponse) -> Result<CreateMessageResult, ErrorData> {
    let value = serde_json::to_value(response)
        .map_err(|e| ErrorData::internal_error(format!("Unserializable sampling response: {}", e), None))?;
    serde_json::from_value(value)
        .map_err(|e| ErrorData::internal_error(format!("Invalid sampling response: {}", e), None))
}

pub fn elicitation_result(response: &ElicitationResponse) -> Result<CreateElicitationResult, ErrorData> {
    serde_json::from_value(json!({ "action": response.action }))
        .map_err(|e| ErrorData::internal_error(format!("Invalid elicitation response: {}", e), None))
}

pub fn error_data(error: ProtocolError) -> ErrorData {
    ErrorData::new(ErrorCode(error.code), error.message, error.data)
}

fn notification_level(level: &LoggingLevel) -> NotificationLevel {
    match level {
        LoggingLevel::Debug => NotificationLevel::Debug,
        LoggingLevel::Info => NotificationLevel::Info,
        LoggingLevel::Notice => NotificationLevel::Notice,
        LoggingLevel::Warning => NotificationLevel::Warning,
        LoggingLevel::Error => NotificationLevel::Error,
        LoggingLevel::Critical => NotificationLevel::Critical,
        LoggingLevel::Alert => NotificationLevel::Alert,
        LoggingLevel::Emergency => NotificationLevel::Emergency,
    }
}

pub fn server_notification(params: &LoggingMessageNotificationParam) -> ServerNotification {
    ServerNotification {
        level: notification_level(&params.level),
        logger: params.logger.clone(),
        data: params.data.clone(),
    }
}
