//! Failure classification by message pattern.
//!
//! rmcp and reqwest surface HTTP failures as formatted strings, so recovery
//! strategy is chosen from the message text.

use mcplink_core::McpClientError;

/// Recovery strategy for a failed HTTP interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Remote session is gone; re-handshake required
    Session,
    /// Credentials rejected; caller refreshes and retries
    Auth,
    /// Anything else; the streaming transport retries on its own
    Transient,
}

const SESSION_INDICATORS: &[&str] = &[
    "session not found",
    "session expired",
    "session has expired",
    "invalid session",
    "unknown session",
    "missing session",
    "no valid session",
    "session terminated",
    "mcp-session-id",
];

const AUTH_INDICATORS: &[&str] = &["unauthorized", "authentication", "token"];

pub fn classify(message: &str) -> ErrorClass {
    let lower = normalize(message);

    if SESSION_INDICATORS.iter().any(|s| lower.contains(s))
        || (has_status(&lower, "400") && lower.contains("session"))
    {
        return ErrorClass::Session;
    }

    if has_status(&lower, "401") || AUTH_INDICATORS.iter().any(|s| lower.contains(s)) {
        return ErrorClass::Auth;
    }

    ErrorClass::Transient
}

/// Lowercase `message` and drop every word that carries a URL.
///
/// rmcp and reqwest embed the request URL in their error text; ports and
/// paths such as `:40110` or `/oauth/token` must not read as status codes or
/// auth keywords.
pub(crate) fn normalize(message: &str) -> String {
    message
        .split_whitespace()
        .filter(|word| !word.contains("://"))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether `code` appears as a standalone number, not inside a port,
/// address or longer number.
pub(crate) fn has_status(text: &str, code: &str) -> bool {
    text.match_indices(code).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + code.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_digit() || matches!(c, ':' | '.' | '/'))
            && !after.is_some_and(|c| c.is_ascii_digit())
    })
}

/// Turn a raw failure into the matching taxonomy entry.
pub fn to_client_error(server_id: &str, message: &str) -> McpClientError {
    match classify(message) {
        ErrorClass::Session => McpClientError::session(server_id, message),
        ErrorClass::Auth => McpClientError::auth(server_id, message),
        ErrorClass::Transient => McpClientError::transport(server_id, message),
    }
}
