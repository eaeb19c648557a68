use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::TransportType;

/// Lifecycle state of a registered server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Exponential backoff parameters for service-level reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Local processes fail fast: a persistent failure means a broken binary.
    pub const STDIO: RetryPolicy = RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
    };

    /// Remote servers may be mid-deploy; tolerate roughly an hour of outage.
    pub const HTTP: RetryPolicy = RetryPolicy {
        max_attempts: 60,
        base_delay: Duration::from_secs(60),
        max_delay: Duration::from_secs(300),
    };

    pub const fn for_transport(transport: TransportType) -> Self {
        match transport {
            TransportType::Stdio => Self::STDIO,
            TransportType::Http => Self::HTTP,
        }
    }

    /// `min(base * 2^(attempt - 1), max)` for attempt >= 1; attempt 0 is
    /// treated as attempt 1.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
