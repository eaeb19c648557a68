//! Connection registry
//!
//! One [`ConnectionRecord`] per server identifier. Each record sits behind its
//! own lock so servers never contend with each other; locks are only taken
//! inside synchronous closures and never held across an `.await`.
//!
//! Race prevention:
//! - generation: monotonic per registry, stamped on a record at every
//!   (re)connect and forced disconnect; callbacks carrying an older
//!   generation are stale
//! - timers are stored as [`TimerHandle`]s and aborted before a replacement
//!   is armed, so at most one reconnection and one health-check timer exist
//!   per server

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mcplink_core::{
    ConnectionState, McpClientError, OAuthConfig, OAuthTokens, RetryPolicy, ServerConfig,
    TransportType,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::client::ClientHandle;

/// A cancellable one-shot timer owned by a record.
pub(crate) struct TimerHandle {
    id: u64,
    handle: JoinHandle<()>,
}

impl TimerHandle {
    fn cancel(self) {
        self.handle.abort();
    }
}

/// Backoff bookkeeping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryState {
    pub policy: RetryPolicy,
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryState {
    fn for_transport(transport: TransportType) -> Self {
        let policy = RetryPolicy::for_transport(transport);
        Self {
            policy,
            attempts: 0,
            delay: policy.base_delay,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.delay = self.policy.base_delay;
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}

/// OAuth material for an OAuth-enabled HTTP server.
#[derive(Debug, Clone)]
pub(crate) struct OAuthSession {
    pub config: OAuthConfig,
    pub tokens: Option<OAuthTokens>,
}

pub struct ConnectionRecord {
    pub(crate) config: ServerConfig,
    pub(crate) state: ConnectionState,
    pub(crate) client: Option<Arc<dyn ClientHandle>>,
    pub(crate) generation: u64,
    pub(crate) retry: RetryState,
    pub(crate) last_error: Option<McpClientError>,
    pub(crate) oauth: Option<OAuthSession>,
    pub(crate) last_activity: Instant,
    pub(crate) pending_auth_url: Option<String>,
    pub(crate) capabilities: Option<Value>,
    pub(crate) tools: Option<Vec<Value>>,
    pub(crate) resources: Option<Vec<Value>>,
    reconnect_timer: Option<TimerHandle>,
    health_check_timer: Option<TimerHandle>,
    next_timer_id: u64,
}

impl ConnectionRecord {
    pub(crate) fn new(config: ServerConfig) -> Self {
        let retry = RetryState::for_transport(config.transport_type());
        let oauth = config.http_oauth().map(|oauth| OAuthSession {
            config: oauth.clone(),
            tokens: oauth.tokens.clone(),
        });
        Self {
            config,
            state: ConnectionState::Disconnected,
            client: None,
            generation: 0,
            retry,
            last_error: None,
            oauth,
            last_activity: Instant::now(),
            pending_auth_url: None,
            capabilities: None,
            tools: None,
            resources: None,
            reconnect_timer: None,
            health_check_timer: None,
            next_timer_id: 0,
        }
    }

    /// Adopt a newer configuration for the same server. Tokens already held
    /// by the record are fresher than any inline in the descriptor.
    pub(crate) fn replace_config(&mut self, config: ServerConfig) {
        if config.transport_type() != self.transport_type() {
            self.retry = RetryState::for_transport(config.transport_type());
        }
        self.oauth = config.http_oauth().map(|oauth| OAuthSession {
            config: oauth.clone(),
            tokens: self.tokens().or_else(|| oauth.tokens.clone()),
        });
        self.config = config;
    }

    pub(crate) fn set_oauth_config(&mut self, config: OAuthConfig) {
        match self.oauth.as_mut() {
            Some(session) => session.config = config,
            None => {
                self.oauth = Some(OAuthSession {
                    tokens: config.tokens.clone(),
                    config,
                })
            }
        }
    }

    pub(crate) fn transport_type(&self) -> TransportType {
        self.config.transport_type()
    }

    pub(crate) fn tokens(&self) -> Option<OAuthTokens> {
        self.oauth.as_ref().and_then(|o| o.tokens.clone())
    }

    pub(crate) fn set_tokens(&mut self, tokens: OAuthTokens) {
        if let Some(oauth) = self.oauth.as_mut() {
            oauth.tokens = Some(tokens);
        }
    }

    /// Capabilities and cached listings may be stale after any disruption.
    pub(crate) fn invalidate_cache(&mut self) {
        self.capabilities = None;
        self.tools = None;
        self.resources = None;
    }

    /// Transition to disconnected after a failure. Keeps the client handle;
    /// callers decide whether it must be closed.
    pub(crate) fn mark_disconnected(&mut self, error: Option<McpClientError>) {
        self.state = ConnectionState::Disconnected;
        if error.is_some() {
            self.last_error = error;
        }
        self.invalidate_cache();
        self.cancel_health_check_timer();
    }

    fn next_timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    /// Arm the reconnection timer; `spawn` receives the timer id.
    pub(crate) fn arm_reconnect_timer(&mut self, spawn: impl FnOnce(u64) -> JoinHandle<()>) {
        self.cancel_reconnect_timer();
        let id = self.next_timer_id();
        self.reconnect_timer = Some(TimerHandle { id, handle: spawn(id) });
    }

    pub(crate) fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
        }
    }

    /// Called by a firing timer: forget the handle without aborting the
    /// running task. Returns false if the timer was superseded.
    pub(crate) fn detach_reconnect_timer(&mut self, id: u64) -> bool {
        match &self.reconnect_timer {
            Some(timer) if timer.id == id => {
                self.reconnect_timer = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn has_reconnect_timer(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    pub(crate) fn arm_health_check_timer(&mut self, spawn: impl FnOnce(u64) -> JoinHandle<()>) {
        self.cancel_health_check_timer();
        let id = self.next_timer_id();
        self.health_check_timer = Some(TimerHandle { id, handle: spawn(id) });
    }

    pub(crate) fn cancel_health_check_timer(&mut self) {
        if let Some(timer) = self.health_check_timer.take() {
            timer.cancel();
        }
    }

    pub(crate) fn detach_health_check_timer(&mut self, id: u64) -> bool {
        match &self.health_check_timer {
            Some(timer) if timer.id == id => {
                self.health_check_timer = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn cancel_timers(&mut self) {
        self.cancel_reconnect_timer();
        self.cancel_health_check_timer();
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            server_id: self.config.id.clone(),
            transport: self.transport_type(),
            state: self.state,
            generation: self.generation,
            reconnect_attempts: self.retry.attempts,
            max_reconnect_attempts: self.retry.policy.max_attempts,
            reconnect_delay: self.retry.delay,
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
            has_client: self.client.is_some(),
            has_oauth: self.oauth.is_some(),
            has_tokens: self.tokens().is_some(),
            pending_auth_url: self.pending_auth_url.clone(),
            idle_for: self.last_activity.elapsed(),
            capabilities: self.capabilities.clone(),
            cached_tools: self.tools.as_ref().map(Vec::len),
            cached_resources: self.resources.as_ref().map(Vec::len),
            reconnect_timer_active: self.reconnect_timer.is_some(),
            health_check_timer_active: self.health_check_timer.is_some(),
        }
    }
}

impl Drop for ConnectionRecord {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

/// Read-only view of a record for the host.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub server_id: String,
    pub transport: TransportType,
    pub state: ConnectionState,
    pub generation: u64,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub last_error: Option<String>,
    pub has_client: bool,
    pub has_oauth: bool,
    pub has_tokens: bool,
    pub pending_auth_url: Option<String>,
    pub idle_for: Duration,
    pub capabilities: Option<Value>,
    pub cached_tools: Option<usize>,
    pub cached_resources: Option<usize>,
    pub reconnect_timer_active: bool,
    pub health_check_timer_active: bool,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    records: DashMap<String, Arc<RwLock<ConnectionRecord>>>,
    generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, server_id: &str) -> bool {
        self.records.contains_key(server_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self, server_id: &str) -> Option<ConnectionSnapshot> {
        self.read(server_id, ConnectionRecord::snapshot)
    }

    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.server_ids()
            .iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    pub fn state(&self, server_id: &str) -> Option<ConnectionState> {
        self.read(server_id, |r| r.state)
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn entry(&self, server_id: &str) -> Option<Arc<RwLock<ConnectionRecord>>> {
        // Clone the Arc out so the shard lock is released before locking the record
        self.records.get(server_id).map(|e| Arc::clone(e.value()))
    }

    pub(crate) fn read<R>(&self, server_id: &str, f: impl FnOnce(&ConnectionRecord) -> R) -> Option<R> {
        let entry = self.entry(server_id)?;
        let record = entry.read();
        Some(f(&record))
    }

    pub(crate) fn update<R>(
        &self,
        server_id: &str,
        f: impl FnOnce(&mut ConnectionRecord) -> R,
    ) -> Option<R> {
        let entry = self.entry(server_id)?;
        let mut record = entry.write();
        Some(f(&mut record))
    }

    /// Update the record for `config.id`, registering a fresh disconnected
    /// record first if there is none.
    pub(crate) fn upsert<R>(
        &self,
        config: &ServerConfig,
        f: impl FnOnce(&mut ConnectionRecord) -> R,
    ) -> R {
        let entry = Arc::clone(
            self.records
                .entry(config.id.clone())
                .or_insert_with(|| Arc::new(RwLock::new(ConnectionRecord::new(config.clone()))))
                .value(),
        );
        let mut record = entry.write();
        f(&mut record)
    }

    /// Remove a record, cancelling its timers. Returns its client handle.
    pub(crate) fn remove(&self, server_id: &str) -> Option<Option<Arc<dyn ClientHandle>>> {
        let (_, entry) = self.records.remove(server_id)?;
        let mut record = entry.write();
        record.cancel_timers();
        Some(record.client.take())
    }

    /// Remove every record; returns the client handles that were still open.
    pub(crate) fn drain(&self) -> Vec<(String, Arc<dyn ClientHandle>)> {
        let ids: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| {
                let client = self.remove(&id)??;
                Some((id, client))
            })
            .collect()
    }
}
