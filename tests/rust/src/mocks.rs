//! Mock collaborators for testing
//!
//! In-memory stand-ins for the connector, protocol clients, the OAuth
//! delegate and the sampling host, so lifecycle tests run without processes
//! or sockets.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use mcplink_client::{ClientHandle, CloseNotifier, ConnectRequest, Connector, ToolCallResult};
use mcplink_core::{
    CompletionRequest, CompletionResponse, ExecutionContext, McpClientError, McpClientResult,
    ModelSelectionPreferences, OAuthConfig, OAuthDelegate, OAuthTokens, RequestMeta,
    SamplingHost,
};

// ============================================================================
// MockClient
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingBehavior {
    Ok,
    Fail(String),
    /// Never answers
    Hang,
}

pub struct MockClient {
    ping: Mutex<PingBehavior>,
    tools: Vec<Value>,
    call_results: Mutex<VecDeque<std::result::Result<ToolCallResult, String>>>,
    list_results: Mutex<VecDeque<String>>,
    fail_close: bool,
    pings: AtomicUsize,
    closes: AtomicUsize,
    tool_calls: AtomicUsize,
    list_calls: AtomicUsize,
    closed: AtomicBool,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            ping: Mutex::new(PingBehavior::Ok),
            tools: vec![json!({ "name": "echo", "inputSchema": { "type": "object" } })],
            call_results: Mutex::new(VecDeque::new()),
            list_results: Mutex::new(VecDeque::new()),
            fail_close: false,
            pings: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            tool_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_ping(self, behavior: PingBehavior) -> Self {
        *self.ping.lock() = behavior;
        self
    }

    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn set_ping(&self, behavior: PingBehavior) {
        *self.ping.lock() = behavior;
    }

    /// Queue the outcome of the next `call_tool`; `Err` carries the message.
    pub fn push_call_result(&self, result: std::result::Result<ToolCallResult, String>) {
        self.call_results.lock().push_back(result);
    }

    /// Make the next listing fail with `message`.
    pub fn fail_next_list(&self, message: &str) {
        self.list_results.lock().push_back(message.to_string());
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientHandle for MockClient {
    fn description(&self) -> String {
        "mock".to_string()
    }

    fn capabilities(&self) -> Option<Value> {
        Some(json!({ "tools": { "listChanged": true } }))
    }

    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let behavior = self.ping.lock().clone();
        match behavior {
            PingBehavior::Ok => Ok(()),
            PingBehavior::Fail(message) => Err(anyhow!(message)),
            PingBehavior::Hang => std::future::pending().await,
        }
    }

    async fn list_tools(&self) -> Result<Vec<Value>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.list_results.lock().pop_front() {
            bail!(message);
        }
        Ok(self.tools.clone())
    }

    async fn list_resources(&self) -> Result<Vec<Value>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.list_results.lock().pop_front() {
            bail!(message);
        }
        Ok(vec![json!({ "uri": "file:///readme.md", "name": "readme" })])
    }

    async fn call_tool(&self, name: &str, _arguments: Option<Map<String, Value>>) -> Result<ToolCallResult> {
        self.tool_calls.fetch_add(1, Ordering::SeqCst);
        match self.call_results.lock().pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(ToolCallResult {
                content: vec![json!({ "type": "text", "text": format!("{} ok", name) })],
                is_error: false,
            }),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            bail!("close failed");
        }
        Ok(())
    }
}

// ============================================================================
// MockConnector
// ============================================================================

/// Outcome of one scripted connection attempt
#[derive(Clone)]
pub enum ConnectScript {
    /// Connect with a fresh default client
    Succeed,
    /// Connect with the given client
    SucceedWith(Arc<MockClient>),
    /// Fail with a connection error carrying the message
    Fail(String),
    /// Fail with the given error as is
    Error(McpClientError),
}

/// What the connection service asked for
#[derive(Debug, Clone)]
pub struct RecordedConnect {
    pub server_id: String,
    pub tokens: Option<OAuthTokens>,
    pub has_oauth_provider: bool,
    pub generation: u64,
}

pub struct MockConnector {
    script: Mutex<VecDeque<ConnectScript>>,
    fallback: Mutex<ConnectScript>,
    connects: AtomicUsize,
    requests: Mutex<Vec<RecordedConnect>>,
    notifiers: Mutex<HashMap<String, CloseNotifier>>,
    clients: Mutex<HashMap<String, Arc<MockClient>>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Succeeds on every attempt unless scripted otherwise
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(ConnectScript::Succeed),
            connects: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            notifiers: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Queue the outcome of the next attempt
    pub fn push(&self, outcome: ConnectScript) {
        self.script.lock().push_back(outcome);
    }

    /// Outcome once the queue is empty
    pub fn set_fallback(&self, outcome: ConnectScript) {
        *self.fallback.lock() = outcome;
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedConnect> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<RecordedConnect> {
        self.requests.lock().last().cloned()
    }

    /// Latest client handed out for `server_id`
    pub fn client(&self, server_id: &str) -> Option<Arc<MockClient>> {
        self.clients.lock().get(server_id).cloned()
    }

    /// Close notifier of the latest connection for `server_id`
    pub fn notifier(&self, server_id: &str) -> Option<CloseNotifier> {
        self.notifiers.lock().get(server_id).cloned()
    }

    /// Simulate the latest connection of `server_id` dying on its own
    pub fn trigger_close(&self, server_id: &str, reason: &str) {
        if let Some(notifier) = self.notifier(server_id) {
            notifier.notify_closed(reason);
        }
    }

    /// Simulate a client-level error on the latest connection
    pub fn trigger_error(&self, server_id: &str, message: &str) {
        if let Some(notifier) = self.notifier(server_id) {
            notifier.notify_error(message);
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, request: ConnectRequest) -> McpClientResult<Arc<dyn ClientHandle>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let server_id = request.config.id.clone();
        self.requests.lock().push(RecordedConnect {
            server_id: server_id.clone(),
            tokens: request.tokens.clone(),
            has_oauth_provider: request.oauth_provider.is_some(),
            generation: request.close_notifier.generation(),
        });

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone());

        let client = match outcome {
            ConnectScript::Succeed => Arc::new(MockClient::new()),
            ConnectScript::SucceedWith(client) => client,
            ConnectScript::Fail(message) => {
                return Err(McpClientError::connection(&server_id, message))
            }
            ConnectScript::Error(error) => return Err(error),
        };

        self.notifiers
            .lock()
            .insert(server_id.clone(), request.close_notifier);
        self.clients.lock().insert(server_id, Arc::clone(&client));
        Ok(client)
    }
}

// ============================================================================
// MockOAuthDelegate
// ============================================================================

pub struct MockOAuthDelegate {
    authorization_url: String,
    issued: OAuthTokens,
    refreshed: Mutex<Option<OAuthTokens>>,
    fail_refresh: AtomicBool,
    token_delay: Mutex<Option<Duration>>,
    stored: Mutex<Vec<(String, OAuthTokens)>>,
    ensure_config_calls: AtomicUsize,
    valid_token_calls: AtomicUsize,
    client_credentials_calls: AtomicUsize,
    authorization_url_calls: AtomicUsize,
}

impl Default for MockOAuthDelegate {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOAuthDelegate {
    pub const AUTHORIZATION_URL: &'static str = "https://auth.example.com/authorize?client_id=mcplink";

    pub fn new() -> Self {
        Self {
            authorization_url: Self::AUTHORIZATION_URL.to_string(),
            issued: OAuthTokens::bearer("issued-token"),
            refreshed: Mutex::new(None),
            fail_refresh: AtomicBool::new(false),
            token_delay: Mutex::new(None),
            stored: Mutex::new(Vec::new()),
            ensure_config_calls: AtomicUsize::new(0),
            valid_token_calls: AtomicUsize::new(0),
            client_credentials_calls: AtomicUsize::new(0),
            authorization_url_calls: AtomicUsize::new(0),
        }
    }

    /// `ensure_valid_token` answers with these tokens instead of echoing
    pub fn refresh_to(&self, tokens: OAuthTokens) {
        *self.refreshed.lock() = Some(tokens);
    }

    pub fn fail_refresh(&self) {
        self.fail_refresh.store(true, Ordering::SeqCst);
    }

    /// `ensure_valid_token` sleeps this long before answering
    pub fn delay_token_checks(&self, delay: Duration) {
        *self.token_delay.lock() = Some(delay);
    }

    pub fn stored_tokens(&self) -> Vec<(String, OAuthTokens)> {
        self.stored.lock().clone()
    }

    pub fn ensure_config_count(&self) -> usize {
        self.ensure_config_calls.load(Ordering::SeqCst)
    }

    pub fn valid_token_count(&self) -> usize {
        self.valid_token_calls.load(Ordering::SeqCst)
    }

    pub fn client_credentials_count(&self) -> usize {
        self.client_credentials_calls.load(Ordering::SeqCst)
    }

    pub fn authorization_url_count(&self) -> usize {
        self.authorization_url_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthDelegate for MockOAuthDelegate {
    async fn ensure_oauth_config(&self, _server_id: &str, config: &OAuthConfig) -> Result<OAuthConfig> {
        self.ensure_config_calls.fetch_add(1, Ordering::SeqCst);
        let mut config = config.clone();
        config.client_id.get_or_insert_with(|| "registered-client".to_string());
        Ok(config)
    }

    async fn ensure_valid_token(
        &self,
        _server_id: &str,
        _config: &OAuthConfig,
        tokens: &OAuthTokens,
    ) -> Result<OAuthTokens> {
        self.valid_token_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.token_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            bail!("refresh token revoked");
        }
        Ok(self.refreshed.lock().clone().unwrap_or_else(|| tokens.clone()))
    }

    async fn client_credentials(&self, _server_id: &str, _config: &OAuthConfig) -> Result<OAuthTokens> {
        self.client_credentials_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.issued.clone())
    }

    async fn authorization_url(&self, _server_id: &str, _config: &OAuthConfig) -> Result<String> {
        self.authorization_url_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.authorization_url.clone())
    }

    async fn store_tokens(&self, server_id: &str, tokens: &OAuthTokens) -> Result<()> {
        self.stored.lock().push((server_id.to_string(), tokens.clone()));
        Ok(())
    }
}

// ============================================================================
// MockSamplingHost
// ============================================================================

pub struct MockSamplingHost {
    model: String,
    context: Mutex<Option<ExecutionContext>>,
    fail_resolution: AtomicBool,
    completion: Mutex<std::result::Result<CompletionResponse, String>>,
    selections: Mutex<Vec<ModelSelectionPreferences>>,
    resolved: Mutex<Vec<RequestMeta>>,
    completions: Mutex<Vec<(ExecutionContext, CompletionRequest)>>,
    current_calls: AtomicUsize,
}

impl Default for MockSamplingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSamplingHost {
    /// A host with a current context answering "Hello from the host"
    pub fn new() -> Self {
        Self {
            model: "host-default-model".to_string(),
            context: Mutex::new(Some(ExecutionContext {
                id: "ctx-current".to_string(),
                project_id: None,
                collaboration_id: None,
                user_id: None,
            })),
            fail_resolution: AtomicBool::new(false),
            completion: Mutex::new(Ok(CompletionResponse {
                text: "Hello from the host".to_string(),
                model: None,
                stop_reason: Some("end_turn".to_string()),
            })),
            selections: Mutex::new(Vec::new()),
            resolved: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            current_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_context(self) -> Self {
        *self.context.lock() = None;
        self
    }

    pub fn with_failing_resolution(self) -> Self {
        self.fail_resolution.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_completion(self, completion: std::result::Result<CompletionResponse, String>) -> Self {
        *self.completion.lock() = completion;
        self
    }

    pub fn selections(&self) -> Vec<ModelSelectionPreferences> {
        self.selections.lock().clone()
    }

    pub fn resolved_metas(&self) -> Vec<RequestMeta> {
        self.resolved.lock().clone()
    }

    pub fn completions(&self) -> Vec<(ExecutionContext, CompletionRequest)> {
        self.completions.lock().clone()
    }

    pub fn current_context_count(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SamplingHost for MockSamplingHost {
    async fn select_model(&self, preferences: &ModelSelectionPreferences) -> Result<String> {
        self.selections.lock().push(preferences.clone());
        Ok(preferences
            .preferred_models
            .first()
            .cloned()
            .unwrap_or_else(|| self.model.clone()))
    }

    async fn resolve_context(&self, meta: &RequestMeta) -> Result<Option<ExecutionContext>> {
        self.resolved.lock().push(meta.clone());
        if self.fail_resolution.load(Ordering::SeqCst) {
            bail!("context store offline");
        }
        Ok(self.context.lock().clone().map(|mut context| {
            context.project_id = meta.project_id.clone();
            context.collaboration_id = meta.collaboration_id.clone();
            context.user_id = meta.user_id.clone();
            context
        }))
    }

    async fn current_context(&self) -> Result<Option<ExecutionContext>> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_resolution.load(Ordering::SeqCst) {
            bail!("context store offline");
        }
        Ok(self.context.lock().clone())
    }

    async fn complete(
        &self,
        context: &ExecutionContext,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.completions.lock().push((context.clone(), request));
        self.completion.lock().clone().map_err(|message| anyhow!(message))
    }
}
