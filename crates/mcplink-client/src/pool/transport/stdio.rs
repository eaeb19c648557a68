//! STDIO transport for MCP servers
//!
//! Spawns the server as a child process and speaks MCP over its
//! stdin/stdout. The child sees the host environment overlaid with the
//! configured variables.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_core::{McpClientError, McpClientResult, TransportType};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{handshake, Transport, TransportConnectResult};
use crate::pool::handler::McpClientHandler;

/// STDIO transport for child process MCP servers
pub struct StdioTransport {
    server_id: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    connect_timeout: Duration,
}

impl StdioTransport {
    pub fn new(
        server_id: String,
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            server_id,
            command,
            args,
            env,
            connect_timeout,
        }
    }

    pub fn validate(server_id: &str, command: &str) -> McpClientResult<()> {
        if command.trim().is_empty() {
            return Err(McpClientError::configuration(
                server_id,
                "stdio transport requires a command",
            ));
        }
        Ok(())
    }

    /// Environment handed to the child process.
    fn environment(&self) -> HashMap<String, String> {
        match host_environment() {
            Ok(host) => merge_environment(Some(host), &self.env),
            Err(e) => {
                warn!(
                    server_id = %self.server_id,
                    error = %e,
                    "[StdioTransport] Host environment unavailable, using configured variables only"
                );
                merge_environment(None, &self.env)
            }
        }
    }
}

/// Overlay `overrides` on the host environment. Configured values win.
pub fn merge_environment(
    host: Option<HashMap<String, String>>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = host.unwrap_or_default();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn host_environment() -> Result<HashMap<String, String>, String> {
    let mut env = HashMap::new();
    for (key, value) in std::env::vars_os() {
        let key = key
            .into_string()
            .map_err(|k| format!("non UTF-8 variable name {:?}", k))?;
        let value = value
            .into_string()
            .map_err(|_| format!("non UTF-8 value for {}", key))?;
        env.insert(key, value);
    }
    Ok(env)
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self, handler: McpClientHandler) -> TransportConnectResult {
        info!(
            server_id = %self.server_id,
            command = %self.command,
            "[StdioTransport] Connecting to STDIO server"
        );

        let command_path = match which::which(&self.command)
            .or_else(|_| which::which(format!("{}.exe", &self.command)))
        {
            Ok(path) => path,
            Err(_) => {
                let err = format!(
                    "Command not found: {}. Ensure it's installed and in PATH.",
                    self.command
                );
                error!(server_id = %self.server_id, "[StdioTransport] {}", err);
                return TransportConnectResult::Failed(err);
            }
        };
        debug!(server_id = %self.server_id, path = ?command_path, "[StdioTransport] Found command");

        let args = self.args.clone();
        let env = self.environment();
        let transport = match TokioChildProcess::new(Command::new(&command_path).configure(move |cmd| {
            cmd.args(&args)
                .env_clear()
                .envs(&env)
                .stderr(Stdio::inherit())
                .kill_on_drop(true);
        })) {
            Ok(t) => t,
            Err(e) => {
                let err = format!("Failed to spawn process: {}", e);
                error!(server_id = %self.server_id, "[StdioTransport] {}", err);
                return TransportConnectResult::Failed(err);
            }
        };

        match handshake(handler, transport, self.connect_timeout).await {
            Ok(client) => {
                info!(server_id = %self.server_id, "[StdioTransport] STDIO server connected");
                TransportConnectResult::Connected(client)
            }
            Err(err) => {
                error!(server_id = %self.server_id, "[StdioTransport] {}", err);
                TransportConnectResult::Failed(err)
            }
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command)
    }
}
