//! MCP server lifecycle management.
//!
//! One `ProcessManager` owns every spawned server process. Failures are
//! isolated per server: a start that goes wrong is recorded in that
//! server's `ServerState` and never propagates as an error, because a
//! single bad server must not abort startup of the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::{Instant, timeout};

use crate::client::McpClient;
use toolgate_core::{ServerConfig, ServerState, ServerStatus, ToolCallResult, ToolInfo};

/// Overall budget for spawn + initialize handshake + tool discovery.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// How long `shutdown_all` waits for a graceful exit per server.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// One managed server: its latest state, connected client (when
/// running), and last discovered tool set.
struct ManagedServer {
    state: ServerState,
    client: Option<Arc<McpClient>>,
    tools: Vec<ToolInfo>,
}

/// Manager for MCP server processes.
///
/// State transitions per server:
/// `stopped → starting → running` on success,
/// `starting → error` on spawn/handshake failure,
/// `running → error` when a call hits a dead transport,
/// `running → stopped` on shutdown. A restart always replaces the
/// previous entry and re-enters via `starting`.
pub struct ProcessManager {
    servers: RwLock<HashMap<String, ManagedServer>>,
}

impl ProcessManager {
    /// Create a new process manager with no running servers.
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Start (or restart) a server from its configuration.
    ///
    /// Never returns an error for this path: spawn failures, handshake
    /// timeouts, and malformed handshakes are all recorded in the
    /// returned (and stored) state with status `Error`.
    pub async fn start_server(&self, config: &ServerConfig) -> ServerState {
        let server_id = config.id.clone();

        // A restart replaces whatever was there; stop the old process
        // first so it does not linger.
        let previous = {
            let mut servers = self.servers.write().await;
            let previous = servers
                .remove(&server_id)
                .and_then(|entry| entry.client);
            servers.insert(
                server_id.clone(),
                ManagedServer {
                    state: ServerState::starting(&server_id),
                    client: None,
                    tools: Vec::new(),
                },
            );
            previous
        };
        if let Some(old) = previous {
            old.shutdown(SHUTDOWN_GRACE).await;
        }

        if let Err(reason) = config.validate() {
            return self
                .record_failure(&server_id, format!("Invalid configuration: {reason}"))
                .await;
        }

        let started = Instant::now();
        let connected = timeout(
            HANDSHAKE_TIMEOUT,
            McpClient::connect(
                &config.command,
                &config.args,
                &config.env,
                config.working_dir.as_deref(),
            ),
        )
        .await;

        let client = match connected {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                return self.record_failure(&server_id, e.to_string()).await;
            }
            Err(_) => {
                return self
                    .record_failure(
                        &server_id,
                        format!("Handshake timed out after {HANDSHAKE_TIMEOUT:?}"),
                    )
                    .await;
            }
        };

        let discovered = match timeout(HANDSHAKE_TIMEOUT, client.list_tools()).await {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => {
                client.shutdown(SHUTDOWN_GRACE).await;
                return self
                    .record_failure(&server_id, format!("Failed to list tools: {e}"))
                    .await;
            }
            Err(_) => {
                client.shutdown(SHUTDOWN_GRACE).await;
                return self
                    .record_failure(&server_id, "Tool discovery timed out".to_string())
                    .await;
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let handshake_ms = started.elapsed().as_millis() as u64;

        let tools: Vec<ToolInfo> = discovered
            .into_iter()
            .map(|t| {
                let mut info = ToolInfo::new(&server_id, t.name);
                info.description = t.description;
                info.input_schema = t.input_schema;
                info
            })
            .collect();

        let state = ServerState::running(&server_id, handshake_ms, tools.len());

        tracing::info!(
            server_id = %server_id,
            server_name = %client.server_info().name,
            handshake_ms,
            tool_count = tools.len(),
            "MCP server started"
        );

        let mut servers = self.servers.write().await;
        servers.insert(
            server_id,
            ManagedServer {
                state: state.clone(),
                client: Some(Arc::new(client)),
                tools,
            },
        );
        state
    }

    /// Record a start failure, store it, and return the error state.
    async fn record_failure(&self, server_id: &str, message: String) -> ServerState {
        tracing::warn!(server_id = %server_id, error = %message, "MCP server failed to start");
        let state = ServerState::errored(server_id, message);
        let mut servers = self.servers.write().await;
        servers.insert(
            server_id.to_string(),
            ManagedServer {
                state: state.clone(),
                client: None,
                tools: Vec::new(),
            },
        );
        state
    }

    /// Last successfully discovered tool set for a server, or empty if
    /// it is not running.
    pub async fn list_tools(&self, server_id: &str) -> Vec<ToolInfo> {
        let servers = self.servers.read().await;
        servers
            .get(server_id)
            .filter(|s| s.state.status == ServerStatus::Running)
            .map(|s| s.tools.clone())
            .unwrap_or_default()
    }

    /// Forward a single tool call.
    ///
    /// Transport and process failures surface as `is_error: true` with
    /// diagnostic content, never as a panic or error, so the caller can
    /// always respond to the agent loop with a normal tool result. A
    /// transport failure also flips the server's state to `Error`.
    pub async fn call_tool(&self, server_id: &str, tool_name: &str, args: Value) -> ToolCallResult {
        let client = {
            let servers = self.servers.read().await;
            match servers.get(server_id) {
                Some(entry) if entry.state.status == ServerStatus::Running => {
                    entry.client.clone()
                }
                _ => None,
            }
        };

        let Some(client) = client else {
            return ToolCallResult::error(format!("Server '{server_id}' is not running"));
        };

        match client.call_tool(tool_name, args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    server_id = %server_id,
                    tool = tool_name,
                    error = %e,
                    "Tool call failed at the transport level"
                );
                self.mark_errored(server_id, e.to_string()).await;
                ToolCallResult::error(format!("Tool call failed: {e}"))
            }
        }
    }

    /// Flip a running server to `Error` (crash detected on use).
    async fn mark_errored(&self, server_id: &str, message: String) {
        let mut servers = self.servers.write().await;
        if let Some(entry) = servers.get_mut(server_id) {
            entry.state.status = ServerStatus::Error;
            entry.state.last_error = Some(message);
            entry.client = None;
            entry.tools.clear();
        }
    }

    /// Current state for a server, if a start was ever attempted.
    pub async fn get_state(&self, server_id: &str) -> Option<ServerState> {
        let servers = self.servers.read().await;
        servers.get(server_id).map(|s| s.state.clone())
    }

    /// Snapshot of every managed server's state.
    pub async fn states(&self) -> Vec<ServerState> {
        let servers = self.servers.read().await;
        servers.values().map(|s| s.state.clone()).collect()
    }

    /// Stop one server, waiting briefly for graceful exit.
    pub async fn stop_server(&self, server_id: &str) {
        let client = {
            let mut servers = self.servers.write().await;
            match servers.get_mut(server_id) {
                Some(entry) => {
                    entry.state = ServerState::stopped(server_id);
                    entry.tools.clear();
                    entry.client.take()
                }
                None => None,
            }
        };
        if let Some(client) = client {
            client.shutdown(SHUTDOWN_GRACE).await;
            tracing::info!(server_id = %server_id, "MCP server stopped");
        }
    }

    /// Terminate every managed server. Idempotent; an unresponsive
    /// process costs at most the bounded grace period before it is
    /// killed.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = {
            let servers = self.servers.read().await;
            servers.keys().cloned().collect()
        };
        for id in ids {
            self.stop_server(&id).await;
        }
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}
