//! MCP JSON-RPC client for communicating with MCP servers.
//!
//! Implements the MCP protocol over stdio (JSON-RPC 2.0, one message
//! per line). Reference: <https://spec.modelcontextprotocol.io/>

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use toolgate_core::{EnvEntry, ToolCallResult};

/// Per-request response timeout. Generous because npx-style servers can
/// spend a long time installing on first launch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum non-JSON lines tolerated before a response (npx banners etc).
const MAX_NOISE_LINES: usize = 10;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("Failed to spawn MCP server process: {0}")]
    SpawnFailed(String),

    #[error("Failed to communicate with MCP server: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("MCP protocol error: {0}")]
    ProtocolError(String),

    #[error("Timeout waiting for MCP server response")]
    Timeout,

    #[error("MCP server returned error: code={code}, message={message}")]
    ServerError { code: i64, message: String },

    #[error("Server not connected")]
    NotConnected,
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// MCP initialize result.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// Server information from initialize.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Server capabilities.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub prompts: Option<Value>,
}

/// Raw tool entry from tools/list, before identity derivation.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// Client for communicating with one MCP server over stdio.
///
/// Methods take `&self` so a connected client can be shared behind an
/// `Arc`; one request is in flight at a time (the stdio pipes are
/// mutex-guarded).
pub struct McpClient {
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<BufReader<ChildStdout>>>,
    child: Mutex<Option<Child>>,
    /// Serializes whole request/response exchanges so concurrent
    /// callers cannot interleave on the pipes.
    request_gate: Mutex<()>,
    request_id: AtomicU64,
    server_info: ServerInfo,
    protocol_version: String,
    supports_tools: bool,
}

impl McpClient {
    /// Spawn an MCP server process and perform the initialization
    /// handshake. Returns a fully connected client.
    pub async fn connect(
        command: &str,
        args: &[String],
        env: &[EnvEntry],
        working_dir: Option<&str>,
    ) -> Result<Self, McpClientError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Never read; a piped stderr could fill and wedge the child
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        for entry in env {
            cmd.env(&entry.key, &entry.value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpClientError::SpawnFailed(format!(
                "Failed to spawn '{command}': {e}\nArgs: {args:?}\nCwd: {working_dir:?}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpClientError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpClientError::SpawnFailed("Failed to get stdout".to_string()))?;

        let mut client = Self {
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(Some(BufReader::new(stdout))),
            child: Mutex::new(Some(child)),
            request_gate: Mutex::new(()),
            request_id: AtomicU64::new(1),
            server_info: ServerInfo {
                name: String::new(),
                version: None,
            },
            protocol_version: String::new(),
            supports_tools: false,
        };

        let init = client.initialize().await?;
        client.server_info = init.server_info;
        client.protocol_version = init.protocol_version;
        client.supports_tools = init.capabilities.tools.is_some();

        Ok(client)
    }

    /// Send the initialize request to establish the MCP session.
    async fn initialize(&self) -> Result<InitializeResult, McpClientError> {
        let params = json!({
            "protocolVersion": "2024-11-05",
            "clientInfo": {
                "name": "toolgate",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });

        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    /// List available tools from the MCP server.
    pub async fn list_tools(&self) -> Result<Vec<DiscoveredTool>, McpClientError> {
        if !self.supports_tools {
            return Ok(Vec::new());
        }

        let result: Value = self.request("tools/list", None).await?;
        let tools_value = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(tools_value)?)
    }

    /// Call a tool on the MCP server.
    ///
    /// A tool failure the server reports in-band (`isError`) becomes a
    /// `ToolCallResult` with `is_error: true`; only transport and
    /// protocol breakdowns surface as `Err`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpClientError> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });

        let result: Value = self.request("tools/call", Some(params)).await?;

        let content = result.get("content").cloned().unwrap_or_else(|| json!([]));
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if is_error {
            Ok(ToolCallResult {
                is_error: true,
                content,
            })
        } else {
            Ok(ToolCallResult::success(content))
        }
    }

    /// Send a JSON-RPC request and wait for the response.
    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, McpClientError> {
        // One exchange at a time: a second caller must not write its
        // request before this one's response has been read.
        let _gate = self.request_gate.lock().await;

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        };
        let line = serde_json::to_string(&request)? + "\n";

        self.write_line(&line).await?;

        let response = timeout(REQUEST_TIMEOUT, self.read_response(id))
            .await
            .map_err(|_| McpClientError::Timeout)??;

        if let Some(err) = response.error {
            return Err(McpClientError::ServerError {
                code: err.code,
                message: err.message,
            });
        }

        let result = response.result.ok_or_else(|| {
            McpClientError::ProtocolError("Missing result in response".to_string())
        })?;
        serde_json::from_value(result).map_err(Into::into)
    }

    /// Send a JSON-RPC notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpClientError> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or_else(|| json!({}))
        });
        let line = serde_json::to_string(&notification)? + "\n";
        self.write_line(&line).await
    }

    async fn write_line(&self, line: &str) -> Result<(), McpClientError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(McpClientError::NotConnected)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the response for `expected_id` appears,
    /// skipping startup noise a wrapper like npx prints to stdout and
    /// any stray response that does not match the outstanding request.
    async fn read_response(&self, expected_id: u64) -> Result<JsonRpcResponse, McpClientError> {
        let mut guard = self.stdout.lock().await;
        let reader = guard.as_mut().ok_or(McpClientError::NotConnected)?;

        for _ in 0..MAX_NOISE_LINES {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    return Err(McpClientError::ProtocolError(
                        "Server closed connection".to_string(),
                    ));
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) {
                        if response.id == Some(expected_id) {
                            return Ok(response);
                        }
                        tracing::debug!(
                            expected_id,
                            got_id = ?response.id,
                            "Skipping response with mismatched id"
                        );
                        continue;
                    }
                    tracing::debug!(line = trimmed, "Skipping non-JSON-RPC output");
                }
                Err(e) => return Err(McpClientError::IoError(e)),
            }
        }

        Err(McpClientError::ProtocolError(
            "No valid JSON-RPC response received".to_string(),
        ))
    }

    /// Server info captured during the handshake.
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Negotiated protocol version.
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Disconnect, waiting up to `grace` for the process to exit after
    /// stdin closes before killing it.
    pub async fn shutdown(&self, grace: Duration) {
        // Dropping stdin signals EOF; well-behaved servers exit on it
        self.stdin.lock().await.take();
        self.stdout.lock().await.take();

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(%status, "MCP server exited on its own");
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Failed to wait for MCP server exit");
                }
                Err(_) => {
                    tracing::warn!("MCP server did not exit within grace period, killing");
                    let _ = child.kill().await;
                }
            }
        }
    }
}
