//! MCP server configuration and runtime state.
//!
//! `ServerConfig` is owned by whatever loads configuration (the CLI, an
//! embedding application) and is read-only to the core. `ServerState` is
//! owned by the process manager and replaced wholesale on every
//! (re)start attempt.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// When a configured server should be started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutostartMode {
    /// Start the server when the host starts.
    #[default]
    Startup,
    /// Only start when explicitly asked.
    Manual,
}

/// How tool calls to a server are gated on human approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    /// Never prompt; every call is approved.
    Never,
    /// Prompt on every call; grants are never cached.
    #[default]
    Always,
    /// Prompt once, then cache the grant for the whole server.
    OncePerServer,
    /// Prompt once per tool, then cache the grant for that tool.
    OncePerTool,
}

/// Environment variable entry for a server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    /// Environment variable key
    pub key: String,
    /// Environment variable value
    pub value: String,
}

impl EnvEntry {
    /// Create a new environment variable entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Glob-based tool filter. Deny patterns take precedence over allow
/// patterns; an empty allow list admits everything not denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFilter {
    /// Patterns a tool name must match to be exposed (empty = all).
    #[serde(default)]
    pub allow: Vec<String>,
    /// Patterns that exclude a tool name regardless of the allow list.
    #[serde(default)]
    pub deny: Vec<String>,
}

impl ToolFilter {
    /// Whether a tool name survives this filter.
    pub fn permits(&self, tool_name: &str) -> bool {
        if self
            .deny
            .iter()
            .any(|p| crate::filter::glob_match(p, tool_name))
        {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow
            .iter()
            .any(|p| crate::filter::glob_match(p, tool_name))
    }
}

/// Configuration for one MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server id (used as the canonical-id prefix).
    pub id: String,

    /// User-friendly name shown in approval prompts.
    pub name: String,

    /// Command to execute (executable name or absolute path).
    pub command: String,

    /// Arguments to pass to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables for the server process.
    #[serde(default)]
    pub env: Vec<EnvEntry>,

    /// Whether tools from this server are exposed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// When this server should be started.
    #[serde(default)]
    pub autostart: AutostartMode,

    /// Allow/deny glob filter applied to discovered tool names.
    #[serde(default)]
    pub filter: ToolFilter,

    /// Default approval mode for this server's tools.
    #[serde(default)]
    pub approval: ApprovalMode,

    /// Per-tool approval-mode overrides, keyed by raw tool name.
    #[serde(default)]
    pub tool_approval: HashMap<String, ApprovalMode>,

    /// Server is bundled with the host rather than a generic MCP process.
    #[serde(default)]
    pub native: bool,

    /// Rate limit for tool calls, in calls per minute (absent = unlimited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_calls_per_minute: Option<u32>,

    /// Working directory for the process (must be absolute if specified).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

const fn default_true() -> bool {
    true
}

impl ServerConfig {
    /// Create a minimal stdio server configuration.
    pub fn new(id: impl Into<String>, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            enabled: true,
            autostart: AutostartMode::Startup,
            filter: ToolFilter::default(),
            approval: ApprovalMode::default(),
            tool_approval: HashMap::new(),
            native: false,
            max_calls_per_minute: None,
            working_dir: None,
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvEntry::new(key, value));
        self
    }

    /// Set the default approval mode.
    #[must_use]
    pub const fn with_approval(mut self, mode: ApprovalMode) -> Self {
        self.approval = mode;
        self
    }

    /// Set the rate limit in calls per minute.
    #[must_use]
    pub const fn with_rate_limit(mut self, max_calls_per_minute: u32) -> Self {
        self.max_calls_per_minute = Some(max_calls_per_minute);
        self
    }

    /// Resolve the effective approval mode for a tool, honoring any
    /// per-tool override before the server default.
    pub fn approval_mode_for(&self, tool_name: &str) -> ApprovalMode {
        self.tool_approval
            .get(tool_name)
            .copied()
            .unwrap_or(self.approval)
    }

    /// Validate the configuration.
    ///
    /// Returns an error if required fields are missing or malformed. A
    /// server that fails validation is treated as absent by the catalog.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("server id cannot be empty".to_string());
        }
        if self.id.contains("::") {
            return Err(format!(
                "server id must not contain '::' (reserved for canonical ids): {}",
                self.id
            ));
        }
        if self.command.is_empty() {
            return Err("server command cannot be empty".to_string());
        }
        if self.command.contains(char::is_whitespace) {
            return Err(
                "command must be an executable name/path only (e.g., 'npx'); \
                 put flags and arguments in the 'args' field"
                    .to_string(),
            );
        }
        if let Some(ref cwd) = self.working_dir {
            if !cwd.is_empty() && !std::path::Path::new(cwd).is_absolute() {
                return Err(format!("working_dir must be absolute: {cwd}"));
            }
        }
        if self.max_calls_per_minute == Some(0) {
            return Err("max_calls_per_minute must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Runtime status of a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Server is not running
    #[default]
    Stopped,
    /// Server is starting up
    Starting,
    /// Server is running and connected
    Running,
    /// Server encountered an error
    Error,
}

/// Runtime state of one server, owned by the process manager.
///
/// A new instance replaces the previous one on every start attempt;
/// state is never merged across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerState {
    /// Server id this state belongs to.
    pub id: String,
    /// Current status.
    pub status: ServerStatus,
    /// Handshake latency in milliseconds (set once running).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake_ms: Option<u64>,
    /// Number of tools discovered on the last successful start.
    pub tool_count: usize,
    /// Last startup or runtime error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ServerState {
    /// State for a server that has never been started.
    pub fn stopped(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ServerStatus::Stopped,
            handshake_ms: None,
            tool_count: 0,
            last_error: None,
        }
    }

    /// State for a server whose start attempt is in flight.
    pub fn starting(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ServerStatus::Starting,
            handshake_ms: None,
            tool_count: 0,
            last_error: None,
        }
    }

    /// State for a successfully started server.
    pub fn running(id: impl Into<String>, handshake_ms: u64, tool_count: usize) -> Self {
        Self {
            id: id.into(),
            status: ServerStatus::Running,
            handshake_ms: Some(handshake_ms),
            tool_count,
            last_error: None,
        }
    }

    /// State for a server that failed to start or crashed.
    pub fn errored(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ServerStatus::Error,
            handshake_ms: None,
            tool_count: 0,
            last_error: Some(message.into()),
        }
    }
}
