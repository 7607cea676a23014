//! The tool catalog: the one facade an agent runtime talks to.
//!
//! The catalog composes the process manager, the approval policy, and
//! the rate limiter. It owns the mapping from exposed safe ids to
//! invocable tools and routes every call through filtering, argument
//! validation, approval, and rate limiting before it reaches a server.
//!
//! `invoke` never panics and never returns `Err`: every failure mode is
//! folded into a `ToolOutcome` so a single bad tool call cannot crash
//! the agent loop.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use toolgate_approval::{ApprovalOutcome, ApprovalPolicy, RateLimiter};
use toolgate_core::{SchemaNode, ServerConfig, ServerState, ToolInfo, ToolOutcome};
use toolgate_mcp::ProcessManager;

/// Server ids that are always treated as native (bundled with the
/// host), whether or not their config carries the `native` flag.
const BUILTIN_SERVER_IDS: &[&str] = &["filesystem", "shell"];

/// One exposed tool: its discovery metadata plus the parsed argument
/// validator derived from its input schema.
#[derive(Debug, Clone)]
pub struct ExposedTool {
    pub info: ToolInfo,
    schema: SchemaNode,
}

/// Facade over process lifecycle, filtering, approval, and rate
/// limiting. Constructed explicitly from its collaborators; there is no
/// global instance.
pub struct ToolCatalog {
    manager: Arc<ProcessManager>,
    policy: Arc<ApprovalPolicy>,
    limiter: Arc<RateLimiter>,
    configs: RwLock<HashMap<String, ServerConfig>>,
    /// safe id → exposed tool. Rebuilt per server on refresh.
    exposed: RwLock<HashMap<String, ExposedTool>>,
    /// canonical id → safe id index, kept in lockstep with `exposed`.
    canonical_index: RwLock<HashMap<String, String>>,
}

impl ToolCatalog {
    /// Create a catalog over the given collaborators with no servers
    /// configured yet.
    pub fn new(
        manager: Arc<ProcessManager>,
        policy: Arc<ApprovalPolicy>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            manager,
            policy,
            limiter,
            configs: RwLock::new(HashMap::new()),
            exposed: RwLock::new(HashMap::new()),
            canonical_index: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the authoritative server configuration snapshot.
    ///
    /// Everything derived from the old snapshot is reconciled: rate
    /// limit buckets are rebuilt, removed servers are stopped, exposed
    /// tools whose server is gone or disabled are evicted, and every
    /// cached approval grant is dropped (a config change may have
    /// altered approval modes or filters, so old grants no longer
    /// apply).
    pub async fn set_servers(&self, servers: Vec<ServerConfig>) {
        let removed: Vec<String> = {
            let mut configs = self.configs.write().await;
            let removed: Vec<String> = configs
                .keys()
                .filter(|id| !servers.iter().any(|s| &s.id == *id))
                .cloned()
                .collect();
            for id in &removed {
                configs.remove(id);
                self.limiter.remove(id).await;
            }
            for server in servers {
                match server.max_calls_per_minute {
                    Some(limit) => self.limiter.configure(&server.id, limit).await,
                    None => self.limiter.remove(&server.id).await,
                }
                configs.insert(server.id.clone(), server);
            }
            removed
        };

        for id in &removed {
            self.manager.stop_server(id).await;
        }
        self.evict_unbacked().await;
        self.policy.clear_cache().await;
        tracing::debug!(removed = removed.len(), "Server configuration replaced");
    }

    /// Drop every exposed entry whose server is no longer present and
    /// enabled in the current snapshot.
    async fn evict_unbacked(&self) {
        let configs = self.configs.read().await;
        let mut exposed = self.exposed.write().await;
        let mut index = self.canonical_index.write().await;
        exposed.retain(|_, t| {
            configs
                .get(&t.info.server_id)
                .is_some_and(|c| c.enabled)
        });
        index.retain(|_, safe_id| exposed.contains_key(safe_id));
    }

    /// Start every enabled server configured for autostart.
    ///
    /// Failures are isolated per server: each start attempt records its
    /// own outcome and the loop always continues to the next server.
    pub async fn start_enabled(&self) {
        let to_start: Vec<ServerConfig> = {
            let configs = self.configs.read().await;
            configs
                .values()
                .filter(|c| c.enabled && c.autostart == toolgate_core::AutostartMode::Startup)
                .cloned()
                .collect()
        };

        for config in to_start {
            let state = self.manager.start_server(&config).await;
            if state.status == toolgate_core::ServerStatus::Running {
                self.refresh_tools(Some(&config.id)).await;
            }
        }
    }

    /// Rebuild the exposed tool set for one server, or for every
    /// enabled server if no id is given.
    ///
    /// Eviction happens before reinsertion: every previously exposed
    /// entry for the server is purged from both maps first, so a
    /// renamed or withdrawn tool can never leave a stale id behind.
    pub async fn refresh_tools(&self, server_id: Option<&str>) {
        // Disabled servers are included so the eviction branch runs for
        // them; refresh_one exposes nothing for a disabled config.
        let targets: Vec<String> = {
            let configs = self.configs.read().await;
            match server_id {
                Some(id) => configs.keys().filter(|k| *k == id).cloned().collect(),
                None => configs.keys().cloned().collect(),
            }
        };

        for id in targets {
            self.refresh_one(&id).await;
        }
    }

    async fn refresh_one(&self, server_id: &str) {
        let Some(config) = self.config_for(server_id).await else {
            return;
        };

        let discovered = self.manager.list_tools(server_id).await;

        let canonical_prefix = format!("{server_id}::");
        let mut exposed = self.exposed.write().await;
        let mut index = self.canonical_index.write().await;
        exposed.retain(|_, t| t.info.server_id != server_id);
        index.retain(|canonical, _| !canonical.starts_with(&canonical_prefix));

        if !config.enabled {
            return;
        }

        let mut kept = 0usize;
        for info in discovered {
            if !config.filter.permits(&info.name) {
                tracing::debug!(
                    server_id = %server_id,
                    tool = %info.name,
                    "Tool excluded by filter"
                );
                continue;
            }
            let schema = info
                .input_schema
                .as_ref()
                .map_or(SchemaNode::Any, SchemaNode::parse);
            index.insert(info.canonical_id.clone(), info.safe_id.clone());
            exposed.insert(info.safe_id.clone(), ExposedTool { info, schema });
            kept += 1;
        }
        tracing::info!(server_id = %server_id, exposed = kept, "Tool set refreshed");
    }

    /// Route one tool call through validation, approval, rate limiting,
    /// and finally the server.
    pub async fn invoke(&self, safe_id: &str, args: Value) -> ToolOutcome {
        let Some(tool) = self.exposed_tool(safe_id).await else {
            return ToolOutcome::error(format!("Unknown tool: {safe_id}"));
        };
        let Some(config) = self.config_for(&tool.info.server_id).await else {
            return ToolOutcome::error(format!(
                "Server '{}' is no longer configured",
                tool.info.server_id
            ));
        };
        if !config.enabled {
            return ToolOutcome::error(format!(
                "Server '{}' is disabled",
                tool.info.server_id
            ));
        }

        if let Err(reason) = tool.schema.validate(&args) {
            return ToolOutcome::error(format!(
                "Invalid arguments for {}: {reason}",
                tool.info.canonical_id
            ));
        }

        let mode = config.approval_mode_for(&tool.info.name);
        match self
            .policy
            .request_approval(
                &config.id,
                &config.name,
                &tool.info.name,
                &tool.info.canonical_id,
                &args,
                mode,
            )
            .await
        {
            ApprovalOutcome::Approved { custom_response } => {
                if let Some(note) = custom_response {
                    tracing::debug!(
                        canonical_id = %tool.info.canonical_id,
                        note = %note,
                        "Approved with user note"
                    );
                }
            }
            ApprovalOutcome::Denied { reason } => return ToolOutcome::Denied { reason },
            ApprovalOutcome::Cancelled => return ToolOutcome::Cancelled,
        }

        self.limiter.acquire(&tool.info.server_id).await;

        let result = self
            .manager
            .call_tool(&tool.info.server_id, &tool.info.name, args)
            .await;
        if result.is_error {
            ToolOutcome::Error {
                message: render_error_content(&result.content),
            }
        } else {
            ToolOutcome::Success {
                content: result.content,
            }
        }
    }

    /// Metadata for an exposed tool.
    pub async fn get_tool_info(&self, safe_id: &str) -> Option<ToolInfo> {
        self.exposed_tool(safe_id).await.map(|t| t.info)
    }

    /// Safe id for a canonical id, if that tool is currently exposed.
    pub async fn safe_id_for(&self, canonical_id: &str) -> Option<String> {
        let index = self.canonical_index.read().await;
        index.get(canonical_id).cloned()
    }

    /// Canonical id for a safe id, if that tool is currently exposed.
    pub async fn canonical_for(&self, safe_id: &str) -> Option<String> {
        self.exposed_tool(safe_id)
            .await
            .map(|t| t.info.canonical_id)
    }

    /// Whether a tool belongs to a native (bundled) server. Used by the
    /// agent for display only, never to bypass approval.
    pub async fn is_native(&self, safe_id: &str) -> bool {
        let Some(tool) = self.exposed_tool(safe_id).await else {
            return false;
        };
        if BUILTIN_SERVER_IDS.contains(&tool.info.server_id.as_str()) {
            return true;
        }
        self.config_for(&tool.info.server_id)
            .await
            .is_some_and(|c| c.native)
    }

    /// Flat safe-id → tool map for merging into the agent's callable
    /// set. Merge precedence against built-in tools is the caller's
    /// responsibility.
    pub async fn exposed_tools(&self) -> HashMap<String, ToolInfo> {
        let exposed = self.exposed.read().await;
        exposed
            .iter()
            .map(|(safe_id, t)| (safe_id.clone(), t.info.clone()))
            .collect()
    }

    /// Runtime state snapshot for every server a start was attempted on.
    pub async fn server_states(&self) -> Vec<ServerState> {
        self.manager.states().await
    }

    /// Stop every managed server process.
    pub async fn shutdown(&self) {
        self.manager.shutdown_all().await;
        let mut exposed = self.exposed.write().await;
        let mut index = self.canonical_index.write().await;
        exposed.clear();
        index.clear();
    }

    async fn exposed_tool(&self, safe_id: &str) -> Option<ExposedTool> {
        let exposed = self.exposed.read().await;
        exposed.get(safe_id).cloned()
    }

    async fn config_for(&self, server_id: &str) -> Option<ServerConfig> {
        let configs = self.configs.read().await;
        configs.get(server_id).cloned()
    }
}

/// Render error content (usually a plain string, sometimes structured)
/// into a displayable message.
fn render_error_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
