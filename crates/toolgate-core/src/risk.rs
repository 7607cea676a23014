//! Risk-hint inference from tool names.
//!
//! A coarse classification used to prioritize approval scrutiny. It
//! deliberately looks only at the tool *name*: arguments are rendered
//! separately in the approval preview, and names are the one thing every
//! MCP server provides.

use serde::{Deserialize, Serialize};

/// Coarse risk classification for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskHint {
    Read,
    Write,
    Execute,
    Network,
    Unknown,
}

impl RiskHint {
    /// Short human label for previews.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RiskHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// Checked in priority order: the first category with a matching keyword
// wins, so destructive names are never downgraded by a later match.
const EXECUTE_KEYWORDS: &[&str] = &[
    // delete-like
    "delete", "remove", "destroy", "drop", "purge", "wipe", "kill", "terminate",
    // exec-like
    "exec", "execute", "run", "spawn", "shell", "command", "eval", "invoke",
];

const WRITE_KEYWORDS: &[&str] = &[
    "write", "create", "update", "insert", "set", "put", "patch", "post", "upload", "save",
    "move", "copy", "rename", "mkdir", "append", "edit",
];

const NETWORK_KEYWORDS: &[&str] = &[
    "fetch", "http", "request", "download", "url", "browse", "navigate", "curl", "socket",
];

const READ_KEYWORDS: &[&str] = &[
    "read", "get", "list", "search", "query", "find", "view", "show", "stat", "info", "describe",
];

/// Infer a risk hint from a tool name.
///
/// Case-insensitive substring match against keyword lists in fixed
/// priority order (execute > write > network > read). No match yields
/// `Unknown`.
pub fn infer_risk_hint(tool_name: &str) -> RiskHint {
    let name = tool_name.to_lowercase();

    if EXECUTE_KEYWORDS.iter().any(|k| name.contains(k)) {
        return RiskHint::Execute;
    }
    if WRITE_KEYWORDS.iter().any(|k| name.contains(k)) {
        return RiskHint::Write;
    }
    if NETWORK_KEYWORDS.iter().any(|k| name.contains(k)) {
        return RiskHint::Network;
    }
    if READ_KEYWORDS.iter().any(|k| name.contains(k)) {
        return RiskHint::Read;
    }
    RiskHint::Unknown
}
