//! Discovered-tool identity and call result shapes.
//!
//! Every discovered tool gets two identifiers:
//! - a **canonical id** (`server::tool`), stable and human-meaningful;
//! - a **safe id**, an identifier-safe rewriting of the canonical id for
//!   consumers that need a flat namespace of callable names (LLM
//!   function names allow only `[A-Za-z0-9_]`).
//!
//! The safe-id encoding is a bijection: `decode_safe_id` recovers the
//! exact canonical id, so no two tools can ever collide.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Separator between server id and tool name in a canonical id.
pub const CANONICAL_SEPARATOR: &str = "::";

/// Prefix marking a safe id as a toolgate-managed external tool.
const SAFE_ID_PREFIX: &str = "mcp";

/// Errors decoding a safe id back to its canonical form.
#[derive(Debug, Error)]
pub enum SafeIdError {
    #[error("Safe id missing '{SAFE_ID_PREFIX}' prefix: {0}")]
    MissingPrefix(String),

    #[error("Truncated or invalid escape sequence in safe id: {0}")]
    BadEscape(String),

    #[error("Safe id does not decode to valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Encode a canonical id (`server::tool`) into an identifier-safe name.
///
/// ASCII alphanumerics pass through; every other byte becomes `_xx`
/// (lowercase hex). `_` itself is escaped, so `_` in the output always
/// marks an escape sequence and the encoding is reversible.
pub fn encode_safe_id(canonical_id: &str) -> String {
    let mut out = String::with_capacity(SAFE_ID_PREFIX.len() + canonical_id.len());
    out.push_str(SAFE_ID_PREFIX);
    for byte in canonical_id.bytes() {
        if byte.is_ascii_alphanumeric() {
            out.push(byte as char);
        } else {
            out.push('_');
            out.push_str(&format!("{byte:02x}"));
        }
    }
    out
}

/// Decode a safe id back to the canonical id it was derived from.
pub fn decode_safe_id(safe_id: &str) -> Result<String, SafeIdError> {
    let encoded = safe_id
        .strip_prefix(SAFE_ID_PREFIX)
        .ok_or_else(|| SafeIdError::MissingPrefix(safe_id.to_string()))?;

    let mut bytes = Vec::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        if c == '_' {
            let hi = chars.next();
            let lo = chars.next();
            let (Some(hi), Some(lo)) = (hi, lo) else {
                return Err(SafeIdError::BadEscape(safe_id.to_string()));
            };
            let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                .map_err(|_| SafeIdError::BadEscape(safe_id.to_string()))?;
            bytes.push(byte);
        } else {
            bytes.push(c as u8);
        }
    }

    String::from_utf8(bytes).map_err(|_| SafeIdError::InvalidUtf8(safe_id.to_string()))
}

/// A tool discovered from an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Id of the server that exposes this tool.
    pub server_id: String,

    /// Raw tool name as reported by the server.
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters, as discovered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    /// Stable `server::tool` identifier.
    pub canonical_id: String,

    /// Identifier-safe rewriting of the canonical id.
    pub safe_id: String,
}

impl ToolInfo {
    /// Build a `ToolInfo` from a server id and raw tool fields,
    /// deriving both identifiers.
    pub fn new(server_id: impl Into<String>, name: impl Into<String>) -> Self {
        let server_id = server_id.into();
        let name = name.into();
        let canonical_id = format!("{server_id}{CANONICAL_SEPARATOR}{name}");
        let safe_id = encode_safe_id(&canonical_id);
        Self {
            server_id,
            name,
            description: None,
            input_schema: None,
            canonical_id,
            safe_id,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Result of forwarding a single tool call to a server.
///
/// Transport and protocol failures are carried in-band (`is_error`
/// true with diagnostic content), never as an `Err` — the caller always
/// has a normal tool result to hand back to the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Whether the server (or the transport) reported a failure.
    pub is_error: bool,
    /// Result content, or diagnostic content on failure.
    pub content: Value,
}

impl ToolCallResult {
    /// A successful call with its content.
    pub const fn success(content: Value) -> Self {
        Self {
            is_error: false,
            content,
        }
    }

    /// A failed call with a diagnostic message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: Value::String(message.into()),
        }
    }
}

/// Final outcome of an invocation through the catalog.
///
/// Denial and cancellation are deliberately distinct from errors so the
/// agent can react differently to "the user said no" versus "the call
/// failed" versus "the prompt was dismissed before a decision".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    /// The call ran and the server returned content.
    Success { content: Value },
    /// The call failed (transport, protocol, validation, or server error).
    Error { message: String },
    /// The user rejected the call.
    Denied {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// The approval request was cancelled before a decision.
    Cancelled,
}

impl ToolOutcome {
    /// An error outcome from any displayable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this outcome carries successful content.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
