//! Core domain types and pure logic for toolgate.
//!
//! This crate holds everything the runtime crates share but that has no
//! runtime machinery of its own: server configuration and state types,
//! discovered-tool identity (canonical and safe ids), the JSON-Schema
//! subset used to validate tool arguments, risk-hint inference, the
//! shell base-command parser, and the allow/deny glob matcher.

pub mod domain;
pub mod filter;
pub mod risk;
pub mod schema;
pub mod shell;

// Re-export commonly used types for convenience
pub use domain::{
    ApprovalMode, AutostartMode, EnvEntry, SafeIdError, ServerConfig, ServerState, ServerStatus,
    ToolCallResult, ToolFilter, ToolInfo, ToolOutcome, decode_safe_id, encode_safe_id,
};
pub use risk::{RiskHint, infer_risk_hint};
pub use schema::SchemaNode;
pub use shell::{base_command, tokenize_command};
