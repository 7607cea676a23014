//! Domain types shared across the toolgate crates.

mod server;
mod tool;

pub use server::{
    ApprovalMode, AutostartMode, EnvEntry, ServerConfig, ServerState, ServerStatus, ToolFilter,
};
pub use tool::{
    SafeIdError, ToolCallResult, ToolInfo, ToolOutcome, decode_safe_id, encode_safe_id,
};
