//! MCP server process lifecycle and stdio JSON-RPC transport.
//!
//! This crate owns the OS processes behind configured MCP servers and
//! exposes a failure-isolated interface to the rest of toolgate: starts
//! that fail are reported through `ServerState`, tool calls that fail
//! are reported through `ToolCallResult`, and nothing on the public
//! surface panics or errors because one server misbehaved.

pub mod client;
pub mod manager;

pub use client::{DiscoveredTool, InitializeResult, McpClient, McpClientError, ServerInfo};
pub use manager::ProcessManager;
