//! Facade exposing filtered, approval-gated MCP tools to an agent
//! runtime.
//!
//! An embedding application builds a [`ToolCatalog`] from a process
//! manager, an approval policy, and a rate limiter, hands it the server
//! configuration, and merges [`ToolCatalog::exposed_tools`] into the
//! agent's callable tool set. Every invocation goes through
//! [`ToolCatalog::invoke`], which folds all failure modes into a
//! `ToolOutcome` instead of erroring.

pub mod catalog;

pub use catalog::{ExposedTool, ToolCatalog};
