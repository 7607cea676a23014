//! Diagnostic CLI for toolgate server configurations.
//!
//! Command definitions and config loading live here; `main.rs` is the
//! composition root that wires them to handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod config;
pub mod handlers;

pub use config::{ConfigError, ToolgateConfig};

/// Inspect and probe MCP server configurations.
#[derive(Parser)]
#[command(name = "toolgate", version, about)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(
        short,
        long,
        env = "TOOLGATE_CONFIG",
        default_value = "toolgate.json",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured servers and their settings.
    List,

    /// Start one server, print its discovered tools, and shut it down.
    Tools {
        /// Id of the server to probe.
        server: String,
    },

    /// Validate the configuration and probe every server.
    Doctor,
}
