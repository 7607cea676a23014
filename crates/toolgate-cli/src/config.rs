//! Configuration file loading.
//!
//! The CLI owns persistence; the core crates only ever see the parsed
//! `ServerConfig` list.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use toolgate_core::ServerConfig;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level configuration file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolgateConfig {
    /// Configured MCP servers.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl ToolgateConfig {
    /// Load and parse a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Find a server by id.
    pub fn server(&self, id: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.id == id)
    }
}
