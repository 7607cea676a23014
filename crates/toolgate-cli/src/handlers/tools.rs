//! `toolgate tools <server>`: one-shot discovery probe.
//!
//! Starts the server, prints its discovered tools, and shuts it down
//! again. The approval and rate-limiting layers are not involved; no
//! tool is ever called.

use anyhow::bail;

use toolgate_core::{infer_risk_hint, ServerStatus};
use toolgate_mcp::ProcessManager;

use crate::ToolgateConfig;

pub async fn execute(config: &ToolgateConfig, server_id: &str) -> anyhow::Result<()> {
    let Some(server) = config.server(server_id) else {
        bail!("No server with id '{server_id}' in the configuration");
    };

    let manager = ProcessManager::new();
    let state = manager.start_server(server).await;
    if state.status != ServerStatus::Running {
        manager.shutdown_all().await;
        bail!(
            "Server '{server_id}' failed to start: {}",
            state.last_error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let tools = manager.list_tools(server_id).await;
    println!(
        "{} tools discovered in {} ms:",
        tools.len(),
        state.handshake_ms.unwrap_or_default()
    );
    println!();
    for tool in &tools {
        let risk = infer_risk_hint(&tool.name);
        println!("  {} [{risk}]", tool.canonical_id);
        println!("    safe id: {}", tool.safe_id);
        if let Some(desc) = &tool.description {
            println!("    {desc}");
        }
    }

    manager.shutdown_all().await;
    Ok(())
}
