//! `toolgate doctor`: validate configuration and probe every server.
//!
//! Every server gets its own diagnosis; a broken one never aborts the
//! run.

use toolgate_core::ServerStatus;
use toolgate_mcp::ProcessManager;

use crate::ToolgateConfig;

pub async fn execute(config: &ToolgateConfig) -> anyhow::Result<()> {
    if config.servers.is_empty() {
        println!("No servers configured.");
        return Ok(());
    }

    let manager = ProcessManager::new();
    let mut healthy = 0usize;

    for server in &config.servers {
        print!("{} ... ", server.id);

        if let Err(reason) = server.validate() {
            println!("INVALID: {reason}");
            continue;
        }
        if !server.enabled {
            println!("disabled (skipped)");
            continue;
        }

        let state = manager.start_server(server).await;
        match state.status {
            ServerStatus::Running => {
                println!(
                    "ok ({} tools, handshake {} ms)",
                    state.tool_count,
                    state.handshake_ms.unwrap_or_default()
                );
                healthy += 1;
            }
            _ => {
                println!(
                    "FAILED: {}",
                    state.last_error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
    }

    manager.shutdown_all().await;
    println!();
    println!("{healthy}/{} servers healthy", config.servers.len());
    Ok(())
}
