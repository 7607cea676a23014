//! `toolgate list`: print every configured server and its settings.

use crate::ToolgateConfig;

pub fn execute(config: &ToolgateConfig) {
    if config.servers.is_empty() {
        println!("No servers configured.");
        return;
    }

    println!(
        "{:<16} {:<24} {:<20} {:<9} {:<9} {:<16} {}",
        "ID", "NAME", "COMMAND", "ENABLED", "START", "APPROVAL", "RATE"
    );
    for server in &config.servers {
        let approval = serde_json::to_string(&server.approval)
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        let autostart = serde_json::to_string(&server.autostart)
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        let rate = server
            .max_calls_per_minute
            .map_or_else(|| "-".to_string(), |n| format!("{n}/min"));
        println!(
            "{:<16} {:<24} {:<20} {:<9} {:<9} {:<16} {}",
            server.id, server.name, server.command, server.enabled, autostart, approval, rate
        );
    }
}
