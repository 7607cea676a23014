//! End-to-end catalog tests against a scripted MCP server.
//!
//! Covers the whole invoke path: discovery, filtering, schema
//! validation, approval, and result mapping.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use toolgate_approval::{ApprovalBroker, ApprovalDecision, ApprovalPolicy, RateLimiter};
use toolgate_catalog::ToolCatalog;
use toolgate_core::{encode_safe_id, ApprovalMode, ServerConfig, ToolFilter, ToolOutcome};
use toolgate_mcp::ProcessManager;

const FAKE_SERVER: &str = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":'"$id"',"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"fake","version":"0.1.0"},"capabilities":{"tools":{}}}}'
      ;;
    *'"method":"tools/list"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":'"$id"',"result":{"tools":[{"name":"read_file","description":"Read a file","inputSchema":{"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}},{"name":"delete_file","inputSchema":{"type":"object","properties":{"path":{"type":"string"}},"required":["path"]}}]}}'
      ;;
    *'"method":"tools/call"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":'"$id"',"result":{"content":[{"type":"text","text":"file contents"}],"isError":false}}'
      ;;
  esac
done
"#;

fn fake_server_config(dir: &std::path::Path) -> ServerConfig {
    let script = dir.join("fake_mcp.sh");
    std::fs::write(&script, FAKE_SERVER).unwrap();
    ServerConfig::new("fake", "Fake Server", "sh")
        .with_args(vec![script.to_string_lossy().into_owned()])
        .with_approval(ApprovalMode::Never)
}

fn build_catalog() -> (ToolCatalog, Arc<ApprovalBroker>) {
    let broker = Arc::new(ApprovalBroker::new());
    let catalog = ToolCatalog::new(
        Arc::new(ProcessManager::new()),
        Arc::new(ApprovalPolicy::new(Arc::clone(&broker))),
        Arc::new(RateLimiter::new()),
    );
    (catalog, broker)
}

/// Answer the next approval request with the given decision.
fn respond_once(broker: Arc<ApprovalBroker>, decision: ApprovalDecision) {
    tokio::spawn(async move {
        loop {
            if broker.current().await.is_some() {
                broker.resolve_current(decision).await;
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
}

#[tokio::test]
async fn test_discover_expose_and_invoke() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _broker) = build_catalog();

    catalog.set_servers(vec![fake_server_config(dir.path())]).await;
    catalog.start_enabled().await;

    let tools = catalog.exposed_tools().await;
    assert_eq!(tools.len(), 2);

    let safe_id = encode_safe_id("fake::read_file");
    assert_eq!(
        catalog.canonical_for(&safe_id).await.as_deref(),
        Some("fake::read_file")
    );
    assert_eq!(
        catalog.safe_id_for("fake::read_file").await,
        Some(safe_id.clone())
    );

    let outcome = catalog.invoke(&safe_id, json!({"path": "/tmp/x"})).await;
    match outcome {
        ToolOutcome::Success { content } => {
            assert_eq!(content[0]["text"], json!("file contents"));
        }
        other => panic!("expected success, got {other:?}"),
    }

    catalog.shutdown().await;
}

#[tokio::test]
async fn test_schema_violation_is_error_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _broker) = build_catalog();

    catalog.set_servers(vec![fake_server_config(dir.path())]).await;
    catalog.start_enabled().await;

    // Missing the required "path" property
    let safe_id = encode_safe_id("fake::read_file");
    let outcome = catalog.invoke(&safe_id, json!({})).await;
    match outcome {
        ToolOutcome::Error { message } => {
            assert!(message.contains("path"), "unhelpful message: {message}");
        }
        other => panic!("expected error, got {other:?}"),
    }

    catalog.shutdown().await;
}

#[tokio::test]
async fn test_deny_filter_hides_tool() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _broker) = build_catalog();

    let mut config = fake_server_config(dir.path());
    config.filter = ToolFilter {
        allow: vec![],
        deny: vec!["delete_*".to_string()],
    };
    catalog.set_servers(vec![config]).await;
    catalog.start_enabled().await;

    let tools = catalog.exposed_tools().await;
    assert_eq!(tools.len(), 1);
    assert!(catalog.safe_id_for("fake::read_file").await.is_some());
    assert!(catalog.safe_id_for("fake::delete_file").await.is_none());

    // The hidden tool cannot be invoked even with its correct safe id
    let outcome = catalog
        .invoke(&encode_safe_id("fake::delete_file"), json!({"path": "/x"}))
        .await;
    assert!(matches!(outcome, ToolOutcome::Error { .. }));

    catalog.shutdown().await;
}

#[tokio::test]
async fn test_refresh_evicts_stale_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _broker) = build_catalog();

    catalog.set_servers(vec![fake_server_config(dir.path())]).await;
    catalog.start_enabled().await;
    assert_eq!(catalog.exposed_tools().await.len(), 2);

    // After the server stops, a refresh must drop every stale id
    catalog.shutdown().await;
    catalog.set_servers(vec![fake_server_config(dir.path())]).await;
    catalog.refresh_tools(Some("fake")).await;
    assert!(catalog.exposed_tools().await.is_empty());
    assert!(catalog.safe_id_for("fake::read_file").await.is_none());
}

#[tokio::test]
async fn test_disabling_server_evicts_and_refuses_its_tools() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _broker) = build_catalog();

    catalog.set_servers(vec![fake_server_config(dir.path())]).await;
    catalog.start_enabled().await;
    assert_eq!(catalog.exposed_tools().await.len(), 2);

    let safe_id = encode_safe_id("fake::read_file");
    assert!(catalog.invoke(&safe_id, json!({"path": "/x"})).await.is_success());

    // Disable the server in the next snapshot: its tools must vanish
    // immediately, not only after the next refresh
    let mut disabled = fake_server_config(dir.path());
    disabled.enabled = false;
    catalog.set_servers(vec![disabled]).await;

    assert!(catalog.exposed_tools().await.is_empty());
    assert!(catalog.safe_id_for("fake::read_file").await.is_none());
    let outcome = catalog.invoke(&safe_id, json!({"path": "/x"})).await;
    assert!(matches!(outcome, ToolOutcome::Error { .. }));

    // A full refresh must not resurrect them
    catalog.refresh_tools(None).await;
    assert!(catalog.exposed_tools().await.is_empty());

    catalog.shutdown().await;
}

#[tokio::test]
async fn test_removing_server_evicts_tools_and_stops_process() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _broker) = build_catalog();

    catalog.set_servers(vec![fake_server_config(dir.path())]).await;
    catalog.start_enabled().await;
    assert_eq!(catalog.exposed_tools().await.len(), 2);

    catalog.set_servers(Vec::new()).await;

    assert!(catalog.exposed_tools().await.is_empty());
    assert!(catalog.safe_id_for("fake::read_file").await.is_none());
    let state = catalog
        .server_states()
        .await
        .into_iter()
        .find(|s| s.id == "fake")
        .unwrap();
    assert_eq!(state.status, toolgate_core::ServerStatus::Stopped);

    let outcome = catalog
        .invoke(&encode_safe_id("fake::read_file"), json!({"path": "/x"}))
        .await;
    assert!(matches!(outcome, ToolOutcome::Error { .. }));
}

#[tokio::test]
async fn test_denied_approval_maps_to_denied_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, broker) = build_catalog();

    let config = fake_server_config(dir.path()).with_approval(ApprovalMode::Always);
    catalog.set_servers(vec![config]).await;
    catalog.start_enabled().await;

    respond_once(
        Arc::clone(&broker),
        ApprovalDecision {
            approved: false,
            custom_response: Some("not on my machine".to_string()),
        },
    );

    let outcome = catalog
        .invoke(&encode_safe_id("fake::read_file"), json!({"path": "/x"}))
        .await;
    match outcome {
        ToolOutcome::Denied { reason } => {
            assert_eq!(reason.as_deref(), Some("not on my machine"));
        }
        other => panic!("expected denial, got {other:?}"),
    }

    catalog.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_approval_maps_to_cancelled_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, broker) = build_catalog();

    let config = fake_server_config(dir.path()).with_approval(ApprovalMode::Always);
    catalog.set_servers(vec![config]).await;
    catalog.start_enabled().await;

    {
        let broker = Arc::clone(&broker);
        tokio::spawn(async move {
            loop {
                if broker.current().await.is_some() {
                    broker.cancel_current().await;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
    }

    let outcome = catalog
        .invoke(&encode_safe_id("fake::read_file"), json!({"path": "/x"}))
        .await;
    assert!(matches!(outcome, ToolOutcome::Cancelled));

    catalog.shutdown().await;
}

#[tokio::test]
async fn test_call_after_server_stop_is_error_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _broker) = build_catalog();

    catalog.set_servers(vec![fake_server_config(dir.path())]).await;
    catalog.start_enabled().await;
    let safe_id = encode_safe_id("fake::read_file");

    // Stop the process but leave the exposed entry in place: the call
    // must surface as a structured error, never a panic
    catalog.shutdown().await;
    catalog.set_servers(vec![fake_server_config(dir.path())]).await;
    catalog.refresh_tools(None).await;

    let outcome = catalog.invoke(&safe_id, json!({"path": "/x"})).await;
    assert!(matches!(outcome, ToolOutcome::Error { .. }));
}

#[tokio::test]
async fn test_per_tool_approval_override() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, broker) = build_catalog();

    // Server default Never, but delete_file overridden to Always
    let mut config = fake_server_config(dir.path());
    config
        .tool_approval
        .insert("delete_file".to_string(), ApprovalMode::Always);
    catalog.set_servers(vec![config]).await;
    catalog.start_enabled().await;

    // read_file needs no prompt
    let outcome = catalog
        .invoke(&encode_safe_id("fake::read_file"), json!({"path": "/x"}))
        .await;
    assert!(outcome.is_success());

    // delete_file does; deny it
    respond_once(
        Arc::clone(&broker),
        ApprovalDecision {
            approved: false,
            custom_response: None,
        },
    );
    let outcome = catalog
        .invoke(&encode_safe_id("fake::delete_file"), json!({"path": "/x"}))
        .await;
    assert!(matches!(outcome, ToolOutcome::Denied { .. }));

    catalog.shutdown().await;
}
