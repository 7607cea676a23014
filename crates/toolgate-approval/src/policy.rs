//! Approval policy: decide whether a tool call runs, prompts, or is
//! refused.
//!
//! `mode: Never` short-circuits everything. Otherwise a granted
//! approval may be cached at one of three scopes — whole server, one
//! tool, or one exact argument set — and every scope is checked on each
//! new request (a server-level grant covers tool- and args-level
//! requests too). Entries expire after a fixed TTL and are additive:
//! a grant never extends or upgrades an existing one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::broker::{ApprovalBroker, ApprovalReply, ApprovalRequest};
use toolgate_core::{infer_risk_hint, ApprovalMode};

/// How long a cached grant remains valid.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Maximum rendered length of one argument preview line value.
const PREVIEW_VALUE_MAX: usize = 120;

/// Scoped key for a cached grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    /// Any tool on this server.
    Server(String),
    /// One tool (canonical id).
    Tool(String),
    /// One tool with one exact argument set (canonical id + args hash).
    Args(String),
}

/// Outcome of an approval check.
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    /// The call may proceed (possibly with a user note attached).
    Approved { custom_response: Option<String> },
    /// The user rejected the call.
    Denied { reason: Option<String> },
    /// The request was cancelled before a decision.
    Cancelled,
}

/// The approval policy, shared by every tool executor.
pub struct ApprovalPolicy {
    broker: Arc<ApprovalBroker>,
    cache: Mutex<HashMap<CacheKey, Instant>>,
}

impl ApprovalPolicy {
    /// Create a policy that prompts through the given broker.
    pub fn new(broker: Arc<ApprovalBroker>) -> Self {
        Self {
            broker,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The broker this policy submits requests to (for wiring up a UI).
    pub fn broker(&self) -> &Arc<ApprovalBroker> {
        &self.broker
    }

    /// Decide whether one tool call may proceed.
    pub async fn request_approval(
        &self,
        server_id: &str,
        server_name: &str,
        tool_name: &str,
        canonical_id: &str,
        args: &Value,
        mode: ApprovalMode,
    ) -> ApprovalOutcome {
        if mode == ApprovalMode::Never {
            return ApprovalOutcome::Approved {
                custom_response: None,
            };
        }

        // Broadest scope first: a server-level grant short-circuits
        // tool- and args-level checks. No current mode inserts at the
        // Args scope; it is checked here so a per-args mode only needs
        // to add its insert below.
        let server_key = CacheKey::Server(server_id.to_string());
        let tool_key = CacheKey::Tool(canonical_id.to_string());
        let args_key = CacheKey::Args(format!("{canonical_id}#{}", hash_args(args)));
        if self
            .cache_hit(&[&server_key, &tool_key, &args_key])
            .await
        {
            tracing::debug!(canonical_id, "Approval satisfied from cache");
            return ApprovalOutcome::Approved {
                custom_response: None,
            };
        }

        let request = build_request(server_id, server_name, tool_name, canonical_id, args);
        let risk = request.risk;

        match self.broker.submit(request).await {
            ApprovalReply::Decision(decision) if decision.approved => {
                let cache_key = match mode {
                    ApprovalMode::OncePerServer => Some(server_key),
                    ApprovalMode::OncePerTool => Some(tool_key),
                    // `Always` (and `Never`, handled above) never cache
                    ApprovalMode::Always | ApprovalMode::Never => None,
                };
                if let Some(key) = cache_key {
                    let mut cache = self.cache.lock().await;
                    cache.insert(key, Instant::now() + CACHE_TTL);
                }
                tracing::info!(canonical_id, risk = %risk, "Tool call approved");
                ApprovalOutcome::Approved {
                    custom_response: decision.custom_response,
                }
            }
            ApprovalReply::Decision(decision) => {
                tracing::info!(canonical_id, "Tool call denied");
                ApprovalOutcome::Denied {
                    reason: decision.custom_response,
                }
            }
            ApprovalReply::Cancelled => {
                tracing::info!(canonical_id, "Approval request cancelled");
                ApprovalOutcome::Cancelled
            }
        }
    }

    /// Whether any of the keys holds an unexpired grant. Expired
    /// entries encountered along the way are pruned.
    async fn cache_hit(&self, keys: &[&CacheKey]) -> bool {
        let now = Instant::now();
        let mut cache = self.cache.lock().await;
        cache.retain(|_, expiry| *expiry > now);
        keys.iter().any(|key| cache.contains_key(*key))
    }

    /// Drop every cached grant immediately (used on config change).
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.lock().await;
        let dropped = cache.len();
        cache.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Approval cache cleared");
        }
    }
}

/// Build the human-facing approval request for one call.
fn build_request(
    server_id: &str,
    server_name: &str,
    tool_name: &str,
    canonical_id: &str,
    args: &Value,
) -> ApprovalRequest {
    let risk = infer_risk_hint(tool_name);
    let payload_bytes = serde_json::to_vec(args).map(|b| b.len()).unwrap_or(0);

    let content = match args {
        Value::Object(fields) if !fields.is_empty() => fields
            .iter()
            .map(|(key, value)| format!("{key}: {}", preview_value(value)))
            .collect(),
        Value::Object(_) => vec!["(no arguments)".to_string()],
        other => vec![format!("arguments: {}", preview_value(other))],
    };

    ApprovalRequest {
        id: Uuid::new_v4(),
        server_id: server_id.to_string(),
        server_name: server_name.to_string(),
        tool_name: tool_name.to_string(),
        canonical_id: canonical_id.to_string(),
        title: format!("{server_name} / {tool_name}"),
        content,
        detail: vec![
            format!("server: {server_name} ({server_id})"),
            format!("tool: {tool_name}"),
            format!("risk: {risk}"),
            format!("arguments: {payload_bytes} bytes"),
        ],
        args: args.clone(),
        risk,
    }
}

/// Render one argument value for the preview, truncating long strings.
fn preview_value(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() > PREVIEW_VALUE_MAX {
        let truncated: String = rendered.chars().take(PREVIEW_VALUE_MAX).collect();
        format!("{truncated}…")
    } else {
        rendered
    }
}

/// Deterministic hash of the arguments with object keys sorted at every
/// level, so argument order never affects cache identity.
fn hash_args(args: &Value) -> String {
    let mut hasher = Sha256::new();
    hash_value(args, &mut hasher);
    format!("{:x}", hasher.finalize())
}

fn hash_value(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Object(fields) => {
            hasher.update(b"{");
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            for key in keys {
                hasher.update(key.as_bytes());
                hasher.update(b":");
                hash_value(&fields[key], hasher);
                hasher.update(b",");
            }
            hasher.update(b"}");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_value(item, hasher);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        other => hasher.update(other.to_string().as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ApprovalDecision;
    use serde_json::json;
    use toolgate_core::RiskHint;

    /// Spawn a UI stand-in that answers the next `count` requests.
    fn auto_respond(broker: Arc<ApprovalBroker>, approved: bool, count: usize) {
        tokio::spawn(async move {
            let mut answered = 0;
            while answered < count {
                if broker.current().await.is_some() {
                    broker
                        .resolve_current(ApprovalDecision {
                            approved,
                            custom_response: None,
                        })
                        .await;
                    answered += 1;
                } else {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        });
    }

    #[tokio::test]
    async fn test_never_mode_skips_ui_entirely() {
        // No responder task: if the policy consulted the broker, this
        // would hang rather than return.
        let policy = ApprovalPolicy::new(Arc::new(ApprovalBroker::new()));
        let outcome = policy
            .request_approval(
                "files",
                "Filesystem",
                "read_file",
                "files::read_file",
                &json!({"path": "/tmp"}),
                ApprovalMode::Never,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Approved { .. }));
    }

    #[tokio::test]
    async fn test_once_per_server_caches_for_whole_server() {
        let broker = Arc::new(ApprovalBroker::new());
        let policy = ApprovalPolicy::new(Arc::clone(&broker));

        // Only ONE prompt is answered; the rest must come from cache
        auto_respond(Arc::clone(&broker), true, 1);
        let outcome = policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({}),
                ApprovalMode::OncePerServer,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Approved { .. }));

        // A different tool on the same server skips the UI
        let outcome = policy
            .request_approval(
                "x",
                "Server X",
                "write_file",
                "x::write_file",
                &json!({"data": 1}),
                ApprovalMode::OncePerServer,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Approved { .. }));

        // A different server still prompts (denied this time)
        auto_respond(Arc::clone(&broker), false, 1);
        let outcome = policy
            .request_approval(
                "y",
                "Server Y",
                "read_file",
                "y::read_file",
                &json!({}),
                ApprovalMode::OncePerServer,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Denied { .. }));
    }

    #[tokio::test]
    async fn test_once_per_tool_does_not_cover_sibling_tool() {
        let broker = Arc::new(ApprovalBroker::new());
        let policy = ApprovalPolicy::new(Arc::clone(&broker));

        auto_respond(Arc::clone(&broker), true, 1);
        policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({}),
                ApprovalMode::OncePerTool,
            )
            .await;

        // Same tool: cached
        let outcome = policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({"other": "args"}),
                ApprovalMode::OncePerTool,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Approved { .. }));

        // Sibling tool: prompts again
        auto_respond(Arc::clone(&broker), false, 1);
        let outcome = policy
            .request_approval(
                "x",
                "Server X",
                "write_file",
                "x::write_file",
                &json!({}),
                ApprovalMode::OncePerTool,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Denied { .. }));
    }

    #[tokio::test]
    async fn test_always_mode_never_caches() {
        let broker = Arc::new(ApprovalBroker::new());
        let policy = ApprovalPolicy::new(Arc::clone(&broker));

        auto_respond(Arc::clone(&broker), true, 1);
        policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({}),
                ApprovalMode::Always,
            )
            .await;

        // Second identical call prompts again; deny it to prove the UI
        // was consulted
        auto_respond(Arc::clone(&broker), false, 1);
        let outcome = policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({}),
                ApprovalMode::Always,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Denied { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entry_expires_after_ttl() {
        let broker = Arc::new(ApprovalBroker::new());
        let policy = ApprovalPolicy::new(Arc::clone(&broker));

        auto_respond(Arc::clone(&broker), true, 1);
        policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({}),
                ApprovalMode::OncePerServer,
            )
            .await;

        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;

        // Grant expired: the next request must prompt again
        auto_respond(Arc::clone(&broker), false, 1);
        let outcome = policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({}),
                ApprovalMode::OncePerServer,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Denied { .. }));
    }

    #[tokio::test]
    async fn test_clear_cache_forces_reprompt() {
        let broker = Arc::new(ApprovalBroker::new());
        let policy = ApprovalPolicy::new(Arc::clone(&broker));

        auto_respond(Arc::clone(&broker), true, 1);
        policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({}),
                ApprovalMode::OncePerServer,
            )
            .await;

        policy.clear_cache().await;

        auto_respond(Arc::clone(&broker), false, 1);
        let outcome = policy
            .request_approval(
                "x",
                "Server X",
                "read_file",
                "x::read_file",
                &json!({}),
                ApprovalMode::OncePerServer,
            )
            .await;
        assert!(matches!(outcome, ApprovalOutcome::Denied { .. }));
    }

    #[test]
    fn test_args_hash_ignores_key_order() {
        let a = json!({"b": 2, "a": 1, "nested": {"y": [1, 2], "x": null}});
        let b = json!({"nested": {"x": null, "y": [1, 2]}, "a": 1, "b": 2});
        assert_eq!(hash_args(&a), hash_args(&b));

        let c = json!({"a": 1, "b": 3});
        assert_ne!(hash_args(&a), hash_args(&c));
    }

    #[test]
    fn test_preview_truncates_long_values() {
        let long = "x".repeat(500);
        let rendered = preview_value(&json!(long));
        assert!(rendered.chars().count() <= PREVIEW_VALUE_MAX + 1);
        assert!(rendered.ends_with('…'));
    }

    #[test]
    fn test_request_preview_shape() {
        let request = build_request(
            "files",
            "Filesystem",
            "delete_file",
            "files::delete_file",
            &json!({"path": "/tmp/x", "recursive": true}),
        );
        assert_eq!(request.title, "Filesystem / delete_file");
        assert_eq!(request.content.len(), 2);
        assert_eq!(request.risk, RiskHint::Execute);
        assert!(request.detail.iter().any(|l| l.contains("risk: execute")));
        assert!(request.detail.iter().any(|l| l.contains("bytes")));
    }
}
