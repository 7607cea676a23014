//! Approval request broker: one current request, the rest queued FIFO.
//!
//! The broker is the contract between the core and whatever UI renders
//! approval prompts. At most one request is *current* (visible) at a
//! time; concurrent submitters queue in FIFO order and are promoted as
//! decisions arrive. Each submission is completed through its own
//! oneshot channel, so there is no shared callback state: cancelling
//! the current request completes that one future with a distinct
//! signal and immediately promotes the next.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use uuid::Uuid;

use toolgate_core::RiskHint;

/// Capacity of the accepted-call audit channel.
const ACCEPTED_CHANNEL_CAPACITY: usize = 64;

/// A request for human approval of one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique id for this request.
    pub id: Uuid,
    /// Id of the server the tool belongs to.
    pub server_id: String,
    /// Display name of the server.
    pub server_name: String,
    /// Raw tool name.
    pub tool_name: String,
    /// Canonical `server::tool` id.
    pub canonical_id: String,
    /// Preview title, e.g. `Filesystem / delete_file`.
    pub title: String,
    /// One preview line per argument, long values truncated.
    pub content: Vec<String>,
    /// Secondary metadata lines (server, tool, risk, payload size).
    pub detail: Vec<String>,
    /// The call arguments themselves (exactly what the tool would get).
    pub args: Value,
    /// Inferred risk hint for prioritizing scrutiny.
    pub risk: RiskHint,
}

/// The human's decision on a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Whether the call may proceed.
    pub approved: bool,
    /// Optional free-text response from the user (e.g. a denial reason
    /// or an instruction to the agent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_response: Option<String>,
}

/// What a submitter gets back.
#[derive(Debug, Clone)]
pub enum ApprovalReply {
    /// The user decided.
    Decision(ApprovalDecision),
    /// The request was cancelled before a decision arrived.
    Cancelled,
}

/// Audit record pushed for approved calls only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedCall {
    pub request_id: Uuid,
    pub canonical_id: String,
    pub server_id: String,
    pub tool_name: String,
    /// When the approval was granted.
    pub approved_at: chrono::DateTime<chrono::Utc>,
}

struct Pending {
    request: ApprovalRequest,
    responder: oneshot::Sender<ApprovalReply>,
}

#[derive(Default)]
struct BrokerInner {
    current: Option<Pending>,
    queue: VecDeque<Pending>,
}

/// The approval broker shared by the policy (submitting side) and the
/// UI (deciding side).
pub struct ApprovalBroker {
    inner: Mutex<BrokerInner>,
    current_tx: watch::Sender<Option<ApprovalRequest>>,
    accepted_tx: broadcast::Sender<AcceptedCall>,
}

impl ApprovalBroker {
    /// Create a broker with no pending requests.
    pub fn new() -> Self {
        let (current_tx, _) = watch::channel(None);
        let (accepted_tx, _) = broadcast::channel(ACCEPTED_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(BrokerInner::default()),
            current_tx,
            accepted_tx,
        }
    }

    /// Submit a request and suspend until it is decided or cancelled.
    ///
    /// If another request is already current, this one waits its turn
    /// in FIFO order.
    pub async fn submit(&self, request: ApprovalRequest) -> ApprovalReply {
        let (responder, reply) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            let pending = Pending {
                request: request.clone(),
                responder,
            };
            if inner.current.is_none() {
                tracing::debug!(request_id = %request.id, tool = %request.tool_name, "Approval request is current");
                let _ = self.current_tx.send(Some(request));
                inner.current = Some(pending);
            } else {
                tracing::debug!(
                    request_id = %request.id,
                    tool = %request.tool_name,
                    queue_depth = inner.queue.len() + 1,
                    "Approval request queued"
                );
                inner.queue.push_back(pending);
            }
        }

        // If the broker is dropped with requests outstanding, treat the
        // lost reply as a cancellation.
        reply.await.unwrap_or(ApprovalReply::Cancelled)
    }

    /// Resolve the current request with the user's decision and promote
    /// the next queued request, if any. Returns false if nothing was
    /// current.
    pub async fn resolve_current(&self, decision: ApprovalDecision) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(pending) = inner.current.take() else {
            return false;
        };

        if decision.approved {
            let _ = self.accepted_tx.send(AcceptedCall {
                request_id: pending.request.id,
                canonical_id: pending.request.canonical_id.clone(),
                server_id: pending.request.server_id.clone(),
                tool_name: pending.request.tool_name.clone(),
                approved_at: chrono::Utc::now(),
            });
        }
        let _ = pending.responder.send(ApprovalReply::Decision(decision));

        Self::promote_next(&mut inner, &self.current_tx);
        true
    }

    /// Cancel the current request (distinct from a denial) and promote
    /// the next queued request, if any. Queued requests cannot be
    /// cancelled individually; only the visible one.
    pub async fn cancel_current(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(pending) = inner.current.take() else {
            return false;
        };
        tracing::debug!(request_id = %pending.request.id, "Approval request cancelled");
        let _ = pending.responder.send(ApprovalReply::Cancelled);

        Self::promote_next(&mut inner, &self.current_tx);
        true
    }

    fn promote_next(inner: &mut BrokerInner, current_tx: &watch::Sender<Option<ApprovalRequest>>) {
        if let Some(next) = inner.queue.pop_front() {
            let _ = current_tx.send(Some(next.request.clone()));
            inner.current = Some(next);
        } else {
            let _ = current_tx.send(None);
        }
    }

    /// Watch whichever request is currently awaiting a decision.
    pub fn subscribe(&self) -> watch::Receiver<Option<ApprovalRequest>> {
        self.current_tx.subscribe()
    }

    /// Listen for approved calls only (UI-side audit trails).
    pub fn subscribe_accepted(&self) -> broadcast::Receiver<AcceptedCall> {
        self.accepted_tx.subscribe()
    }

    /// The request currently awaiting a decision, if any.
    pub async fn current(&self) -> Option<ApprovalRequest> {
        let inner = self.inner.lock().await;
        inner.current.as_ref().map(|p| p.request.clone())
    }

    /// Number of requests waiting (current plus queued). Used by UIs to
    /// show queue position.
    pub async fn pending_count(&self) -> usize {
        let inner = self.inner.lock().await;
        usize::from(inner.current.is_some()) + inner.queue.len()
    }
}

impl Default for ApprovalBroker {
    fn default() -> Self {
        Self::new()
    }
}
