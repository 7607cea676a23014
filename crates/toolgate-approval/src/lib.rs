//! Human-in-the-loop gating for tool execution.
//!
//! Three pieces cooperate here:
//!
//! - [`ApprovalBroker`] carries approval requests between executors and
//!   whatever UI renders prompts, one visible request at a time with a
//!   FIFO queue behind it.
//! - [`ApprovalPolicy`] decides whether a call needs a prompt at all,
//!   caching grants at server, tool, or exact-arguments scope with a
//!   fixed TTL.
//! - [`RateLimiter`] enforces per-server call budgets with lazy-refill
//!   token buckets.

pub mod broker;
pub mod limiter;
pub mod policy;

pub use broker::{
    AcceptedCall, ApprovalBroker, ApprovalDecision, ApprovalReply, ApprovalRequest,
};
pub use limiter::RateLimiter;
pub use policy::{ApprovalOutcome, ApprovalPolicy};
