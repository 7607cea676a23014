//! Per-server token-bucket rate limiting.
//!
//! Each configured server gets a bucket sized to its
//! `max_calls_per_minute`; servers with no bucket are unlimited.
//! Refill is lazy: tokens accrue based on elapsed time at acquisition,
//! capped at capacity, so an idle server never banks more than one
//! minute of calls.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Poll interval for the blocking `acquire` path.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A single token bucket. `0 <= tokens <= capacity` always holds.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(max_calls_per_minute: u32, now: Instant) -> Self {
        let capacity = f64::from(max_calls_per_minute);
        Self {
            tokens: capacity, // start full
            capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: now,
        }
    }

    /// Refill for elapsed time, then consume one token if available.
    fn try_acquire_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec)
            .clamp(0.0, self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-server rate limiter.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Create a limiter with no buckets (everything unlimited).
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// (Re)initialize a server's bucket to full capacity.
    pub async fn configure(&self, server_id: &str, max_calls_per_minute: u32) {
        let mut buckets = self.buckets.lock().await;
        buckets.insert(
            server_id.to_string(),
            TokenBucket::new(max_calls_per_minute, Instant::now()),
        );
        tracing::debug!(
            server_id = %server_id,
            max_calls_per_minute,
            "Rate limit configured"
        );
    }

    /// Try to take one token without waiting. Servers with no bucket
    /// are unlimited.
    pub async fn try_acquire(&self, server_id: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(server_id) {
            Some(bucket) => bucket.try_acquire_at(Instant::now()),
            None => true,
        }
    }

    /// Suspend until a token is available. Polls cooperatively at a
    /// short fixed interval; unrelated work keeps running.
    pub async fn acquire(&self, server_id: &str) {
        loop {
            if self.try_acquire(server_id).await {
                return;
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    /// Drop a server's bucket (e.g. on server removal).
    pub async fn remove(&self, server_id: &str) {
        let mut buckets = self.buckets.lock().await;
        buckets.remove(server_id);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
