use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

/// Per-role allowance of failed logins.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Throttles password guessing against a role using a token bucket. Only
/// failed attempts spend tokens.
pub struct LoginThrottle {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl LoginThrottle {
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns `true` if an attempt against `role` may be checked now.
    pub async fn allows(&self, role: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(role) {
            Some(bucket) => {
                self.refill(bucket);
                bucket.tokens >= 1.0
            },
            None => true,
        }
    }

    /// Spend one token for a failed attempt against `role`.
    pub async fn record_failure(&self, role: &str) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        let bucket = buckets
            .entry(role.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.max_tokens,
                last_refill: now,
            });
        self.refill(bucket);
        bucket.tokens = (bucket.tokens - 1.0).max(0.0);
    }

    /// Forget the failures against `role`.
    pub async fn reset(&self, role: &str) {
        self.buckets.lock().await.remove(role);
    }

    /// Drop buckets that have refilled to full, which behave the same as no
    /// bucket. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            self.refill(bucket);
            bucket.tokens < self.max_tokens
        });
        before - buckets.len()
    }

    /// Number of roles currently carrying failures.
    pub async fn tracked_roles(&self) -> usize {
        self.buckets.lock().await.len()
    }

    fn refill(&self, bucket: &mut TokenBucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;
    }
}
