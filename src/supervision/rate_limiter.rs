//! Per-endpoint token-bucket rate limiter, generalised from the teacher's
//! per-IP sliding-window `middleware::rate_limit::RateLimitLayer`: same
//! `parking_lot::Mutex<HashMap<_, _>>` state shape and periodic `cleanup()`,
//! but keyed by endpoint name and refilling continuously rather than
//! resetting in discrete windows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_s: f64,
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
}

impl RateLimiter {
    pub fn new(capacity: f64, refill_per_s: f64) -> Self {
        Self { capacity, refill_per_s, buckets: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Attempts to take one token for `endpoint`; true if allowed.
    pub fn try_acquire(&self, endpoint: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let bucket = buckets.entry(endpoint.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_s).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Periodic cleanup of endpoints idle long enough that their bucket is
    /// back at full capacity and not worth retaining.
    pub fn cleanup(&self, idle_threshold: Duration) {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < idle_threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refills() {
        let limiter = RateLimiter::new(2.0, 1000.0);
        assert!(limiter.try_acquire("broker.send_order"));
        assert!(limiter.try_acquire("broker.send_order"));
        assert!(!limiter.try_acquire("broker.send_order"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.try_acquire("broker.send_order"));
    }

    #[test]
    fn endpoints_are_independent() {
        let limiter = RateLimiter::new(1.0, 0.001);
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("b"));
        assert!(!limiter.try_acquire("a"));
    }
}
