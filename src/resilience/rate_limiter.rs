//! Sliding-window, fixed-window, and token-bucket rate limiting, keyed by an
//! arbitrary string (tenant id, external-service name, ...). Each variant
//! keeps its per-key state behind a `parking_lot::Mutex<HashMap<_, _>>` with
//! a periodic `cleanup()` to drop stale keys.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    BurstUsed { remaining: u32 },
    Exceeded { retry_after_ms: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, RateLimitDecision::Exceeded { .. })
    }
}

struct SlidingEntry {
    count: u32,
    window_start: Instant,
}

/// Limits requests per key to `max_requests` per `window`, plus a one-time
/// `burst` allowance once the window is exhausted.
pub struct SlidingWindowLimiter {
    max_requests: u32,
    window: Duration,
    burst: u32,
    state: Mutex<HashMap<String, SlidingEntry>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration, burst: u32) -> Self {
        Self { max_requests, window, burst, state: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        let mut state = self.state.lock();
        let now = Instant::now();
        let entry = state.entry(key.to_string()).or_insert(SlidingEntry { count: 0, window_start: now });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        let limit = self.max_requests + self.burst;
        let remaining = limit.saturating_sub(entry.count);
        let reset_at = entry.window_start + self.window;

        if entry.count > limit {
            RateLimitDecision::Exceeded { retry_after_ms: reset_at.saturating_duration_since(now).as_millis() as u64 }
        } else if entry.count > self.max_requests {
            RateLimitDecision::BurstUsed { remaining }
        } else {
            RateLimitDecision::Allowed { remaining }
        }
    }

    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.window;
        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }
}

struct FixedEntry {
    count: u32,
    bucket_start: Instant,
}

/// Resets to zero at fixed boundaries rather than rolling; simpler and
/// cheaper than sliding-window, at the cost of edge bursts across a
/// boundary — acceptable for coarse-grained limits (e.g. scenario submits
/// per tenant per minute).
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<HashMap<String, FixedEntry>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window, state: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        let mut state = self.state.lock();
        let now = Instant::now();
        let entry = state.entry(key.to_string()).or_insert(FixedEntry { count: 0, bucket_start: now });

        if now.duration_since(entry.bucket_start) >= self.window {
            entry.count = 0;
            entry.bucket_start = now;
        }

        entry.count += 1;
        if entry.count > self.max_requests {
            let reset_at = entry.bucket_start + self.window;
            RateLimitDecision::Exceeded { retry_after_ms: reset_at.saturating_duration_since(now).as_millis() as u64 }
        } else {
            RateLimitDecision::Allowed { remaining: self.max_requests - entry.count }
        }
    }
}

struct BucketEntry {
    tokens: f64,
    last_refill: Instant,
}

/// Continuous refill at `refill_per_second`, capacity `burst_capacity`.
/// Smooths traffic better than either window variant at the cost of a
/// float comparison per check.
pub struct TokenBucketLimiter {
    refill_per_second: f64,
    burst_capacity: f64,
    state: Mutex<HashMap<String, BucketEntry>>,
}

impl TokenBucketLimiter {
    pub fn new(refill_per_second: f64, burst_capacity: f64) -> Self {
        Self { refill_per_second, burst_capacity, state: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        let mut state = self.state.lock();
        let now = Instant::now();
        let entry = state.entry(key.to_string()).or_insert(BucketEntry { tokens: self.burst_capacity, last_refill: now });

        let elapsed = now.duration_since(entry.last_refill).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.refill_per_second).min(self.burst_capacity);
        entry.last_refill = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            RateLimitDecision::Allowed { remaining: entry.tokens as u32 }
        } else {
            let deficit = 1.0 - entry.tokens;
            let wait_secs = deficit / self.refill_per_second.max(1e-9);
            RateLimitDecision::Exceeded { retry_after_ms: (wait_secs * 1000.0) as u64 }
        }
    }
}
