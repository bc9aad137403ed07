//! Circuit breaker state machine: CLOSED → OPEN → HALF_OPEN → CLOSED,
//! wrapping calls to external collaborators the engine treats as unreliable
//! (cache backend, predictor service, scenario repository).
//!
//! Trip decisions are volume-gated error-percentage over a rolling window
//! of recent outcomes, matching `errorThresholdPercentage` /
//! `volumeThreshold` rather than a bare consecutive-failure count.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_metric_value(self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 0.5,
        }
    }
}

/// Defaults mirroring the `breaker.*` config section: `timeout=30s`,
/// `errorThresholdPercentage=50`, `resetTimeout=10s`, `volumeThreshold=5`.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Per-call deadline enforced by [`CircuitBreaker::call`].
    pub timeout: Duration,
    /// Minimum calls in the rolling window before the error percentage is
    /// evaluated at all — avoids tripping on a cold start's first failure.
    pub volume_threshold: u32,
    /// Failure percentage (0-100) across the rolling window that trips
    /// CLOSED → OPEN, once `volume_threshold` is met.
    pub error_threshold_percentage: u8,
    /// How long OPEN holds before allowing one HALF_OPEN probe.
    pub reset_timeout: Duration,
    /// Size of the rolling outcome window used for the percentage.
    pub window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            volume_threshold: 5,
            error_threshold_percentage: 50,
            reset_timeout: Duration::from_secs(10),
            window_size: 20,
        }
    }
}

struct Inner {
    state: BreakerState,
    opened_at: Option<Instant>,
    half_open_successes: u32,
    /// Rolling outcomes, most recent at the back; `true` = failure.
    outcomes: VecDeque<bool>,
}

impl Inner {
    fn error_percentage(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|&&f| f).count();
        failures as f64 / self.outcomes.len() as f64 * 100.0
    }
}

/// A single named breaker.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                opened_at: None,
                half_open_successes: 0,
                outcomes: VecDeque::with_capacity(config.window_size),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current externally-visible state, first transitioning OPEN → HALF_OPEN
    /// if `reset_timeout` has elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    info!(breaker = %self.name, "circuit breaker transitioning OPEN -> HALF_OPEN");
                    crate::metrics::circuit_breaker_state(self.name.clone(), BreakerState::HalfOpen.as_metric_value());
                }
            }
        }
        inner.state
    }

    /// Whether a call should be allowed through right now.
    pub fn allow(&self) -> bool {
        self.state() != BreakerState::Open
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        push_outcome(&mut inner.outcomes, self.config.window_size, false);
        if inner.state == BreakerState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= 1 {
                inner.state = BreakerState::Closed;
                inner.opened_at = None;
                inner.outcomes.clear();
                info!(breaker = %self.name, "circuit breaker transitioning HALF_OPEN -> CLOSED");
                crate::metrics::circuit_breaker_state(self.name.clone(), BreakerState::Closed.as_metric_value());
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(breaker = %self.name, "circuit breaker probe failed, reopening");
            crate::metrics::circuit_breaker_state(self.name.clone(), BreakerState::Open.as_metric_value());
            return;
        }

        push_outcome(&mut inner.outcomes, self.config.window_size, true);
        let volume = inner.outcomes.len() as u32;
        let error_pct = inner.error_percentage();
        if inner.state == BreakerState::Closed && volume >= self.config.volume_threshold && error_pct >= self.config.error_threshold_percentage as f64 {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(breaker = %self.name, error_pct, volume, "circuit breaker tripped CLOSED -> OPEN");
            crate::metrics::circuit_breaker_state(self.name.clone(), BreakerState::Open.as_metric_value());
        }
    }

    /// Wrap a fallible async call with the breaker's allow-check, per-call
    /// timeout, and success/failure bookkeeping.
    /// Returns `ERR_BREAKER_OPEN` without invoking `f` when the breaker is
    /// tripped, and `ERR_TIMEOUT` if `f` doesn't resolve within `timeout`.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, crate::errors::EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.allow() {
            return Err(crate::errors::EngineError::breaker_open(self.config.reset_timeout));
        }

        match tokio::time::timeout(self.config.timeout, f()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(_)) => {
                self.record_failure();
                Err(crate::errors::EngineError::predictor_unavailable("call failed"))
            }
            Err(_elapsed) => {
                self.record_failure();
                Err(crate::errors::EngineError::timeout())
            }
        }
    }
}

fn push_outcome(outcomes: &mut VecDeque<bool>, window_size: usize, failure: bool) {
    if outcomes.len() == window_size {
        outcomes.pop_front();
    }
    outcomes.push_back(failure);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            timeout: Duration::from_secs(1),
            volume_threshold: 2,
            error_threshold_percentage: 50,
            reset_timeout: Duration::from_millis(20),
            window_size: 10,
        }
    }

    #[test]
    fn stays_closed_below_volume_threshold() {
        let breaker = CircuitBreaker::new("cache", config());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn trips_open_once_volume_and_error_percentage_are_met() {
        let breaker = CircuitBreaker::new("cache", config());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn success_lowers_the_rolling_error_percentage() {
        let breaker = CircuitBreaker::new("cache", config());
        breaker.record_failure();
        breaker.record_success();
        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn transitions_half_open_after_reset_timeout_then_closes_on_success() {
        let breaker = CircuitBreaker::new("predictor", config());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new("predictor", config());
        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn call_rejects_with_breaker_open_without_invoking_closure() {
        let breaker = CircuitBreaker::new("predictor", config());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        let invoked = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let invoked_clone = invoked.clone();
        let result = breaker
            .call(move || {
                invoked_clone.store(true, std::sync::atomic::Ordering::SeqCst);
                async { Ok::<_, ()>(()) }
            })
            .await;
        assert!(result.is_err());
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn call_times_out_and_records_a_failure() {
        let breaker = CircuitBreaker::new("predictor", CircuitBreakerConfig { timeout: Duration::from_millis(5), ..config() });
        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ()>(())
            })
            .await;
        assert_eq!(result.unwrap_err().code.as_str(), "ERR_TIMEOUT");
    }
}
