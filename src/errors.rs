//! Error taxonomy. One variant family per error kind; hand-rolled
//! `Display`/`Error` impls rather than a derive macro, to keep the
//! dependency list lean.

use std::fmt;

/// A stable machine-readable error code, carried alongside the variant so
/// callers across a process boundary can match on `code()` without caring
/// about Rust's enum shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    UnknownAlgorithm,
    QueueFull,
    PoolNotReady,
    StrategyFailed,
    Cancelled,
    Timeout,
    CacheUnavailable,
    PredictorUnavailable,
    BreakerOpen,
    ScenarioNotFound,
    ModelNotFound,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Validation => "ERR_VALIDATION",
            ErrorCode::UnknownAlgorithm => "ERR_UNKNOWN_ALGORITHM",
            ErrorCode::QueueFull => "ERR_QUEUE_FULL",
            ErrorCode::PoolNotReady => "ERR_POOL_NOT_READY",
            ErrorCode::StrategyFailed => "ERR_STRATEGY_FAILED",
            ErrorCode::Cancelled => "ERR_CANCELLED",
            ErrorCode::Timeout => "ERR_TIMEOUT",
            ErrorCode::CacheUnavailable => "ERR_CACHE_UNAVAILABLE",
            ErrorCode::PredictorUnavailable => "ERR_PREDICTOR_UNAVAILABLE",
            ErrorCode::BreakerOpen => "ERR_BREAKER_OPEN",
            ErrorCode::ScenarioNotFound => "ERR_SCENARIO_NOT_FOUND",
            ErrorCode::ModelNotFound => "ERR_MODEL_NOT_FOUND",
        }
    }

    /// Maps to the CLI-runner exit codes here.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCode::Validation | ErrorCode::UnknownAlgorithm | ErrorCode::ScenarioNotFound
            | ErrorCode::ModelNotFound => 2,
            ErrorCode::Timeout => 3,
            ErrorCode::Cancelled => 4,
            _ => 1,
        }
    }
}

/// The engine's error type. `details` carries free-form context; no stack
/// traces cross the boundary.
#[derive(Debug, Clone)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn unknown_algorithm(name: &str) -> Self {
        Self::new(ErrorCode::UnknownAlgorithm, format!("unknown algorithm '{name}'"))
    }

    pub fn queue_full() -> Self {
        Self::new(ErrorCode::QueueFull, "worker pool queue is full")
    }

    pub fn pool_not_ready() -> Self {
        Self::new(ErrorCode::PoolNotReady, "worker pool is not accepting submissions")
    }

    pub fn strategy_failed(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::StrategyFailed, "strategy invariant violation").with_details(detail)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "task was cancelled")
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "task exceeded its deadline")
    }

    pub fn cache_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::CacheUnavailable, "cache backend unavailable").with_details(detail)
    }

    pub fn predictor_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::PredictorUnavailable, "predictor unavailable").with_details(detail)
    }

    pub fn breaker_open(retry_hint: std::time::Duration) -> Self {
        Self::new(ErrorCode::BreakerOpen, "circuit breaker is open")
            .with_details(format!("retry after {:.1}s", retry_hint.as_secs_f64()))
    }

    pub fn scenario_not_found(id: &str) -> Self {
        Self::new(ErrorCode::ScenarioNotFound, format!("scenario '{id}' not found"))
    }

    pub fn model_not_found(id: &str) -> Self {
        Self::new(ErrorCode::ModelNotFound, format!("model '{id}' not found"))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {} ({})", self.code.as_str(), self.message, details),
            None => write!(f, "{}: {}", self.code.as_str(), self.message),
        }
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_error_code_table() {
        assert_eq!(ErrorCode::Validation.exit_code(), 2);
        assert_eq!(ErrorCode::Timeout.exit_code(), 3);
        assert_eq!(ErrorCode::Cancelled.exit_code(), 4);
        assert_eq!(ErrorCode::StrategyFailed.exit_code(), 1);
    }

    #[test]
    fn display_includes_code_and_details() {
        let err = EngineError::strategy_failed("free-rect list empty mid-placement");
        let rendered = err.to_string();
        assert!(rendered.contains("ERR_STRATEGY_FAILED"));
        assert!(rendered.contains("free-rect list empty"));
    }
}
