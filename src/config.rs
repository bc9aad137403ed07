//! Engine configuration, TOML-deserializable via the `toml` crate, loaded
//! once at startup by the CLI runner without depending on an external
//! config service.

use crate::pool::WorkerPoolConfig;
use crate::resilience::CircuitBreakerConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub min_threads: usize,
    pub max_threads: usize,
    pub max_queue: usize,
    pub idle_timeout_ms: u64,
    pub grace_period_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let defaults = WorkerPoolConfig::default();
        Self {
            min_threads: defaults.min_threads,
            max_threads: defaults.max_threads,
            max_queue: defaults.max_queue,
            idle_timeout_ms: defaults.idle_timeout_ms,
            grace_period_ms: defaults.grace_period_ms,
        }
    }
}

impl From<PoolSettings> for WorkerPoolConfig {
    fn from(settings: PoolSettings) -> Self {
        WorkerPoolConfig {
            min_threads: settings.min_threads,
            max_threads: settings.max_threads,
            max_queue: settings.max_queue,
            idle_timeout_ms: settings.idle_timeout_ms,
            grace_period_ms: settings.grace_period_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub timeout_ms: u64,
    pub volume_threshold: u32,
    pub error_threshold_percentage: u8,
    pub reset_timeout_ms: u64,
    pub window_size: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            timeout_ms: defaults.timeout.as_millis() as u64,
            volume_threshold: defaults.volume_threshold,
            error_threshold_percentage: defaults.error_threshold_percentage,
            reset_timeout_ms: defaults.reset_timeout.as_millis() as u64,
            window_size: defaults.window_size,
        }
    }
}

impl From<BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: BreakerSettings) -> Self {
        CircuitBreakerConfig {
            timeout: Duration::from_millis(settings.timeout_ms),
            volume_threshold: settings.volume_threshold,
            error_threshold_percentage: settings.error_threshold_percentage,
            reset_timeout: Duration::from_millis(settings.reset_timeout_ms),
            window_size: settings.window_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub default_ttl_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { default_ttl_ms: 300_000, cleanup_interval_ms: 60_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub channel_capacity: usize,
    pub log_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { channel_capacity: 1024, log_capacity: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub window_days: i64,
    pub min_improvement: f64,
    pub min_samples: usize,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        let defaults = crate::ml::shadow::PromotionCriteria::default();
        Self { window_days: defaults.min_days, min_improvement: defaults.min_improvement, min_samples: defaults.min_samples }
    }
}

impl From<ShadowSettings> for crate::ml::shadow::PromotionCriteria {
    fn from(settings: ShadowSettings) -> Self {
        crate::ml::shadow::PromotionCriteria {
            min_days: settings.window_days,
            min_improvement: settings.min_improvement,
            min_samples: settings.min_samples,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MlSettings {
    pub enabled: bool,
    pub shadow: ShadowSettings,
}

impl Default for MlSettings {
    fn default() -> Self {
        Self { enabled: true, shadow: ShadowSettings::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentSettings {
    pub ttl_ms: u64,
    pub jitter_ms: u64,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self { ttl_ms: 60_000, jitter_ms: 5_000 }
    }
}

/// Top-level engine configuration. Loadable from TOML for the CLI
/// runner; embedders that already own a config layer can construct this
/// directly instead.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub pool: PoolSettings,
    pub breaker: BreakerSettings,
    pub cache: CacheSettings,
    pub events: EventSettings,
    pub ml: MlSettings,
    pub experiment: ExperimentSettings,
    /// Default per-task timeout in milliseconds when a caller doesn't
    /// specify one.
    pub default_task_timeout_ms: u64,
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_toml_str(&contents)?)
    }

    pub fn default_task_timeout(&self) -> Duration {
        if self.default_task_timeout_ms == 0 {
            Duration::from_millis(default_task_timeout_ms())
        } else {
            Duration::from_millis(self.default_task_timeout_ms)
        }
    }
}
