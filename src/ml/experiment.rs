//! Deterministic experiment-variant assignment.
//! Uses SHA-256 bucketing because assignment here must be reproducible
//! *without* server-side assignment state — the same
//! `(experiment_id, subject_key)` pair always hashes to the same bucket, so
//! two processes agree without coordinating.

use crate::cache::Cache;
use crate::model::{Experiment, ExperimentScope, ExperimentStatus};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Which leg of an experiment a subject landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Control,
    Variant,
}

impl Assignment {
    fn as_metric_label(self) -> &'static str {
        match self {
            Assignment::Control => "control",
            Assignment::Variant => "variant",
        }
    }
}

/// Resolves which experiment (if any) applies to a `(tenant, model_type)`
/// pair and which leg a subject falls into, with tenant-scoped experiments
/// taking precedence over global ones.
pub struct ExperimentResolver;

impl ExperimentResolver {
    /// Picks the most specific active experiment for `model_type` and an
    /// optional `tenant_id`: a tenant-scoped experiment wins over a global
    /// one when both are active.
    pub fn resolve<'a>(experiments: &'a [Experiment], model_type: &str, tenant_id: Option<&str>) -> Option<&'a Experiment> {
        let candidates: Vec<&Experiment> = experiments
            .iter()
            .filter(|e| e.model_type == model_type && e.status == ExperimentStatus::Active)
            .collect();

        if let Some(tenant_id) = tenant_id {
            if let Some(tenant_scoped) = candidates.iter().find(|e| e.scope == ExperimentScope::Tenant(tenant_id.to_string())) {
                return Some(tenant_scoped);
            }
        }

        candidates.into_iter().find(|e| e.scope == ExperimentScope::Global)
    }

    /// Deterministically buckets `subject_key` into control or variant.
    /// `allocation_basis_points` out of 10000 land in the variant leg.
    /// Bucket input is `salt ":" experimentId ":" unitKey`.
    pub fn assign(experiment: &Experiment, subject_key: &str) -> Assignment {
        let mut hasher = Sha256::new();
        hasher.update(experiment.salt.as_bytes());
        hasher.update(b":");
        hasher.update(experiment.id.as_bytes());
        hasher.update(b":");
        hasher.update(subject_key.as_bytes());
        let digest = hasher.finalize();

        let mut bucket_source = [0u8; 8];
        bucket_source.copy_from_slice(&digest[0..8]);
        let bucket = u64::from_be_bytes(bucket_source) % 10_000;

        let assignment = if (bucket as u32) < experiment.allocation_basis_points { Assignment::Variant } else { Assignment::Control };
        crate::metrics::ml_experiment_assignment(experiment.id.clone(), assignment.as_metric_label());
        assignment
    }

    /// The model id to use for a given assignment.
    pub fn model_for(experiment: &Experiment, assignment: Assignment) -> &str {
        match assignment {
            Assignment::Control => &experiment.control_model_id,
            Assignment::Variant => &experiment.variant_model_id,
        }
    }
}

/// `ttl`/`jitter` defaults mirror the `experiment.ttlMs`/`experiment.jitterMs`
/// config keys: a 60s cache window, jittered ±5s so many cache keys don't
/// expire in the same instant.
#[derive(Debug, Clone, Copy)]
pub struct ExperimentCacheConfig {
    pub ttl: Duration,
    pub jitter: Duration,
}

impl Default for ExperimentCacheConfig {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(60), jitter: Duration::from_secs(5) }
    }
}

/// Memoizes "which experiments are active for this model type" behind the
/// engine's single-flight [`Cache`], so a burst of concurrent scenario
/// submissions triggers the (possibly remote) experiment source at most
/// once per jittered TTL window rather than once per request.
pub struct CachedExperimentLookup {
    cache: Cache,
    config: ExperimentCacheConfig,
}

impl CachedExperimentLookup {
    pub fn new(cache: Cache, config: ExperimentCacheConfig) -> Self {
        Self { cache, config }
    }

    /// Resolve the active experiments for `model_type`, invoking `source`
    /// at most once per cache window even under concurrent callers.
    pub async fn active_experiments<F, Fut>(&self, model_type: &str, source: F) -> Vec<Experiment>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Vec<Experiment>>,
    {
        let key = format!("experiments:active:{model_type}");
        let ttl = self.jittered_ttl(&key);
        let cached = self
            .cache
            .get_or_set(&key, Some(ttl), || async move {
                let experiments = source().await;
                serde_json::to_string(&experiments).unwrap_or_else(|_| "[]".to_string())
            })
            .await;
        serde_json::from_str(&cached).unwrap_or_default()
    }

    /// A per-key TTL within `[ttl-jitter, ttl+jitter]`: deterministic for a
    /// given key (so tests and repeated calls are reproducible) but spread
    /// across keys to avoid a thundering-herd re-fetch at one instant.
    fn jittered_ttl(&self, key: &str) -> Duration {
        if self.config.jitter.is_zero() {
            return self.config.ttl;
        }
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[0..8]);
        let sample = u64::from_be_bytes(bytes);

        let base_ms = self.config.ttl.as_millis() as u64;
        let jitter_ms = self.config.jitter.as_millis() as u64;
        let floor_ms = base_ms.saturating_sub(jitter_ms);
        let span_ms = jitter_ms * 2;
        let offset_ms = if span_ms == 0 { 0 } else { sample % span_ms };
        Duration::from_millis(floor_ms + offset_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn experiment(scope: ExperimentScope, basis_points: u32) -> Experiment {
        Experiment {
            id: "exp-1".into(),
            model_type: "waste_predictor".into(),
            scope,
            control_model_id: "control".into(),
            variant_model_id: "variant".into(),
            allocation_basis_points: basis_points,
            salt: "fixed-salt".into(),
            start_date: Utc::now(),
            end_date: None,
            status: ExperimentStatus::Active,
        }
    }

    #[test]
    fn same_subject_always_assigns_the_same_leg() {
        let experiment = experiment(ExperimentScope::Global, 5000);
        let first = ExperimentResolver::assign(&experiment, "tenant-a:waste_predictor");
        let second = ExperimentResolver::assign(&experiment, "tenant-a:waste_predictor");
        assert_eq!(first, second);
    }

    #[test]
    fn zero_allocation_never_assigns_variant() {
        let experiment = experiment(ExperimentScope::Global, 0);
        for i in 0..200 {
            assert_eq!(ExperimentResolver::assign(&experiment, &format!("subject-{i}")), Assignment::Control);
        }
    }

    #[test]
    fn full_allocation_always_assigns_variant() {
        let experiment = experiment(ExperimentScope::Global, 10_000);
        for i in 0..200 {
            assert_eq!(ExperimentResolver::assign(&experiment, &format!("subject-{i}")), Assignment::Variant);
        }
    }

    #[test]
    fn allocation_rate_over_10k_subjects_stays_within_tolerance() {
        let experiment = experiment(ExperimentScope::Global, 2000);
        let variants = (0..10_000)
            .filter(|i| ExperimentResolver::assign(&experiment, &format!("unit-{i}")) == Assignment::Variant)
            .count();
        assert!((1500..=2500).contains(&variants), "variant count {variants} outside [1500,2500]");
    }

    #[test]
    fn tenant_scoped_experiment_takes_precedence_over_global() {
        let global = experiment(ExperimentScope::Global, 5000);
        let mut tenant_scoped = experiment(ExperimentScope::Tenant("acme".into()), 5000);
        tenant_scoped.id = "exp-2".into();
        let experiments = vec![global, tenant_scoped.clone()];

        let resolved = ExperimentResolver::resolve(&experiments, "waste_predictor", Some("acme")).unwrap();
        assert_eq!(resolved.id, "exp-2");
    }

    #[test]
    fn falls_back_to_global_when_no_tenant_match() {
        let global = experiment(ExperimentScope::Global, 5000);
        let experiments = vec![global];
        let resolved = ExperimentResolver::resolve(&experiments, "waste_predictor", Some("other-tenant")).unwrap();
        assert_eq!(resolved.scope, ExperimentScope::Global);
    }

    #[test]
    fn paused_experiments_are_not_resolved() {
        let mut paused = experiment(ExperimentScope::Global, 5000);
        paused.status = ExperimentStatus::Paused;
        assert!(ExperimentResolver::resolve(&[paused], "waste_predictor", None).is_none());
    }

    #[test]
    fn default_cache_config_matches_60s_ttl_5s_jitter() {
        let config = ExperimentCacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.jitter, Duration::from_secs(5));
    }

    #[test]
    fn jittered_ttl_stays_within_the_configured_band() {
        let lookup = CachedExperimentLookup::new(Cache::new(), ExperimentCacheConfig::default());
        for key in ["waste_predictor", "time_predictor", "algorithm_selector"] {
            let ttl = lookup.jittered_ttl(key);
            assert!(ttl >= Duration::from_secs(55) && ttl <= Duration::from_secs(65), "ttl {ttl:?} outside [55s,65s] for {key}");
        }
    }

    #[tokio::test]
    async fn active_experiments_invokes_source_once_per_cache_window() {
        let lookup = CachedExperimentLookup::new(Cache::new(), ExperimentCacheConfig::default());
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));

        let make_call = |calls: std::sync::Arc<std::sync::atomic::AtomicU32>| {
            let experiment = experiment(ExperimentScope::Global, 5000);
            async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                vec![experiment]
            }
        };

        let first = lookup.active_experiments("waste_predictor", || make_call(calls.clone())).await;
        let second = lookup.active_experiments("waste_predictor", || make_call(calls.clone())).await;

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
