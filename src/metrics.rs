//! Metrics surface. The engine never opens a scraping endpoint —
//! that belongs to the out-of-scope HTTP layer — but it still emits the
//! canonical counters/gauges/histograms named here through the
//! `metrics` crate's recorder facade. Whatever recorder the embedding
//! binary installs (Prometheus, StatsD, a test recorder) receives these.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

pub fn task_submitted(task_type: &'static str) {
    counter!("optimization_tasks_total", "type" => task_type, "status" => "queued").increment(1);
}

pub fn task_finished(task_type: &'static str, status: &'static str) {
    counter!("optimization_tasks_total", "type" => task_type, "status" => status).increment(1);
}

pub fn optimization_duration(task_type: &'static str, algorithm: String, elapsed: Duration) {
    histogram!("optimization_duration_seconds", "type" => task_type, "algorithm" => algorithm)
        .record(elapsed.as_secs_f64());
}

pub fn pool_utilization(value: f64) {
    gauge!("pool_utilization").set(value);
}

pub fn pool_queue_size(size: usize) {
    gauge!("pool_queue_size").set(size as f64);
}

pub fn pool_completed_total_increment() {
    counter!("pool_completed_total").increment(1);
}

pub fn circuit_breaker_state(name: String, state: f64) {
    gauge!("circuit_breaker_state", "name" => name).set(state);
}

pub fn ml_prediction(model_type: String, variant: &'static str, status: &'static str) {
    counter!("ml_predictions_total", "model_type" => model_type, "variant" => variant, "status" => status)
        .increment(1);
}

pub fn ml_prediction_latency(model_type: String, elapsed: Duration) {
    histogram!("ml_prediction_latency_seconds", "model_type" => model_type).record(elapsed.as_secs_f64());
}

pub fn ml_model_health(model_type: String, version: String, healthy: bool) {
    gauge!("ml_model_health", "model_type" => model_type, "version" => version)
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn ml_experiment_assignment(experiment_id: String, variant: &'static str) {
    counter!("ml_experiment_assignments_total", "experiment_id" => experiment_id, "variant" => variant)
        .increment(1);
}
