//! Job Coordinator: owns a scenario's end-to-end lifecycle — submit to the
//! Worker Pool, optionally shadow a second algorithm alongside the primary,
//! record ML predictions, and publish lifecycle events.
//!
//! Persistence is an injected capability: a real `ScenarioRepository` backed
//! by a database is an external collaborator outside this crate's scope, so
//! an in-memory reference implementation ships for tests and the CLI
//! runner.

use crate::errors::EngineError;
use crate::events::{EventBus, EVT_OPTIMIZATION_COMPLETED, EVT_OPTIMIZATION_FAILED, EVT_OPTIMIZATION_PROGRESS, EVT_OPTIMIZATION_STARTED};
use crate::metrics;
use crate::ml::predictor::{Predictor, WastePrediction};
use crate::model::{
    ExecutionType, OptimizationResult, PlanSummary, Scenario, ScenarioStatus, TaskPayload, TaskPhase, TaskProgress, TaskType,
};
use crate::pool::WorkerPool;
use crate::prediction_log::PredictionLog;
use crate::registry::AlgorithmRegistry;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Injected persistence capability for `Scenario` records. The engine
/// depends on this trait only — never on a concrete store.
pub trait ScenarioRepository: Send + Sync {
    fn save(&self, scenario: Scenario);
    fn get(&self, id: &str) -> Option<Scenario>;
    fn update_status(&self, id: &str, status: ScenarioStatus);
}

/// In-memory reference implementation, sufficient to exercise
/// `runScenario` without a real database.
#[derive(Default)]
pub struct InMemoryScenarioRepository {
    scenarios: Mutex<HashMap<String, Scenario>>,
}

impl InMemoryScenarioRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScenarioRepository for InMemoryScenarioRepository {
    fn save(&self, scenario: Scenario) {
        self.scenarios.lock().insert(scenario.id.clone(), scenario);
    }

    fn get(&self, id: &str) -> Option<Scenario> {
        self.scenarios.lock().get(id).cloned()
    }

    fn update_status(&self, id: &str, status: ScenarioStatus) {
        if let Some(scenario) = self.scenarios.lock().get_mut(id) {
            scenario.status = status;
        }
    }
}

pub struct Coordinator {
    pool: Arc<WorkerPool>,
    registry: Arc<AlgorithmRegistry>,
    events: EventBus,
    repository: Arc<dyn ScenarioRepository>,
    prediction_log: PredictionLog,
    predictor: Arc<dyn Predictor>,
    /// Guards predictor calls; trips fall back to a
    /// zero-confidence prediction rather than failing the scenario.
    predictor_breaker: Arc<CircuitBreaker>,
    /// Whether the ML Selector is consulted to override the caller's
    /// algorithm choice. Defaults to `true`; the CLI runner and embedders
    /// wire this from `ml.enabled`.
    ml_enabled: bool,
}

impl Coordinator {
    pub fn new(
        pool: Arc<WorkerPool>,
        registry: Arc<AlgorithmRegistry>,
        events: EventBus,
        repository: Arc<dyn ScenarioRepository>,
        prediction_log: PredictionLog,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        let predictor_breaker = CircuitBreaker::new("predictor", CircuitBreakerConfig::default());
        Self { pool, registry, events, repository, prediction_log, predictor, predictor_breaker, ml_enabled: true }
    }

    /// Toggle ML-assisted algorithm selection. When disabled, `run_scenario`
    /// always uses the caller-supplied algorithm.
    pub fn with_ml_enabled(mut self, enabled: bool) -> Self {
        self.ml_enabled = enabled;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run one scenario to completion. If `shadow_algorithm` is
    /// set, a second task runs the same pieces/stocks through it purely for
    /// comparison — its outcome never affects
    /// the returned `PlanSummary.result`, only `shadow_algorithm`'s
    /// presence on it and a recorded shadow prediction.
    pub async fn run_scenario(
        &self,
        mut scenario: Scenario,
        shadow_algorithm: Option<String>,
        timeout: Duration,
    ) -> Result<PlanSummary, EngineError> {
        let task_type = infer_task_type(&scenario);
        if !self.registry.has(task_type, &scenario.algorithm) {
            self.repository.save(scenario.clone());
            self.repository.update_status(&scenario.id, ScenarioStatus::Failed);
            return Err(EngineError::unknown_algorithm(&scenario.algorithm));
        }
        let shadow_algorithm = shadow_algorithm.filter(|algo| {
            let valid = self.registry.has(task_type, algo);
            if !valid {
                warn!(scenario_id = %scenario.id, algorithm = %algo, "shadow algorithm unknown; skipping shadow");
            }
            valid
        });
        scenario.status = ScenarioStatus::Running;
        self.repository.save(scenario.clone());
        info!(scenario_id = %scenario.id, algorithm = %scenario.algorithm, "scenario started");
        self.events.publish(
            EVT_OPTIMIZATION_STARTED,
            "scenario",
            scenario.id.clone(),
            json!({"scenarioId": scenario.id, "algorithm": scenario.algorithm}),
        );

        let predict_started_at = std::time::Instant::now();
        let predictor = self.predictor.clone();
        let pieces = scenario.pieces.clone();
        let stocks = scenario.stocks.clone();
        let breaker_call = self
            .predictor_breaker
            .call(move || async move { Ok::<_, ()>(predictor.predict_waste(task_type, &pieces, &stocks)) })
            .await;
        let is_fallback = self.predictor.model_type() == "null" || breaker_call.is_err();
        let predicted = breaker_call.unwrap_or(WastePrediction { waste_percentage: 0.0, confidence: 0.0 });
        metrics::ml_prediction(self.predictor.model_type().to_string(), "primary", if is_fallback { "fallback" } else { "ok" });
        metrics::ml_prediction_latency(self.predictor.model_type().to_string(), predict_started_at.elapsed());
        metrics::ml_model_health(self.predictor.model_type().to_string(), self.predictor.model_version().to_string(), !is_fallback);
        self.prediction_log.append(
            self.predictor.model_type(),
            self.predictor.model_version(),
            HashMap::new(),
            predicted.waste_percentage,
            predicted.confidence,
            ExecutionType::Primary,
            Some(predict_started_at.elapsed().as_secs_f64() * 1000.0),
            is_fallback,
        );

        // Optionally let the ML Selector override the caller-supplied
        // algorithm. A non-null predictor is consulted only when ML is
        // enabled; an unknown/failed selection falls back to the caller's
        // original choice rather than failing the scenario.
        if self.ml_enabled && self.predictor.model_type() != "null" {
            let predictor = self.predictor.clone();
            let pieces = scenario.pieces.clone();
            let stocks = scenario.stocks.clone();
            let selection = self
                .predictor_breaker
                .call(move || async move { Ok::<_, ()>(predictor.pick_algorithm(task_type, &pieces, &stocks)) })
                .await;
            match selection {
                Ok(candidate) if self.registry.has(task_type, &candidate) => {
                    if candidate != scenario.algorithm {
                        info!(scenario_id = %scenario.id, from = %scenario.algorithm, to = %candidate, "ML selector overrode algorithm");
                    }
                    scenario.algorithm = candidate;
                }
                Ok(candidate) => {
                    warn!(scenario_id = %scenario.id, algorithm = %candidate, "ML selector chose an unregistered algorithm; keeping caller's choice");
                }
                Err(_) => {
                    warn!(scenario_id = %scenario.id, "ML selector unavailable; keeping caller's choice");
                }
            }
        }

        let primary_payload = TaskPayload {
            algorithm: scenario.algorithm.clone(),
            pieces: scenario.pieces.clone(),
            stocks: scenario.stocks.clone(),
            options: scenario.options,
        };
        let primary_handle = self.submit_and_track(task_type, primary_payload, timeout, scenario.id.clone())?;

        let shadow_handle = match &shadow_algorithm {
            Some(algorithm) => {
                let shadow_payload = TaskPayload {
                    algorithm: algorithm.clone(),
                    pieces: scenario.pieces.clone(),
                    stocks: scenario.stocks.clone(),
                    options: scenario.options,
                };
                match self.pool.submit(task_type, shadow_payload, timeout, Arc::new(|_| {})) {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        warn!(scenario_id = %scenario.id, error = %err, "shadow submission failed; continuing primary-only");
                        None
                    }
                }
            }
            None => None,
        };

        let (primary_phase, primary_result) = self.await_terminal(&primary_handle.task_id).await;

        if let Some(handle) = &shadow_handle {
            let (shadow_phase, shadow_result) = self.await_terminal(&handle.task_id).await;
            if shadow_phase == TaskPhase::Completed {
                if let Some(result) = shadow_result {
                    self.prediction_log.append(
                        self.predictor.model_type(),
                        self.predictor.model_version(),
                        HashMap::new(),
                        result.total_waste_percentage,
                        predicted.confidence,
                        ExecutionType::Shadow,
                        None,
                        is_fallback,
                    );
                }
            }
        }

        match primary_phase {
            TaskPhase::Completed => {
                let result = primary_result.expect("completed tasks leave a result");
                scenario.status = ScenarioStatus::Completed;
                self.repository.update_status(&scenario.id, ScenarioStatus::Completed);
                self.events.publish(
                    EVT_OPTIMIZATION_COMPLETED,
                    "scenario",
                    scenario.id.clone(),
                    json!({"scenarioId": scenario.id, "algorithm": scenario.algorithm, "efficiency": result.statistics.efficiency}),
                );
                Ok(PlanSummary { scenario_id: scenario.id, result, algorithm_used: scenario.algorithm, shadow_algorithm })
            }
            TaskPhase::Cancelled => {
                self.repository.update_status(&scenario.id, ScenarioStatus::Cancelled);
                self.events.publish(EVT_OPTIMIZATION_FAILED, "scenario", scenario.id.clone(), json!({"scenarioId": scenario.id, "reason": "cancelled"}));
                Err(EngineError::cancelled())
            }
            TaskPhase::Timeout => {
                self.repository.update_status(&scenario.id, ScenarioStatus::Failed);
                self.events.publish(EVT_OPTIMIZATION_FAILED, "scenario", scenario.id.clone(), json!({"scenarioId": scenario.id, "reason": "timeout"}));
                Err(EngineError::timeout())
            }
            _ => {
                self.repository.update_status(&scenario.id, ScenarioStatus::Failed);
                self.events.publish(EVT_OPTIMIZATION_FAILED, "scenario", scenario.id.clone(), json!({"scenarioId": scenario.id, "reason": "strategy_failed"}));
                Err(EngineError::strategy_failed("primary task did not complete successfully"))
            }
        }
    }

    fn submit_and_track(
        &self,
        task_type: TaskType,
        payload: TaskPayload,
        timeout: Duration,
        scenario_id: String,
    ) -> Result<crate::pool::TaskHandle, EngineError> {
        let events = self.events.clone();
        self.pool.submit(
            task_type,
            payload,
            timeout,
            Arc::new(move |progress: TaskProgress| {
                events.publish(
                    EVT_OPTIMIZATION_PROGRESS,
                    "scenario",
                    scenario_id.clone(),
                    json!({"scenarioId": scenario_id, "taskId": progress.task_id, "phase": progress.phase, "progress": progress.progress}),
                );
            }),
        )
    }

    async fn await_terminal(&self, task_id: &str) -> (TaskPhase, Option<OptimizationResult>) {
        loop {
            match self.pool.progress(task_id) {
                Some(snapshot) if snapshot.phase.is_terminal() => {
                    return (snapshot.phase, self.pool.take_result(task_id));
                }
                Some(_) => tokio::time::sleep(Duration::from_millis(10)).await,
                None => return (TaskPhase::Failed, None),
            }
        }
    }
}

/// The algorithm name is itself the unambiguous source of truth for which
/// registry table (and hence which strategy family) a scenario resolves
/// against — piece/stock geometry is not a reliable signal, since 1D
/// callers commonly pass a positive placeholder `height` for the bar
/// cross-section rather than `0`.
fn infer_task_type(scenario: &Scenario) -> TaskType {
    if scenario.algorithm.starts_with("1D_") {
        TaskType::OneD
    } else {
        TaskType::TwoD
    }
}
