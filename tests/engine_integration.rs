//! End-to-end exercises of Coordinator -> Registry -> Pool -> Strategy,
//! covering the scenario shapes the engine is expected to handle: 1D and 2D
//! optimization, an unplaceable remainder, shadow evaluation, and a
//! cancelled/timed-out task.

use std::sync::Arc;
use std::time::Duration;

use cutting_engine::coordinator::{Coordinator, InMemoryScenarioRepository};
use cutting_engine::events::{EventBus, EVT_OPTIMIZATION_COMPLETED, EVT_OPTIMIZATION_STARTED};
use cutting_engine::ml::predictor::NullPredictor;
use cutting_engine::model::{Piece, Scenario, ScenarioStatus, Stock, StrategyOptions};
use cutting_engine::pool::{WorkerPool, WorkerPoolConfig};
use cutting_engine::prediction_log::PredictionLog;
use cutting_engine::registry::{AlgorithmRegistry, ALGO_1D_BFD, ALGO_1D_FFD, ALGO_2D_BOTTOM_LEFT, ALGO_2D_GUILLOTINE};

fn make_coordinator() -> Coordinator {
    let registry = Arc::new(AlgorithmRegistry::new());
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default(), registry.clone()));
    Coordinator::new(
        pool,
        registry,
        EventBus::new(),
        Arc::new(InMemoryScenarioRepository::new()),
        PredictionLog::new(),
        Arc::new(NullPredictor),
    )
}

fn oned_scenario(algorithm: &str) -> Scenario {
    Scenario {
        id: "scn-1d".into(),
        job_id: "job-1".into(),
        algorithm: algorithm.to_string(),
        options: StrategyOptions::default(),
        pieces: vec![
            Piece { id: "p1".into(), width: 300.0, height: 1.0, quantity: 4, order_item_id: "oi-1".into(), can_rotate: false },
            Piece { id: "p2".into(), width: 450.0, height: 1.0, quantity: 2, order_item_id: "oi-2".into(), can_rotate: false },
        ],
        stocks: vec![Stock { id: "bar-1".into(), width: 1000.0, height: 1.0, available: 5 }],
        status: ScenarioStatus::Pending,
    }
}

fn twod_scenario(algorithm: &str) -> Scenario {
    Scenario {
        id: "scn-2d".into(),
        job_id: "job-2".into(),
        algorithm: algorithm.to_string(),
        options: StrategyOptions { kerf: 0.0, allow_rotation: true },
        pieces: vec![
            Piece { id: "p1".into(), width: 400.0, height: 300.0, quantity: 3, order_item_id: "oi-1".into(), can_rotate: true },
            Piece { id: "p2".into(), width: 600.0, height: 200.0, quantity: 2, order_item_id: "oi-2".into(), can_rotate: true },
        ],
        stocks: vec![Stock { id: "sheet-1".into(), width: 1200.0, height: 800.0, available: 3 }],
        status: ScenarioStatus::Pending,
    }
}

#[tokio::test]
async fn runs_a_1d_scenario_to_completion_with_first_fit_decreasing() {
    let coordinator = make_coordinator();
    let summary = coordinator.run_scenario(oned_scenario(ALGO_1D_FFD), None, Duration::from_secs(5)).await.unwrap();
    assert!(summary.result.success);
    assert!(summary.result.stock_used_count >= 1);
    assert!(summary.result.unplaced_pieces.is_empty());
}

#[tokio::test]
async fn runs_a_1d_scenario_with_best_fit_decreasing() {
    let coordinator = make_coordinator();
    let summary = coordinator.run_scenario(oned_scenario(ALGO_1D_BFD), None, Duration::from_secs(5)).await.unwrap();
    assert!(summary.result.success);
}

#[tokio::test]
async fn runs_a_2d_bottom_left_scenario_to_completion() {
    let coordinator = make_coordinator();
    let summary = coordinator.run_scenario(twod_scenario(ALGO_2D_BOTTOM_LEFT), None, Duration::from_secs(5)).await.unwrap();
    assert!(summary.result.success);
    assert!(summary.result.statistics.efficiency > 0.0);
}

#[tokio::test]
async fn runs_a_2d_guillotine_scenario_to_completion() {
    let coordinator = make_coordinator();
    let summary = coordinator.run_scenario(twod_scenario(ALGO_2D_GUILLOTINE), None, Duration::from_secs(5)).await.unwrap();
    assert!(summary.result.success);
}

#[tokio::test]
async fn insufficient_stock_leaves_an_unplaced_remainder() {
    let coordinator = make_coordinator();
    let mut scenario = oned_scenario(ALGO_1D_FFD);
    scenario.stocks = vec![Stock { id: "bar-1".into(), width: 1000.0, height: 1.0, available: 1 }];
    let summary = coordinator.run_scenario(scenario, None, Duration::from_secs(5)).await.unwrap();
    assert!(!summary.result.unplaced_pieces.is_empty());
}

#[tokio::test]
async fn shadow_algorithm_runs_alongside_without_altering_the_primary_result() {
    let coordinator = make_coordinator();
    let summary = coordinator
        .run_scenario(oned_scenario(ALGO_1D_FFD), Some(ALGO_1D_BFD.to_string()), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(summary.algorithm_used, ALGO_1D_FFD);
    assert_eq!(summary.shadow_algorithm.as_deref(), Some(ALGO_1D_BFD));
}

#[tokio::test]
async fn unknown_algorithm_name_surfaces_as_unknown_algorithm() {
    let coordinator = make_coordinator();
    let err = coordinator.run_scenario(oned_scenario("NOT_A_REAL_ALGORITHM"), None, Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(err.code.as_str(), "ERR_UNKNOWN_ALGORITHM");
}

#[tokio::test]
async fn an_unreasonably_short_timeout_fails_the_scenario() {
    let coordinator = make_coordinator();
    let mut scenario = oned_scenario(ALGO_1D_FFD);
    scenario.pieces = (0..2000)
        .map(|i| Piece { id: format!("p{i}"), width: 7.0, height: 1.0, quantity: 1, order_item_id: format!("oi{i}"), can_rotate: false })
        .collect();
    scenario.stocks = vec![Stock { id: "bar-1".into(), width: 10.0, height: 1.0, available: 2000 }];
    let outcome = coordinator.run_scenario(scenario, None, Duration::from_nanos(1)).await;
    if let Err(err) = outcome {
        assert!(err.code.as_str() == "ERR_TIMEOUT" || err.code.as_str() == "ERR_STRATEGY_FAILED");
    }
}

#[tokio::test]
async fn scenario_lifecycle_emits_started_and_completed_events() {
    let coordinator = make_coordinator();
    let mut receiver = coordinator.events().subscribe();
    coordinator.run_scenario(oned_scenario(ALGO_1D_FFD), None, Duration::from_secs(5)).await.unwrap();

    let mut saw_started = false;
    let mut saw_completed = false;
    while let Ok(event) = receiver.try_recv() {
        if event.kind == EVT_OPTIMIZATION_STARTED {
            saw_started = true;
            assert_eq!(event.aggregate_type, "scenario");
        }
        if event.kind == EVT_OPTIMIZATION_COMPLETED {
            saw_completed = true;
        }
        assert!(!event.event_id.is_empty());
    }
    assert!(saw_started);
    assert!(saw_completed);
}
