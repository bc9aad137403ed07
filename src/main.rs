//! CLI runner: load a scenario and an optional config file from disk, run
//! it through the engine in-process, print the resulting plan as JSON, and
//! exit with the code the requirement's error table assigns to the
//! outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cutting_engine::cache::Cache;
use cutting_engine::config::EngineConfig;
use cutting_engine::coordinator::{Coordinator, InMemoryScenarioRepository};
use cutting_engine::errors::EngineError;
use cutting_engine::events::EventBus;
use cutting_engine::ml::predictor::{NullPredictor, Predictor, StaticPredictor};
use cutting_engine::model::Scenario;
use cutting_engine::pool::{WorkerPool, WorkerPoolConfig};
use cutting_engine::prediction_log::PredictionLog;
use cutting_engine::registry::AlgorithmRegistry;
use tracing::info;

/// Run a cutting-stock optimization scenario end to end.
#[derive(Parser, Debug)]
#[command(name = "cutting-engine", version, about = "1D/2D cutting-stock optimization engine")]
struct Cli {
    /// Path to a JSON scenario file (see `model::Scenario`).
    scenario: PathBuf,

    /// Optional TOML engine configuration file; defaults apply if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Algorithm to run alongside the primary scenario purely for
    /// comparison; never affects the primary result.
    #[arg(long)]
    shadow_algorithm: Option<String>,

    /// Per-task deadline in milliseconds, overriding the config default.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Use the static area-ratio heuristic predictor instead of the
    /// ML-off default.
    #[arg(long)]
    heuristic_predictor: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(err.code.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), EngineError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)
            .map_err(|e| EngineError::validation(format!("failed to load config: {e}")))?,
        None => EngineConfig::default(),
    };

    let scenario_json = std::fs::read_to_string(&cli.scenario)
        .map_err(|e| EngineError::validation(format!("failed to read scenario file: {e}")))?;
    let scenario: Scenario = serde_json::from_str(&scenario_json)
        .map_err(|e| EngineError::validation(format!("failed to parse scenario: {e}")))?;

    if metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder().is_err() {
        info!("metrics recorder already installed for this process; continuing without reinstalling");
    }

    let registry = Arc::new(AlgorithmRegistry::new());
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::from(config.pool.clone()), registry.clone()));
    let events = EventBus::with_capacities(config.events.channel_capacity, config.events.log_capacity);
    let repository = Arc::new(InMemoryScenarioRepository::new());
    let prediction_log = PredictionLog::new();
    let cache = Cache::new();
    let _cleanup = cache.spawn_cleanup(Duration::from_millis(config.cache.cleanup_interval_ms));

    let predictor: Arc<dyn Predictor> = if cli.heuristic_predictor {
        Arc::new(StaticPredictor)
    } else {
        Arc::new(NullPredictor)
    };

    let coordinator = Coordinator::new(pool, registry, events, repository, prediction_log, predictor).with_ml_enabled(config.ml.enabled);

    let timeout = Duration::from_millis(cli.timeout_ms.unwrap_or_else(|| config.default_task_timeout().as_millis() as u64));
    let plan = coordinator.run_scenario(scenario, cli.shadow_algorithm, timeout).await?;

    let output = serde_json::to_string_pretty(&plan)
        .map_err(|e| EngineError::validation(format!("failed to serialize plan: {e}")))?;
    println!("{output}");
    Ok(())
}
