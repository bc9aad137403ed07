//! Algorithm Registry: name → strategy lookup, with separate 1D/2D tables.
//! Read-mostly; writes only happen at initialization.

use crate::errors::EngineError;
use crate::model::TaskType;
use crate::strategies::oned::OneDVariant;
use crate::strategies::twod_blf;
use crate::strategies::twod_guillotine;
use crate::strategies::{oned, Strategy, StrategyInput};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub const ALGO_1D_FFD: &str = "1D_FFD";
pub const ALGO_1D_BFD: &str = "1D_BFD";
pub const ALGO_2D_BOTTOM_LEFT: &str = "2D_BOTTOM_LEFT";
pub const ALGO_2D_GUILLOTINE: &str = "2D_GUILLOTINE";
/// Historical alias: resolves to Guillotine. Kept for callers that still
/// submit the old name rather than silently reinterpreting their intent.
pub const ALGO_MAXRECTS_ALIAS: &str = "MAXRECTS";

struct Ffd;
impl Strategy for Ffd {
    fn run(&self, input: StrategyInput<'_>) -> Result<crate::model::OptimizationResult, EngineError> {
        oned::run(OneDVariant::FirstFit, input)
    }
}

struct Bfd;
impl Strategy for Bfd {
    fn run(&self, input: StrategyInput<'_>) -> Result<crate::model::OptimizationResult, EngineError> {
        oned::run(OneDVariant::BestFit, input)
    }
}

struct BottomLeft;
impl Strategy for BottomLeft {
    fn run(&self, input: StrategyInput<'_>) -> Result<crate::model::OptimizationResult, EngineError> {
        twod_blf::run(input)
    }
}

struct Guillotine;
impl Strategy for Guillotine {
    fn run(&self, input: StrategyInput<'_>) -> Result<crate::model::OptimizationResult, EngineError> {
        twod_guillotine::run(input)
    }
}

/// Process-wide mapping of algorithm name to strategy, split into a 1D and
/// a 2D table.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    one_d: Arc<RwLock<HashMap<String, Arc<dyn Strategy>>>>,
    two_d: Arc<RwLock<HashMap<String, Arc<dyn Strategy>>>>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        let registry = Self {
            one_d: Arc::new(RwLock::new(HashMap::new())),
            two_d: Arc::new(RwLock::new(HashMap::new())),
        };
        registry.register(TaskType::OneD, ALGO_1D_FFD, Arc::new(Ffd));
        registry.register(TaskType::OneD, ALGO_1D_BFD, Arc::new(Bfd));
        registry.register(TaskType::TwoD, ALGO_2D_BOTTOM_LEFT, Arc::new(BottomLeft));
        registry.register(TaskType::TwoD, ALGO_2D_GUILLOTINE, Arc::new(Guillotine));
        registry
    }

    fn table(&self, task_type: TaskType) -> &Arc<RwLock<HashMap<String, Arc<dyn Strategy>>>> {
        match task_type {
            TaskType::OneD => &self.one_d,
            TaskType::TwoD => &self.two_d,
        }
    }

    /// Register (or overwrite, with a warning) a strategy under `name`.
    pub fn register(&self, task_type: TaskType, name: &str, strategy: Arc<dyn Strategy>) {
        let table = self.table(task_type);
        let mut guard = table.write();
        if guard.contains_key(name) {
            warn!(algorithm = name, "overwriting existing registry entry");
        }
        guard.insert(name.to_string(), strategy);
    }

    pub fn has(&self, task_type: TaskType, name: &str) -> bool {
        self.table(task_type).read().contains_key(Self::resolve_alias(name))
    }

    pub fn list(&self, task_type: TaskType) -> Vec<String> {
        self.table(task_type).read().keys().cloned().collect()
    }

    /// Resolve a name to a strategy by string: unknown names
    /// return `ERR_UNKNOWN_ALGORITHM`. `MAXRECTS` resolves to Guillotine.
    pub fn get(&self, task_type: TaskType, name: &str) -> Result<Arc<dyn Strategy>, EngineError> {
        let resolved = Self::resolve_alias(name);
        self.table(task_type)
            .read()
            .get(resolved)
            .cloned()
            .ok_or_else(|| EngineError::unknown_algorithm(name))
    }

    fn resolve_alias(name: &str) -> &str {
        if name == ALGO_MAXRECTS_ALIAS {
            ALGO_2D_GUILLOTINE
        } else {
            name
        }
    }
}
