//! Cutting-stock optimization engine.
//!
//! Exposes the Optimization Engine + Execution Substrate: geometry and piece
//! expansion, strategy algorithms, the algorithm registry, the worker pool,
//! the job coordinator, the event bus, the cache, ML-assisted selection with
//! shadow evaluation, the prediction log, and resilience wrappers. Auth,
//! HTTP/WS framing, persistence, domain CRUD, and notifications are external
//! collaborators and live outside this crate.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod geometry;
pub mod metrics;
pub mod ml;
pub mod model;
pub mod pool;
pub mod prediction_log;
pub mod registry;
pub mod resilience;
pub mod strategies;

pub use coordinator::{Coordinator, InMemoryScenarioRepository, ScenarioRepository};
pub use errors::{EngineError, EngineResult, ErrorCode};
pub use registry::AlgorithmRegistry;
