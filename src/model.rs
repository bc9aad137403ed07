//! Core data model: the immutable inputs and owned outputs the engine
//! passes across its component boundaries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A demanded piece. Immutable input, borrowed by the engine for one
/// optimization. For 1D, `height` is unused and `width` is the bar length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Piece {
    pub id: String,
    pub width: f64,
    pub height: f64,
    pub quantity: u32,
    pub order_item_id: String,
    pub can_rotate: bool,
}

impl Piece {
    /// `width>0 ∧ height>0` for 2D pieces. 1D callers pass a
    /// positive placeholder `height` (conventionally the bar cross-section).
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.quantity >= 1
    }
}

/// Available stock (bars or sheets). Immutable input, consumed from an
/// integer budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stock {
    pub id: String,
    pub width: f64,
    pub height: f64,
    pub available: u32,
}

impl Stock {
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// One placed piece within a sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub piece_id: String,
    pub order_item_id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotated: bool,
}

impl Placement {
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn to_rect(&self) -> crate::geometry::Rect {
        crate::geometry::Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// An axis-aligned free rectangle tracked by guillotine-style strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One opened bar/sheet and everything placed on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetLayout {
    pub stock_id: String,
    pub width: f64,
    pub height: f64,
    pub placements: Vec<Placement>,
    /// Present only for guillotine-style strategies.
    pub free_rects: Option<Vec<FreeRect>>,
}

impl SheetLayout {
    pub fn new(stock_id: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            stock_id: stock_id.into(),
            width,
            height,
            placements: Vec::new(),
            free_rects: None,
        }
    }

    pub fn used_area(&self) -> f64 {
        self.placements.iter().map(Placement::area).sum()
    }

    pub fn waste_area(&self) -> f64 {
        (self.width * self.height - self.used_area()).max(0.0)
    }
}

/// One `originalId`'s unplaced remainder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnplacedPiece {
    pub id: String,
    pub quantity: u32,
}

/// Aggregate statistics over an `OptimizationResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_pieces: u32,
    pub total_stock_area: f64,
    pub total_used_area: f64,
    pub efficiency: f64,
}

/// The output of running a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub success: bool,
    pub sheets: Vec<SheetLayout>,
    pub total_waste_area: f64,
    pub total_waste_percentage: f64,
    pub stock_used_count: u32,
    pub unplaced_pieces: Vec<UnplacedPiece>,
    pub statistics: Statistics,
}

impl OptimizationResult {
    /// The canonical empty result for empty pieces or empty stocks: `success=false`, zero totals.
    pub fn empty() -> Self {
        Self {
            success: false,
            sheets: Vec::new(),
            total_waste_area: 0.0,
            total_waste_percentage: 0.0,
            stock_used_count: 0,
            unplaced_pieces: Vec::new(),
            statistics: Statistics {
                total_pieces: 0,
                total_stock_area: 0.0,
                total_used_area: 0.0,
                efficiency: 0.0,
            },
        }
    }
}

/// Options shared by every strategy invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyOptions {
    pub kerf: f64,
    pub allow_rotation: bool,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self { kerf: 0.0, allow_rotation: false }
    }
}

/// Coarse task category; drives which registry table a name resolves
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    OneD,
    TwoD,
}

/// Engine-internal unit of work submitted to the Worker Pool.
#[derive(Debug, Clone)]
pub struct TaskPayload {
    pub algorithm: String,
    pub pieces: Vec<Piece>,
    pub stocks: Vec<Stock>,
    pub options: StrategyOptions,
}

/// Task lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPhase {
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
    Timeout,
}

impl TaskPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskPhase::Completed | TaskPhase::Cancelled | TaskPhase::Failed | TaskPhase::Timeout
        )
    }
}

/// Progress payload broadcast for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: String,
    pub phase: TaskPhase,
    pub progress: u8,
    pub message: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Scenario lifecycle status, tracked by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A scenario the coordinator orchestrates end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub job_id: String,
    pub algorithm: String,
    pub options: StrategyOptions,
    pub pieces: Vec<Piece>,
    pub stocks: Vec<Stock>,
    pub status: ScenarioStatus,
}

/// A produced cutting plan, the successful output of `runScenario`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub scenario_id: String,
    pub result: OptimizationResult,
    pub algorithm_used: String,
    pub shadow_algorithm: Option<String>,
}

/// Which leg of a shadowed prediction produced a given record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionType {
    Primary,
    Shadow,
    Fallback,
}

/// An ML prediction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub model_type: String,
    pub model_version: String,
    pub input_features: HashMap<String, f64>,
    pub raw_prediction: f64,
    pub confidence: f64,
    pub execution_type: ExecutionType,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Wall-clock time the predictor took to produce `raw_prediction`, when
    /// known.
    pub latency_ms: Option<f64>,
    /// Set when the engine fell back to a default predictor/algorithm
    /// rather than a resolved experiment model.
    pub is_fallback: bool,
    pub actual_value: Option<f64>,
    pub feedback_score: Option<f64>,
    pub feedback_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Experiment scope: global or pinned to one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentScope {
    Global,
    Tenant(String),
}

/// An active champion/challenger experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub model_type: String,
    pub scope: ExperimentScope,
    pub control_model_id: String,
    pub variant_model_id: String,
    pub allocation_basis_points: u32,
    pub salt: String,
    pub start_date: chrono::DateTime<chrono::Utc>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub status: ExperimentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentStatus {
    Active,
    Paused,
    Concluded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_has_zero_totals_and_is_unsuccessful() {
        let result = OptimizationResult::empty();
        assert!(!result.success);
        assert_eq!(result.total_waste_area, 0.0);
        assert_eq!(result.statistics.efficiency, 0.0);
    }

    #[test]
    fn piece_validity_rejects_non_positive_dimensions() {
        let piece = Piece {
            id: "p".into(),
            width: 0.0,
            height: 10.0,
            quantity: 1,
            order_item_id: "oi".into(),
            can_rotate: false,
        };
        assert!(!piece.is_valid());
    }

    #[test]
    fn task_phase_terminal_classification() {
        assert!(!TaskPhase::Queued.is_terminal());
        assert!(!TaskPhase::Running.is_terminal());
        assert!(TaskPhase::Completed.is_terminal());
        assert!(TaskPhase::Cancelled.is_terminal());
        assert!(TaskPhase::Failed.is_terminal());
        assert!(TaskPhase::Timeout.is_terminal());
    }
}
