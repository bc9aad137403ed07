//! Predictor capability: `predictWaste`/`pickAlgorithm`. The
//! engine depends only on this trait; a real model-serving backend is an
//! external collaborator the Non-goals exclude. Two reference
//! implementations ship so shadow comparison and calibration have
//! something concrete, deterministic, and synchronous to exercise in tests.

use crate::model::{Piece, Stock, TaskType};
use crate::registry::{ALGO_1D_BFD, ALGO_1D_FFD, ALGO_2D_BOTTOM_LEFT, ALGO_2D_GUILLOTINE};

/// A waste-percentage estimate plus a confidence in `[0,1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WastePrediction {
    pub waste_percentage: f64,
    pub confidence: f64,
}

/// A wall-clock runtime estimate plus a confidence in `[0,1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePrediction {
    pub estimated_ms: f64,
    pub confidence: f64,
}

pub trait Predictor: Send + Sync {
    fn model_type(&self) -> &'static str;
    fn model_version(&self) -> &'static str;

    fn predict_waste(&self, task_type: TaskType, pieces: &[Piece], stocks: &[Stock]) -> WastePrediction;

    /// Recommend an algorithm name for the registry to resolve. Must return a name the registry actually has
    /// registered for `task_type`.
    fn pick_algorithm(&self, task_type: TaskType, pieces: &[Piece], stocks: &[Stock]) -> String;

    /// Estimate how long the scenario will take to run, for deadline planning
    /// and shedding decisions upstream of submission.
    fn predict_time(&self, task_type: TaskType, pieces: &[Piece], stocks: &[Stock]) -> TimePrediction;
}

/// The "ML-off" implementation: deterministic defaults, zero confidence.
/// Selected when no experiment resolves a model for the caller.
pub struct NullPredictor;

impl Predictor for NullPredictor {
    fn model_type(&self) -> &'static str {
        "null"
    }

    fn model_version(&self) -> &'static str {
        "v0"
    }

    fn predict_waste(&self, _task_type: TaskType, _pieces: &[Piece], _stocks: &[Stock]) -> WastePrediction {
        WastePrediction { waste_percentage: 0.0, confidence: 0.0 }
    }

    fn pick_algorithm(&self, task_type: TaskType, _pieces: &[Piece], _stocks: &[Stock]) -> String {
        match task_type {
            TaskType::OneD => ALGO_1D_FFD.to_string(),
            TaskType::TwoD => ALGO_2D_BOTTOM_LEFT.to_string(),
        }
    }

    fn predict_time(&self, _task_type: TaskType, _pieces: &[Piece], _stocks: &[Stock]) -> TimePrediction {
        TimePrediction { estimated_ms: 0.0, confidence: 0.0 }
    }
}

/// A rule-of-thumb predictor: estimates waste from the ratio of total piece
/// area to total available stock area, and picks the tighter-fitting
/// algorithm (BFD/Guillotine) once demand is a large fraction of supply.
/// Pure and deterministic — no model file, no I/O.
pub struct StaticPredictor;

impl Predictor for StaticPredictor {
    fn model_type(&self) -> &'static str {
        "static-heuristic"
    }

    fn model_version(&self) -> &'static str {
        "v1"
    }

    fn predict_waste(&self, task_type: TaskType, pieces: &[Piece], stocks: &[Stock]) -> WastePrediction {
        let demand: f64 = pieces
            .iter()
            .map(|p| demand_area(task_type, p) * p.quantity as f64)
            .sum();
        let supply: f64 = stocks.iter().map(|s| supply_area(task_type, s) * s.available as f64).sum();

        if supply <= 0.0 {
            return WastePrediction { waste_percentage: 100.0, confidence: 0.0 };
        }

        let utilization = (demand / supply).clamp(0.0, 1.0);
        WastePrediction { waste_percentage: (1.0 - utilization) * 100.0, confidence: 0.5 }
    }

    fn pick_algorithm(&self, task_type: TaskType, pieces: &[Piece], stocks: &[Stock]) -> String {
        let prediction = self.predict_waste(task_type, pieces, stocks);
        match task_type {
            TaskType::OneD => {
                if prediction.waste_percentage > 15.0 {
                    ALGO_1D_BFD.to_string()
                } else {
                    ALGO_1D_FFD.to_string()
                }
            }
            TaskType::TwoD => {
                if prediction.waste_percentage > 15.0 {
                    ALGO_2D_GUILLOTINE.to_string()
                } else {
                    ALGO_2D_BOTTOM_LEFT.to_string()
                }
            }
        }
    }

    /// Linear in total piece count, with a per-unit cost that roughly
    /// tracks the extra free-rectangle bookkeeping 2D strategies do over 1D.
    fn predict_time(&self, task_type: TaskType, pieces: &[Piece], _stocks: &[Stock]) -> TimePrediction {
        let unit_count: u64 = pieces.iter().map(|p| p.quantity as u64).sum();
        let ms_per_unit = match task_type {
            TaskType::OneD => 0.05,
            TaskType::TwoD => 0.2,
        };
        TimePrediction { estimated_ms: unit_count as f64 * ms_per_unit, confidence: 0.5 }
    }
}

fn demand_area(task_type: TaskType, piece: &Piece) -> f64 {
    match task_type {
        TaskType::OneD => piece.width,
        TaskType::TwoD => piece.width * piece.height,
    }
}

fn supply_area(task_type: TaskType, stock: &Stock) -> f64 {
    match task_type {
        TaskType::OneD => stock.width,
        TaskType::TwoD => stock.width * stock.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(width: f64, height: f64, quantity: u32) -> Piece {
        Piece { id: "p".into(), width, height, quantity, order_item_id: "oi".into(), can_rotate: false }
    }

    fn stock(width: f64, height: f64, available: u32) -> Stock {
        Stock { id: "s".into(), width, height, available }
    }

    #[test]
    fn null_predictor_has_zero_confidence_and_fixed_defaults() {
        let predictor = NullPredictor;
        let prediction = predictor.predict_waste(TaskType::TwoD, &[], &[]);
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(predictor.pick_algorithm(TaskType::OneD, &[], &[]), ALGO_1D_FFD);
    }

    #[test]
    fn static_predictor_estimates_waste_from_area_ratio() {
        let predictor = StaticPredictor;
        let pieces = vec![piece(50.0, 50.0, 1)];
        let stocks = vec![stock(100.0, 100.0, 1)];
        let prediction = predictor.predict_waste(TaskType::TwoD, &pieces, &stocks);
        assert!((prediction.waste_percentage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn static_predictor_escalates_to_tighter_fit_under_high_predicted_waste() {
        let predictor = StaticPredictor;
        let pieces = vec![piece(10.0, 10.0, 1)];
        let stocks = vec![stock(1000.0, 1000.0, 1)];
        assert_eq!(predictor.pick_algorithm(TaskType::TwoD, &pieces, &stocks), ALGO_2D_GUILLOTINE);
    }

    #[test]
    fn zero_supply_is_full_predicted_waste_not_a_panic() {
        let predictor = StaticPredictor;
        let prediction = predictor.predict_waste(TaskType::OneD, &[piece(10.0, 1.0, 1)], &[]);
        assert_eq!(prediction.waste_percentage, 100.0);
    }

    #[test]
    fn null_predictor_predicts_zero_time() {
        let predictor = NullPredictor;
        let prediction = predictor.predict_time(TaskType::OneD, &[piece(10.0, 1.0, 5)], &[]);
        assert_eq!(prediction.estimated_ms, 0.0);
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn static_predictor_scales_time_with_piece_count() {
        let predictor = StaticPredictor;
        let few = predictor.predict_time(TaskType::TwoD, &[piece(10.0, 10.0, 1)], &[]);
        let many = predictor.predict_time(TaskType::TwoD, &[piece(10.0, 10.0, 50)], &[]);
        assert!(many.estimated_ms > few.estimated_ms);
    }
}
