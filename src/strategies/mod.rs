//! Strategy algorithms: pure placement functions with the shared signature
//! `(pieces, stocks, options) -> OptimizationResult`.
//!
//! Every strategy is deterministic given identical inputs — no clock, no
//! randomness — and cooperatively cancellable: each checks `token` once per
//! outer (per-piece) iteration and, if observed tripped, returns the partial
//! result built so far with `success=false`.

pub mod oned;
pub mod twod_blf;
pub mod twod_guillotine;

use crate::errors::EngineError;
use crate::geometry::ExpandedPiece;
use crate::model::{OptimizationResult, Piece, Stock, StrategyOptions, UnplacedPiece};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cooperative-cancellation signal. Cheap to clone; `cancel()` is
/// idempotent and observable from any thread holding a clone.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress reporter a strategy calls at its own granularity; correctness
/// must never depend on how often this fires.
pub type ProgressFn<'a> = dyn Fn(u8) + Send + Sync + 'a;

/// Common inputs every strategy closes over.
pub struct StrategyInput<'a> {
    pub pieces: &'a [Piece],
    pub stocks: &'a [Stock],
    pub options: StrategyOptions,
    pub token: &'a CancellationToken,
    pub progress: &'a ProgressFn<'a>,
}

/// A registrable strategy implementation.
pub trait Strategy: Send + Sync {
    fn run(&self, input: StrategyInput<'_>) -> Result<OptimizationResult, EngineError>;
}

impl<F> Strategy for F
where
    F: Fn(StrategyInput<'_>) -> Result<OptimizationResult, EngineError> + Send + Sync,
{
    fn run(&self, input: StrategyInput<'_>) -> Result<OptimizationResult, EngineError> {
        self(input)
    }
}

/// Area convention used to aggregate statistics. 1D bars carry an
/// unconstrained (often zero) cross-section height, so 1D accounting treats
/// "area" as bar length alone; 2D accounting uses the full rectangle area.
/// Only *opened* sheets contribute — unopened stock budget is not "area"
/// the job consumed.
#[derive(Clone, Copy)]
pub(crate) enum Dimension {
    OneD,
    TwoD,
}

impl Dimension {
    #[inline]
    fn area(self, width: f64, height: f64) -> f64 {
        match self {
            Dimension::OneD => width,
            Dimension::TwoD => width * height,
        }
    }
}

/// Finalize unplaced-piece accounting and aggregate statistics shared by
/// every strategy.
pub(crate) fn finalize(
    expanded_total: usize,
    unplaced_by_original: HashMap<String, u32>,
    dimension: Dimension,
    sheets: Vec<crate::model::SheetLayout>,
) -> OptimizationResult {
    let total_stock_area: f64 = sheets.iter().map(|s| dimension.area(s.width, s.height)).sum();
    let total_used_area: f64 = sheets
        .iter()
        .flat_map(|s| s.placements.iter())
        .map(|p| dimension.area(p.width, p.height))
        .sum();
    let total_waste_area = (total_stock_area - total_used_area).max(0.0);
    let total_unplaced: u32 = unplaced_by_original.values().sum();
    let total_pieces = expanded_total as u32 - total_unplaced;

    let efficiency = if total_stock_area > 0.0 {
        (total_used_area / total_stock_area * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let total_waste_percentage = if total_stock_area > 0.0 {
        (total_waste_area / total_stock_area * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let mut unplaced_pieces: Vec<UnplacedPiece> = unplaced_by_original
        .into_iter()
        .map(|(id, quantity)| UnplacedPiece { id, quantity })
        .collect();
    unplaced_pieces.sort_by(|a, b| a.id.cmp(&b.id));

    let stock_used_count = sheets.len() as u32;
    let success = total_unplaced == 0 && !sheets.is_empty();

    OptimizationResult {
        success,
        sheets,
        total_waste_area,
        total_waste_percentage,
        stock_used_count,
        unplaced_pieces,
        statistics: crate::model::Statistics {
            total_pieces,
            total_stock_area,
            total_used_area,
            efficiency,
        },
    }
}

pub(crate) fn record_unplaced(map: &mut HashMap<String, u32>, piece: &ExpandedPiece) {
    *map.entry(piece.original_id.clone()).or_insert(0) += 1;
}
