//! 1D First-Fit-Decreasing and Best-Fit-Decreasing.

use super::{finalize, record_unplaced, Dimension, StrategyInput};
use crate::errors::EngineError;
use crate::geometry::{expand, sort_by_area_desc};
use crate::model::{OptimizationResult, Placement, SheetLayout, Stock};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneDVariant {
    FirstFit,
    BestFit,
}

struct OpenBar {
    stock_id: String,
    width: f64,
    height: f64,
    next_x: f64,
    placements: Vec<Placement>,
}

impl OpenBar {
    fn open(stock: &Stock) -> Self {
        Self {
            stock_id: stock.id.clone(),
            width: stock.width,
            height: stock.height,
            next_x: 0.0,
            placements: Vec::new(),
        }
    }

    /// Remaining capacity if a piece were placed next, accounting for the
    /// inter-piece kerf only when this bar already holds a placement: kerf is
    /// needed only between pieces, not at bar start.
    fn slack_for(&self, length: f64, kerf: f64) -> Option<f64> {
        let needed = length + if self.placements.is_empty() { 0.0 } else { kerf };
        let available = self.width - self.next_x;
        if available >= needed {
            Some(available - needed)
        } else {
            None
        }
    }

    fn place(&mut self, piece_id: String, order_item_id: String, length: f64, kerf: f64) {
        let x = self.next_x + if self.placements.is_empty() { 0.0 } else { kerf };
        self.placements.push(Placement {
            piece_id,
            order_item_id,
            x,
            y: 0.0,
            width: length,
            height: self.height,
            rotated: false,
        });
        self.next_x = x + length;
    }

    fn into_layout(self) -> SheetLayout {
        SheetLayout {
            stock_id: self.stock_id,
            width: self.width,
            height: self.height,
            placements: self.placements,
            free_rects: None,
        }
    }
}

pub fn run(variant: OneDVariant, input: StrategyInput<'_>) -> Result<OptimizationResult, EngineError> {
    if input.pieces.is_empty() || input.stocks.is_empty() {
        return Ok(OptimizationResult::empty());
    }

    let mut expanded = expand(input.pieces);
    sort_by_area_desc(&mut expanded, |p| p.width);

    let mut sorted_stocks: Vec<Stock> = input.stocks.to_vec();
    sort_by_area_desc(&mut sorted_stocks, |s| s.area());
    let mut budget: HashMap<String, u32> = sorted_stocks.iter().map(|s| (s.id.clone(), s.available)).collect();

    let mut open_bars: Vec<OpenBar> = Vec::new();
    let mut unplaced: HashMap<String, u32> = HashMap::new();
    let kerf = input.options.kerf;
    let count = expanded.len();

    for (i, piece) in expanded.iter().enumerate() {
        if input.token.is_cancelled() {
            let sheets = open_bars.into_iter().map(OpenBar::into_layout).collect();
            return Ok(partial_cancelled(finalize(count, unplaced, Dimension::OneD, sheets)));
        }
        (input.progress)(((i as f64 / count as f64) * 90.0) as u8 + 10);

        let chosen = match variant {
            OneDVariant::FirstFit => open_bars
                .iter()
                .position(|bar| bar.slack_for(piece.width, kerf).is_some()),
            OneDVariant::BestFit => open_bars
                .iter()
                .enumerate()
                .filter_map(|(idx, bar)| bar.slack_for(piece.width, kerf).map(|slack| (idx, slack)))
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(idx, _)| idx),
        };

        if let Some(idx) = chosen {
            open_bars[idx].place(piece.expanded_id.clone(), piece.order_item_id.clone(), piece.width, kerf);
            continue;
        }

        // No open bar accepts; try to open a new one large enough with budget.
        let opened = sorted_stocks.iter().find(|s| {
            s.width >= piece.width && *budget.get(&s.id).unwrap_or(&0) > 0
        });

        match opened {
            Some(stock) => {
                *budget.get_mut(&stock.id).unwrap() -= 1;
                let mut bar = OpenBar::open(stock);
                bar.place(piece.expanded_id.clone(), piece.order_item_id.clone(), piece.width, kerf);
                open_bars.push(bar);
            }
            None => record_unplaced(&mut unplaced, piece),
        }
    }

    (input.progress)(100);
    let sheets = open_bars.into_iter().map(OpenBar::into_layout).collect();
    Ok(finalize(count, unplaced, Dimension::OneD, sheets))
}

fn partial_cancelled(mut result: OptimizationResult) -> OptimizationResult {
    result.success = false;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Piece, StrategyOptions};
    use crate::strategies::CancellationToken;

    fn run_variant(variant: OneDVariant, pieces: Vec<Piece>, stocks: Vec<Stock>, options: StrategyOptions) -> OptimizationResult {
        let token = CancellationToken::new();
        let progress = |_p: u8| {};
        run(
            variant,
            StrategyInput { pieces: &pieces, stocks: &stocks, options, token: &token, progress: &progress },
        )
        .unwrap()
    }

    #[test]
    fn s1_ffd_trivial() {
        let stocks = vec![Stock { id: "B".into(), width: 1000.0, height: 0.0, available: 5 }];
        let pieces = vec![Piece { id: "p".into(), width: 300.0, height: 1.0, quantity: 3, order_item_id: "oi".into(), can_rotate: false }];
        let options = StrategyOptions { kerf: 0.0, allow_rotation: false };

        let result = run_variant(OneDVariant::FirstFit, pieces, stocks, options);

        assert_eq!(result.sheets.len(), 1);
        let mut xs: Vec<f64> = result.sheets[0].placements.iter().map(|p| p.x).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(xs, vec![0.0, 300.0, 600.0]);
        assert!(result.unplaced_pieces.is_empty());
        assert!((result.statistics.efficiency - 90.0).abs() < 1e-9);
    }

    #[test]
    fn s2_ffd_with_kerf() {
        let stocks = vec![Stock { id: "B".into(), width: 1000.0, height: 0.0, available: 5 }];
        let pieces = vec![Piece { id: "p".into(), width: 300.0, height: 1.0, quantity: 3, order_item_id: "oi".into(), can_rotate: false }];
        let options = StrategyOptions { kerf: 10.0, allow_rotation: false };

        let result = run_variant(OneDVariant::FirstFit, pieces, stocks, options);

        let mut xs: Vec<f64> = result.sheets[0].placements.iter().map(|p| p.x).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(xs, vec![0.0, 310.0, 620.0]);
        assert!((result.statistics.efficiency - 90.0).abs() < 1e-9);
    }

    #[test]
    fn bfd_prefers_tightest_fit() {
        let stocks = vec![Stock { id: "B".into(), width: 100.0, height: 0.0, available: 5 }];
        let pieces = vec![
            Piece { id: "a".into(), width: 60.0, height: 1.0, quantity: 1, order_item_id: "oi".into(), can_rotate: false },
            Piece { id: "b".into(), width: 90.0, height: 1.0, quantity: 1, order_item_id: "oi".into(), can_rotate: false },
            Piece { id: "c".into(), width: 10.0, height: 1.0, quantity: 1, order_item_id: "oi".into(), can_rotate: false },
        ];
        let options = StrategyOptions { kerf: 0.0, allow_rotation: false };

        let result = run_variant(OneDVariant::BestFit, pieces, stocks, options);
        // 90 opens bar 1; 60 opens bar 2 (doesn't fit remaining 10 on bar1);
        // 10 best-fits into bar 1's remaining 10, not bar 2's remaining 40.
        assert_eq!(result.sheets.len(), 2);
        let bar_with_90 = result.sheets.iter().find(|s| s.placements.iter().any(|p| p.width == 90.0)).unwrap();
        assert!(bar_with_90.placements.iter().any(|p| p.width == 10.0));
    }

    #[test]
    fn s5_unplaced_accounting() {
        let stocks = vec![Stock { id: "S".into(), width: 50.0, height: 1.0, available: 1 }];
        let pieces = vec![Piece { id: "p".into(), width: 40.0, height: 1.0, quantity: 2, order_item_id: "oi".into(), can_rotate: false }];
        let options = StrategyOptions { kerf: 0.0, allow_rotation: false };

        let result = run_variant(OneDVariant::FirstFit, pieces, stocks, options);
        assert_eq!(result.unplaced_pieces.len(), 1);
        assert_eq!(result.unplaced_pieces[0].quantity, 1);
        assert!(!result.success);
    }

    #[test]
    fn empty_inputs_yield_canonical_empty_result() {
        let result = run_variant(OneDVariant::FirstFit, vec![], vec![], StrategyOptions::default());
        assert!(!result.success);
        assert_eq!(result.sheets.len(), 0);
    }
}
