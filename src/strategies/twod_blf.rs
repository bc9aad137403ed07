//! 2D Bottom-Left-Fill.
//!
//! Position search walks the candidate corners formed by already-placed
//! pieces and the sheet's own edges, rather than a unit-pixel row scan.

use super::{finalize, record_unplaced, Dimension, StrategyInput};
use crate::errors::EngineError;
use crate::geometry::{expand, orientations, overlap, sort_by_area_desc, Rect};
use crate::model::{OptimizationResult, Placement, SheetLayout, Stock};
use std::collections::HashMap;

struct OpenSheet {
    stock_id: String,
    width: f64,
    height: f64,
    placements: Vec<Placement>,
}

impl OpenSheet {
    fn open(stock: &Stock) -> Self {
        Self { stock_id: stock.id.clone(), width: stock.width, height: stock.height, placements: Vec::new() }
    }

    /// Corner candidates: origin plus, for every existing placement, its
    /// kerf-offset right edge, top edge, and top-right corner.
    fn candidates(&self, kerf: f64) -> Vec<(f64, f64)> {
        let mut candidates = vec![(0.0, 0.0)];
        for p in &self.placements {
            candidates.push((p.x + p.width + kerf, p.y));
            candidates.push((p.x, p.y + p.height + kerf));
            candidates.push((p.x + p.width + kerf, p.y + p.height + kerf));
        }
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.partial_cmp(&b.0).unwrap()));
        candidates
    }

    fn find_position(&self, width: f64, height: f64, kerf: f64) -> Option<(f64, f64)> {
        for (x, y) in self.candidates(kerf) {
            let candidate = Rect::new(x, y, width, height);
            if !candidate.fits(self.width, self.height) {
                continue;
            }
            let collides = self
                .placements
                .iter()
                .any(|p| overlap(&candidate, &p.to_rect().inflated(kerf)));
            if !collides {
                return Some((x, y));
            }
        }
        None
    }

    fn place(&mut self, piece_id: String, order_item_id: String, x: f64, y: f64, width: f64, height: f64, rotated: bool) {
        self.placements.push(Placement { piece_id, order_item_id, x, y, width, height, rotated });
    }

    fn into_layout(self) -> SheetLayout {
        SheetLayout { stock_id: self.stock_id, width: self.width, height: self.height, placements: self.placements, free_rects: None }
    }
}

pub fn run(input: StrategyInput<'_>) -> Result<OptimizationResult, EngineError> {
    if input.pieces.is_empty() || input.stocks.is_empty() {
        return Ok(OptimizationResult::empty());
    }

    let mut expanded = expand(input.pieces);
    sort_by_area_desc(&mut expanded, |p| p.area());

    let mut sorted_stocks: Vec<Stock> = input.stocks.to_vec();
    sort_by_area_desc(&mut sorted_stocks, |s| s.area());
    let mut budget: HashMap<String, u32> = sorted_stocks.iter().map(|s| (s.id.clone(), s.available)).collect();

    let mut open_sheets: Vec<OpenSheet> = Vec::new();
    let mut unplaced: HashMap<String, u32> = HashMap::new();
    let kerf = input.options.kerf;
    let count = expanded.len();

    'piece: for (i, piece) in expanded.iter().enumerate() {
        if input.token.is_cancelled() {
            let sheets = open_sheets.into_iter().map(OpenSheet::into_layout).collect();
            let mut result = finalize(count, unplaced, Dimension::TwoD, sheets);
            result.success = false;
            return Ok(result);
        }
        (input.progress)(((i as f64 / count as f64) * 90.0) as u8 + 10);

        let orients = orientations(piece.width, piece.height, piece.can_rotate, input.options.allow_rotation);

        for sheet in open_sheets.iter_mut() {
            for orient in &orients {
                if let Some((x, y)) = sheet.find_position(orient.width, orient.height, kerf) {
                    sheet.place(piece.expanded_id.clone(), piece.order_item_id.clone(), x, y, orient.width, orient.height, orient.rotated);
                    continue 'piece;
                }
            }
        }

        // No open sheet accepts this piece in any orientation; open a new
        // one from the stock list in area-descending order with budget.
        let mut opened = None;
        for stock in sorted_stocks.iter() {
            if *budget.get(&stock.id).unwrap_or(&0) == 0 {
                continue;
            }
            if orients.iter().any(|o| o.width <= stock.width && o.height <= stock.height) {
                opened = Some(stock.clone());
                break;
            }
        }

        match opened {
            Some(stock) => {
                *budget.get_mut(&stock.id).unwrap() -= 1;
                let mut sheet = OpenSheet::open(&stock);
                for orient in &orients {
                    if let Some((x, y)) = sheet.find_position(orient.width, orient.height, kerf) {
                        sheet.place(piece.expanded_id.clone(), piece.order_item_id.clone(), x, y, orient.width, orient.height, orient.rotated);
                        open_sheets.push(sheet);
                        continue 'piece;
                    }
                }
                // Should not happen (orientation check above guarantees a fit
                // on an empty sheet), but fall through to unplaced defensively.
                open_sheets.push(sheet);
            }
            None => record_unplaced(&mut unplaced, piece),
        }
    }

    (input.progress)(100);
    let sheets = open_sheets.into_iter().map(OpenSheet::into_layout).collect();
    Ok(finalize(count, unplaced, Dimension::TwoD, sheets))
}
