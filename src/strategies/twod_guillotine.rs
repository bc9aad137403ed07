//! 2D Guillotine with free-rectangle splitting.

use super::{finalize, record_unplaced, Dimension, StrategyInput};
use crate::errors::EngineError;
use crate::geometry::{expand, orientations, sort_by_area_desc, Orientation};
use crate::model::{FreeRect, OptimizationResult, Placement, SheetLayout, Stock};
use std::collections::HashMap;

struct OpenSheet {
    stock_id: String,
    width: f64,
    height: f64,
    placements: Vec<Placement>,
    free_rects: Vec<FreeRect>,
}

impl OpenSheet {
    fn open(stock: &Stock) -> Self {
        Self {
            stock_id: stock.id.clone(),
            width: stock.width,
            height: stock.height,
            placements: Vec::new(),
            free_rects: vec![FreeRect { x: 0.0, y: 0.0, width: stock.width, height: stock.height }],
        }
    }

    /// Best-Short-Side-Fit candidate among this sheet's free rectangles for
    /// one orientation: `min(freeW-pieceW-kerf, freeH-pieceH-kerf)`, lower
    /// `(y,x)` breaking ties. Returns `(free_rect_index, metric)`.
    fn best_candidate(&self, orient: &Orientation, kerf: f64) -> Option<(usize, f64)> {
        self.free_rects
            .iter()
            .enumerate()
            .filter(|(_, fr)| orient.width <= fr.width && orient.height <= fr.height)
            .map(|(idx, fr)| {
                let metric = (fr.width - orient.width - kerf).min(fr.height - orient.height - kerf);
                (idx, metric, fr.y, fr.x)
            })
            .min_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap()
                    .then(a.2.partial_cmp(&b.2).unwrap())
                    .then(a.3.partial_cmp(&b.3).unwrap())
            })
            .map(|(idx, metric, _, _)| (idx, metric))
    }

    fn place_in(&mut self, free_idx: usize, piece_id: String, order_item_id: String, orient: &Orientation, kerf: f64) {
        let free = self.free_rects.remove(free_idx);
        let (x, y) = (free.x, free.y);
        self.placements.push(Placement {
            piece_id,
            order_item_id,
            x,
            y,
            width: orient.width,
            height: orient.height,
            rotated: orient.rotated,
        });

        let right = FreeRect {
            x: x + orient.width + kerf,
            y,
            width: free.width - orient.width - kerf,
            height: free.height,
        };
        let top = FreeRect {
            x,
            y: y + orient.height + kerf,
            width: orient.width + kerf,
            height: free.height - orient.height - kerf,
        };
        if right.width > kerf && right.height > kerf {
            self.free_rects.push(right);
        }
        if top.width > kerf && top.height > kerf {
            self.free_rects.push(top);
        }
    }

    fn into_layout(self) -> SheetLayout {
        SheetLayout {
            stock_id: self.stock_id,
            width: self.width,
            height: self.height,
            placements: self.placements,
            free_rects: Some(self.free_rects),
        }
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

        for orient in &orients {
            let global_best = open_sheets
                .iter()
                .enumerate()
                .filter_map(|(sheet_idx, sheet)| sheet.best_candidate(orient, kerf).map(|(free_idx, metric)| (sheet_idx, free_idx, metric)))
                .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap());

            if let Some((sheet_idx, free_idx, _)) = global_best {
                open_sheets[sheet_idx].place_in(free_idx, piece.expanded_id.clone(), piece.order_item_id.clone(), orient, kerf);
                continue 'piece;
            }
        }

        // No open sheet's free rectangle accepts this piece; open a new one.
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
                let mut placed = false;
                for orient in &orients {
                    if let Some((free_idx, _)) = sheet.best_candidate(orient, kerf) {
                        sheet.place_in(free_idx, piece.expanded_id.clone(), piece.order_item_id.clone(), orient, kerf);
                        placed = true;
                        break;
                    }
                }
                open_sheets.push(sheet);
                if placed {
                    continue 'piece;
                }
            }
            None => record_unplaced(&mut unplaced, piece),
        }
    }

    (input.progress)(100);
    let sheets = open_sheets.into_iter().map(OpenSheet::into_layout).collect();
    Ok(finalize(count, unplaced, Dimension::TwoD, sheets))
}
