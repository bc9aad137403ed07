//! Rectangle geometry, overlap/fit tests, and piece expansion.
//!
//! Coordinates are half-open: a rectangle `(x, y, w, h)` occupies
//! `[x, x+w) x [y, y+h)`. Kerf is applied by inflating a placement's
//! right/top edge only — never its left/bottom.

use crate::model::Piece;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in sheet-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Inflate this rectangle's right/top edge by `kerf`, per the asymmetric
    /// kerf policy here: a cut consumes blade width *after* the
    /// piece, so only the right and top edges grow.
    #[inline]
    pub fn inflated(&self, kerf: f64) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width + kerf,
            height: self.height + kerf,
        }
    }

    /// Does this rectangle fit within `sheet` without exceeding its bounds?
    #[inline]
    pub fn fits(&self, sheet_width: f64, sheet_height: f64) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= sheet_width && self.bottom_ok(sheet_height)
    }

    #[inline]
    fn bottom_ok(&self, sheet_height: f64) -> bool {
        self.top() <= sheet_height
    }
}

/// Half-open overlap test: two rectangles overlap iff neither is
/// entirely to one side of the other on both axes.
#[inline]
pub fn overlap(r1: &Rect, r2: &Rect) -> bool {
    !(r1.right() <= r2.x || r2.right() <= r1.x || r1.top() <= r2.y || r2.top() <= r1.y)
}

/// One orientation of a piece: dimensions plus whether it was rotated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub width: f64,
    pub height: f64,
    pub rotated: bool,
}

/// Enumerate the orientations a piece may be placed in.
///
/// Always yields the non-rotated orientation first. Yields the rotated
/// orientation too when `allow_rotation && piece.can_rotate && width != height`.
pub fn orientations(width: f64, height: f64, can_rotate: bool, allow_rotation: bool) -> Vec<Orientation> {
    let mut out = vec![Orientation { width, height, rotated: false }];
    if allow_rotation && can_rotate && (width - height).abs() > f64::EPSILON {
        out.push(Orientation { width: height, height: width, rotated: true });
    }
    out
}

/// One unit of a piece after quantity expansion — the atomic placement
/// candidate a strategy consumes.
#[derive(Debug, Clone)]
pub struct ExpandedPiece {
    /// Composite identity `originalId#index`, preserved across placement.
    pub expanded_id: String,
    pub original_id: String,
    pub order_item_id: String,
    pub width: f64,
    pub height: f64,
    pub can_rotate: bool,
}

impl ExpandedPiece {
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Expand a population of pieces into one entry per unit of `quantity`.
/// Preserves insertion order within and across pieces, which is the
/// tie-break basis for the stable pre-sort every strategy runs.
pub fn expand(pieces: &[Piece]) -> Vec<ExpandedPiece> {
    let mut out = Vec::new();
    for piece in pieces {
        for index in 0..piece.quantity {
            out.push(ExpandedPiece {
                expanded_id: format!("{}#{}", piece.id, index),
                original_id: piece.id.clone(),
                order_item_id: piece.order_item_id.clone(),
                width: piece.width,
                height: piece.height,
                can_rotate: piece.can_rotate,
            });
        }
    }
    out
}

/// Stable sort by descending area, preserving original relative order among
/// ties.
pub fn sort_by_area_desc<T, F: Fn(&T) -> f64>(items: &mut [T], area_of: F) {
    items.sort_by(|a, b| {
        area_of(b)
            .partial_cmp(&area_of(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_open_overlap_touching_edges_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(!overlap(&a, &b));
    }

    #[test]
    fn overlap_detects_true_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert!(overlap(&a, &b));
    }

    #[test]
    fn inflated_grows_only_right_and_top() {
        let r = Rect::new(5.0, 5.0, 10.0, 10.0);
        let inflated = r.inflated(2.0);
        assert_eq!(inflated.x, 5.0);
        assert_eq!(inflated.y, 5.0);
        assert_eq!(inflated.width, 12.0);
        assert_eq!(inflated.height, 12.0);
    }

    #[test]
    fn orientations_skip_rotation_for_squares() {
        let o = orientations(10.0, 10.0, true, true);
        assert_eq!(o.len(), 1);
    }

    #[test]
    fn orientations_include_rotation_when_eligible() {
        let o = orientations(10.0, 6.0, true, true);
        assert_eq!(o.len(), 2);
        assert!(o[1].rotated);
        assert_eq!((o[1].width, o[1].height), (6.0, 10.0));
    }

    #[test]
    fn orientations_respect_can_rotate_and_allow_rotation_flags() {
        assert_eq!(orientations(10.0, 6.0, false, true).len(), 1);
        assert_eq!(orientations(10.0, 6.0, true, false).len(), 1);
    }

    #[test]
    fn expand_preserves_order_and_composite_ids() {
        let pieces = vec![
            Piece { id: "p1".into(), width: 10.0, height: 10.0, quantity: 2, order_item_id: "oi1".into(), can_rotate: false },
            Piece { id: "p2".into(), width: 5.0, height: 5.0, quantity: 1, order_item_id: "oi2".into(), can_rotate: false },
        ];
        let expanded = expand(&pieces);
        let ids: Vec<_> = expanded.iter().map(|e| e.expanded_id.clone()).collect();
        assert_eq!(ids, vec!["p1#0", "p1#1", "p2#0"]);
    }
}
