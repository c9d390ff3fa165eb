/// Text ranges, their nesting chains, and the overlap/order tests on them.
///
/// A `Position` covers `start..end` in paragraph-major order. Positions inside a
/// table cell, frame, or embedded object carry an `anchor` id that resolves
/// through an `AnchorTable` to the position of their container, forming a chain
/// that always ends at a top-level position.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// A paragraph/character coordinate.
///
/// Ordered paragraph-major: any point in paragraph 2 sorts after every point
/// in paragraph 1, regardless of offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TextPoint {
    /// 0-indexed paragraph number.
    pub paragraph: usize,
    /// 0-indexed char offset within the paragraph.
    pub offset: usize,
}

impl TextPoint {
    pub fn new(paragraph: usize, offset: usize) -> Self {
        Self { paragraph, offset }
    }
}

/// Identifier of a registered container position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

/// Identity of a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub u64);

/// A text range, optionally nested inside a container and/or a table cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    start: TextPoint,
    end: TextPoint,
    anchor: Option<PositionId>,
    cell: Option<CellId>,
}

/// Result of ordering two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOrder {
    /// The first position ends at or before the second one starts.
    Before,
    /// The first position starts at or after the second one ends.
    After,
    /// The ranges intersect at every paired nesting level.
    Overlapping,
    /// Nesting chains or cell identities disagree.
    Incomparable,
    /// Nested positions whose paired levels disagree, e.g. separate
    /// containers holding intersecting inner ranges.
    Mixed,
}

impl Position {
    /// Creates a top-level range. The endpoints are swapped if given reversed.
    pub fn new(start: TextPoint, end: TextPoint) -> Self {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        Self {
            start,
            end,
            anchor: None,
            cell: None,
        }
    }

    /// Shorthand for `Position::new` from raw coordinates.
    pub fn span(start_paragraph: usize, start_offset: usize, end_paragraph: usize, end_offset: usize) -> Self {
        Self::new(
            TextPoint::new(start_paragraph, start_offset),
            TextPoint::new(end_paragraph, end_offset),
        )
    }

    /// A zero-length position.
    pub fn point(paragraph: usize, offset: usize) -> Self {
        Self::span(paragraph, offset, paragraph, offset)
    }

    pub fn with_anchor(mut self, anchor: PositionId) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_cell(mut self, cell: CellId) -> Self {
        self.cell = Some(cell);
        self
    }

    pub fn start(&self) -> TextPoint {
        self.start
    }

    pub fn end(&self) -> TextPoint {
        self.end
    }

    pub fn anchor(&self) -> Option<PositionId> {
        self.anchor
    }

    pub fn cell(&self) -> Option<CellId> {
        self.cell
    }

    /// Whether the range has zero length.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Number of paragraph boundaries the range crosses.
    pub fn paragraph_span(&self) -> usize {
        self.end.paragraph - self.start.paragraph
    }

    /// Whether both positions live in the same container and cell, so their
    /// coordinates are directly comparable.
    pub fn same_frame(&self, other: &Position) -> bool {
        self.anchor == other.anchor && self.cell == other.cell
    }

    /// Copy of this position with new endpoints, keeping anchor and cell.
    pub(crate) fn moved_to(&self, start: TextPoint, end: TextPoint) -> Self {
        Self {
            start,
            end,
            anchor: self.anchor,
            cell: self.cell,
        }
    }

    /// Orders two positions at a single nesting level.
    ///
    /// Zero-length ranges sitting on the endpoint of another range are ordered
    /// rather than overlapping. Two zero-length ranges at the same point are the
    /// one exception: they overlap, which is what makes two insertions of a
    /// table at the same spot dependent.
    pub fn order_in_frame(&self, other: &Position) -> PositionOrder {
        if (self.cell.is_some() || other.cell.is_some()) && self.cell != other.cell {
            return PositionOrder::Incomparable;
        }
        if self.is_empty() && other.is_empty() && self.start == other.start {
            return PositionOrder::Overlapping;
        }
        if self.end <= other.start {
            PositionOrder::Before
        } else if other.end <= self.start {
            PositionOrder::After
        } else {
            PositionOrder::Overlapping
        }
    }
}

/// Arena of container positions that nested positions anchor to.
///
/// Ids are handed out in increasing order and an entry may only anchor to an
/// id that already exists, so every chain strictly decreases and terminates.
#[derive(Debug, Clone, Default)]
pub struct AnchorTable {
    entries: BTreeMap<PositionId, Position>,
    next_id: u64,
}

impl AnchorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a container position and returns its id.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if `position` anchors to an unknown id, or
    /// an exhaustion error if the id space is used up.
    pub fn register(&mut self, position: Position) -> Result<PositionId> {
        if let Some(anchor) = position.anchor {
            if !self.entries.contains_key(&anchor) {
                return Err(GraphError::Consistency(format!(
                    "anchor {} is not registered",
                    anchor.0
                )));
            }
        }
        let id = PositionId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(GraphError::Exhausted("anchor ids"))?;
        self.entries.insert(id, position);
        Ok(id)
    }

    /// Inserts an entry with a pre-assigned id, as read back from storage.
    pub(crate) fn restore(&mut self, id: PositionId, position: Position) -> Result<()> {
        if let Some(anchor) = position.anchor {
            if anchor >= id || !self.entries.contains_key(&anchor) {
                return Err(GraphError::Consistency(format!(
                    "anchor {} referenced by {} is missing or not older",
                    anchor.0, id.0
                )));
            }
        }
        if self.entries.insert(id, position).is_some() {
            return Err(GraphError::Consistency(format!("anchor {} stored twice", id.0)));
        }
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        Ok(())
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PositionId, &Position)> {
        self.entries.iter().map(|(id, pos)| (*id, pos))
    }

    /// Resolves the nesting chain of `position`, outermost container first and
    /// `position` itself last.
    pub fn chain<'a>(&'a self, position: &'a Position) -> Result<Vec<&'a Position>> {
        let mut chain = vec![position];
        let mut current = position.anchor;
        while let Some(id) = current {
            let container = self.entries.get(&id).ok_or_else(|| {
                GraphError::Consistency(format!("anchor {} is not registered", id.0))
            })?;
            chain.push(container);
            current = container.anchor;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Orders two possibly nested positions.
    ///
    /// Chains are paired from the outermost level inwards. `Before` needs every
    /// paired level of `a` to end at or before `b` starts, `After` the reverse,
    /// and `Overlapping` every paired level to intersect. Levels that disagree
    /// give `Mixed`. Chains whose depths differ by more than one level, or any
    /// level with mismatched cells, cannot be related.
    pub fn compare(&self, a: &Position, b: &Position) -> Result<PositionOrder> {
        let chain_a = self.chain(a)?;
        let chain_b = self.chain(b)?;
        if chain_a.len().abs_diff(chain_b.len()) > 1 {
            return Ok(PositionOrder::Incomparable);
        }

        let mut levels = chain_a
            .iter()
            .zip(chain_b.iter())
            .map(|(level_a, level_b)| level_a.order_in_frame(level_b));
        let Some(first) = levels.next() else {
            return Ok(PositionOrder::Incomparable);
        };
        let mut order = first;
        for level in levels {
            order = match (order, level) {
                (PositionOrder::Incomparable, _) | (_, PositionOrder::Incomparable) => {
                    PositionOrder::Incomparable
                }
                (current, next) if current == next => current,
                _ => PositionOrder::Mixed,
            };
        }
        Ok(order)
    }

    /// Whether two possibly nested positions touch the same content.
    ///
    /// Symmetric in its arguments.
    pub fn overlaps(&self, a: &Position, b: &Position) -> Result<bool> {
        Ok(self.compare(a, b)? == PositionOrder::Overlapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_normalizes_reversed_endpoints() {
        let pos = Position::span(3, 4, 1, 2);
        assert_eq!(pos.start(), TextPoint::new(1, 2));
        assert_eq!(pos.end(), TextPoint::new(3, 4));
    }

    #[test]
    fn test_text_point_orders_paragraph_major() {
        assert!(TextPoint::new(1, 99) < TextPoint::new(2, 0));
        assert!(TextPoint::new(2, 3) < TextPoint::new(2, 4));
    }

    #[rstest]
    #[case::disjoint(Position::span(0, 0, 0, 5), Position::span(0, 7, 0, 9), false)]
    #[case::intersecting(Position::span(0, 0, 0, 5), Position::span(0, 3, 0, 9), true)]
    #[case::touching(Position::span(0, 0, 0, 5), Position::span(0, 5, 0, 9), false)]
    #[case::contained(Position::span(1, 0, 3, 0), Position::span(2, 4, 2, 6), true)]
    #[case::across_paragraphs(Position::span(1, 8, 2, 2), Position::span(2, 0, 2, 1), true)]
    #[case::point_inside(Position::point(0, 3), Position::span(0, 0, 0, 5), true)]
    #[case::point_at_start(Position::point(0, 0), Position::span(0, 0, 0, 5), false)]
    #[case::point_at_end(Position::point(0, 5), Position::span(0, 0, 0, 5), false)]
    #[case::same_point(Position::point(4, 0), Position::point(4, 0), true)]
    #[case::different_points(Position::point(4, 0), Position::point(4, 1), false)]
    fn test_overlap_truth_table(#[case] a: Position, #[case] b: Position, #[case] expected: bool) {
        let anchors = AnchorTable::new();
        assert_eq!(anchors.overlaps(&a, &b).expect("overlap"), expected);
        assert_eq!(anchors.overlaps(&b, &a).expect("overlap"), expected);
    }

    #[test]
    fn test_cell_identity_must_match() {
        let anchors = AnchorTable::new();
        let a = Position::span(0, 0, 0, 5).with_cell(CellId(1));
        let b = Position::span(0, 0, 0, 5).with_cell(CellId(2));
        let c = Position::span(0, 0, 0, 5);
        let d = Position::span(0, 2, 0, 3).with_cell(CellId(1));

        assert!(!anchors.overlaps(&a, &b).expect("overlap"));
        assert!(!anchors.overlaps(&a, &c).expect("overlap"));
        assert!(anchors.overlaps(&a, &d).expect("overlap"));
        assert_eq!(a.order_in_frame(&c), PositionOrder::Incomparable);
    }

    #[test]
    fn test_compare_separates_after_from_overlapping() {
        let anchors = AnchorTable::new();
        let early = Position::span(0, 0, 0, 4);
        let late = Position::span(2, 0, 2, 4);
        let mid = Position::span(0, 2, 2, 1);

        assert_eq!(anchors.compare(&early, &late).expect("cmp"), PositionOrder::Before);
        assert_eq!(anchors.compare(&late, &early).expect("cmp"), PositionOrder::After);
        assert_eq!(anchors.compare(&early, &mid).expect("cmp"), PositionOrder::Overlapping);
    }

    #[test]
    fn test_nested_position_overlaps_its_container() {
        let mut anchors = AnchorTable::new();
        let table = Position::span(3, 0, 4, 0);
        let table_id = anchors.register(table.clone()).expect("register");
        let in_cell = Position::span(0, 1, 0, 2)
            .with_anchor(table_id)
            .with_cell(CellId(9));

        assert!(anchors.overlaps(&table, &in_cell).expect("overlap"));
        assert!(!anchors
            .overlaps(&Position::span(0, 0, 1, 0), &in_cell)
            .expect("overlap"));
    }

    #[test]
    fn test_nested_positions_need_every_level_ordered() {
        let mut anchors = AnchorTable::new();
        let first = anchors.register(Position::span(1, 0, 2, 0)).expect("register");
        let second = anchors.register(Position::span(5, 0, 6, 0)).expect("register");

        let a = Position::span(0, 0, 0, 3).with_anchor(first);
        let b = Position::span(0, 5, 0, 9).with_anchor(second);
        assert_eq!(anchors.compare(&a, &b).expect("cmp"), PositionOrder::Before);
        assert_eq!(anchors.compare(&b, &a).expect("cmp"), PositionOrder::After);

        // separate containers, intersecting inner ranges
        let c = Position::span(0, 0, 0, 9).with_anchor(first);
        let d = Position::span(0, 0, 0, 9).with_anchor(second);
        assert_eq!(anchors.compare(&c, &d).expect("cmp"), PositionOrder::Mixed);
        assert!(!anchors.overlaps(&c, &d).expect("overlap"));

        // separate containers, inner ranges in the opposite order
        let e = Position::span(0, 5, 0, 9).with_anchor(first);
        let f = Position::span(0, 0, 0, 3).with_anchor(second);
        assert_eq!(anchors.compare(&e, &f).expect("cmp"), PositionOrder::Mixed);
    }

    #[test]
    fn test_mismatched_cell_at_inner_level_is_incomparable() {
        let mut anchors = AnchorTable::new();
        let first = anchors.register(Position::span(1, 0, 2, 0)).expect("register");
        let second = anchors.register(Position::span(5, 0, 6, 0)).expect("register");
        let a = Position::span(0, 0, 0, 3).with_anchor(first).with_cell(CellId(1));
        let b = Position::span(0, 5, 0, 9).with_anchor(second).with_cell(CellId(2));

        assert_eq!(anchors.compare(&a, &b).expect("cmp"), PositionOrder::Incomparable);
    }

    #[test]
    fn test_chains_deeper_by_two_levels_are_incomparable() {
        let mut anchors = AnchorTable::new();
        let outer = anchors.register(Position::span(1, 0, 2, 0)).expect("register");
        let inner = anchors
            .register(Position::span(0, 0, 0, 5).with_anchor(outer))
            .expect("register");
        let deep = Position::span(0, 1, 0, 2).with_anchor(inner);
        let top = Position::span(1, 0, 2, 0);

        assert_eq!(anchors.chain(&deep).expect("chain").len(), 3);
        assert_eq!(anchors.compare(&deep, &top).expect("cmp"), PositionOrder::Incomparable);
        assert!(!anchors.overlaps(&deep, &top).expect("overlap"));
    }

    #[test]
    fn test_register_rejects_unknown_anchor() {
        let mut anchors = AnchorTable::new();
        let err = anchors
            .register(Position::point(0, 0).with_anchor(PositionId(42)))
            .expect_err("unknown anchor");
        assert!(err.is_consistency());
    }

    #[test]
    fn test_restore_rejects_forward_reference() {
        let mut anchors = AnchorTable::new();
        anchors
            .restore(PositionId(0), Position::span(0, 0, 1, 0))
            .expect("restore");
        let err = anchors
            .restore(PositionId(1), Position::point(0, 0).with_anchor(PositionId(1)))
            .expect_err("self reference");
        assert!(err.is_consistency());

        let id = anchors.register(Position::point(2, 0)).expect("register");
        assert_eq!(id, PositionId(1));
    }
}
