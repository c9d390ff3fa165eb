/// Re-expressing positions in the coordinate frame of another history state.
///
/// A position recorded after some prior edit was applied is moved into the
/// frame where that edit is absent (`forward == false`), or a position recorded
/// without the prior edit is moved into the frame that has it (`forward == true`).
/// When the two edits touch the same content there is no frame-independent
/// answer and the result is `Rebased::Dependent`.
use crate::edit::{Edit, EditFamily, EditKind, Polarity};
use crate::error::Result;
use crate::position::{AnchorTable, Position, PositionOrder, TextPoint};

/// Outcome of moving a position or edit across a prior edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rebased<T> {
    /// The value expressed in the other frame.
    Shifted(T),
    /// The value intersects the prior edit; the two are causally dependent.
    Dependent,
}

impl<T> Rebased<T> {
    pub fn is_dependent(&self) -> bool {
        matches!(self, Self::Dependent)
    }

    pub fn shifted(self) -> Option<T> {
        match self {
            Self::Shifted(value) => Some(value),
            Self::Dependent => None,
        }
    }
}

/// Direction in which content after the prior edit moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shift {
    /// Content after the edit point moves towards the end of the document.
    Grow,
    /// Content after the edited span moves back to the span's start.
    Shrink,
}

impl Shift {
    fn new(polarity: Polarity, forward: bool) -> Self {
        // moves are rebased half by half; the vacated half acts as a removal
        let inserts = match polarity {
            Polarity::Insert => true,
            Polarity::Remove | Polarity::Move => false,
        };
        if inserts == forward {
            Self::Grow
        } else {
            Self::Shrink
        }
    }
}

/// The span of text an edit displaces, as `(start, end)`.
///
/// Text edits displace their own range; a paragraph break displaces from the
/// split point to the start of the next paragraph; a table or frame displaces
/// one whole paragraph. Graphics and embedded objects are anchored and do not
/// displace text.
fn displacement(family: EditFamily, position: &Position) -> Option<(TextPoint, TextPoint)> {
    let start = position.start();
    match family {
        EditFamily::Text => Some((start, position.end())),
        EditFamily::Paragraph => Some((start, TextPoint::new(start.paragraph.saturating_add(1), 0))),
        EditFamily::Table | EditFamily::Frame => Some((
            TextPoint::new(start.paragraph, 0),
            TextPoint::new(start.paragraph.saturating_add(1), 0),
        )),
        EditFamily::Graphic | EditFamily::Object => None,
    }
}

/// Coordinates saturate at the numeric bounds rather than wrapping.
fn shift_point(point: TextPoint, start: TextPoint, end: TextPoint, shift: Shift) -> TextPoint {
    let paragraphs = end.paragraph.saturating_sub(start.paragraph);
    match shift {
        Shift::Shrink if point.paragraph == end.paragraph => TextPoint::new(
            start.paragraph,
            start.offset.saturating_add(point.offset).saturating_sub(end.offset),
        ),
        Shift::Shrink => TextPoint::new(point.paragraph.saturating_sub(paragraphs), point.offset),
        Shift::Grow if point.paragraph == start.paragraph => TextPoint::new(
            end.paragraph,
            end.offset.saturating_add(point.offset).saturating_sub(start.offset),
        ),
        Shift::Grow => TextPoint::new(point.paragraph.saturating_add(paragraphs), point.offset),
    }
}

fn rebase_with_polarity(
    pos: &Position,
    prior_pos: &Position,
    family: EditFamily,
    polarity: Polarity,
    original_pos: &Position,
    forward: bool,
    anchors: &AnchorTable,
) -> Result<Rebased<Position>> {
    if !prior_pos.same_frame(original_pos) {
        // Offsets in different containers never shift each other; only
        // touching the container itself makes them dependent.
        return Ok(if anchors.overlaps(prior_pos, original_pos)? {
            Rebased::Dependent
        } else {
            Rebased::Shifted(pos.clone())
        });
    }

    let Some((start, end)) = displacement(family, prior_pos) else {
        return Ok(match prior_pos.order_in_frame(original_pos) {
            PositionOrder::Overlapping => Rebased::Dependent,
            _ => Rebased::Shifted(pos.clone()),
        });
    };

    let shift = Shift::new(polarity, forward);
    // The displaced span exists in the frame being rebased out of only when
    // shrinking; when growing it collapses to its start point.
    let region = match shift {
        Shift::Shrink => prior_pos.moved_to(start, end),
        Shift::Grow => prior_pos.moved_to(start, start),
    };

    Ok(match region.order_in_frame(original_pos) {
        PositionOrder::Before => Rebased::Shifted(pos.moved_to(
            shift_point(pos.start(), start, end, shift),
            shift_point(pos.end(), start, end, shift),
        )),
        PositionOrder::Overlapping => Rebased::Dependent,
        PositionOrder::After | PositionOrder::Incomparable | PositionOrder::Mixed => {
            Rebased::Shifted(pos.clone())
        }
    })
}

/// Rebases `pos` across one position of a prior edit of kind `prior_kind`.
///
/// Whether a shift applies is decided by how `prior_pos` orders against
/// `original_pos`, the position as first recorded; the shift itself is applied
/// to `pos`, which may already carry earlier corrections. For a
/// `MovedString`, `prior_pos` is read as the vacated span; use `rebase_edit`
/// to account for both halves of a move.
pub fn rebase(
    pos: &Position,
    prior_pos: &Position,
    prior_kind: EditKind,
    original_pos: &Position,
    forward: bool,
    anchors: &AnchorTable,
) -> Result<Rebased<Position>> {
    let polarity = match prior_kind.polarity() {
        Polarity::Move => Polarity::Remove,
        polarity => polarity,
    };
    rebase_with_polarity(
        pos,
        prior_pos,
        prior_kind.family(),
        polarity,
        original_pos,
        forward,
        anchors,
    )
}

/// Rebases one position across every half of `prior`.
fn rebase_across(
    pos: &Position,
    prior: &Edit,
    forward: bool,
    anchors: &AnchorTable,
) -> Result<Rebased<Position>> {
    let Some(destination) = prior.moved_position() else {
        return rebase(pos, prior.position(), prior.kind(), pos, forward, anchors);
    };

    // Forward: the text leaves its source, then lands at the destination.
    // Backward: undo the landing first, then restore the source.
    let source = prior.position();
    let steps = if forward {
        [(source, Polarity::Remove), (destination, Polarity::Insert)]
    } else {
        [(destination, Polarity::Insert), (source, Polarity::Remove)]
    };

    let mut current = pos.clone();
    for (prior_pos, polarity) in steps {
        match rebase_with_polarity(
            &current,
            prior_pos,
            EditFamily::Text,
            polarity,
            &current,
            forward,
            anchors,
        )? {
            Rebased::Shifted(next) => current = next,
            Rebased::Dependent => return Ok(Rebased::Dependent),
        }
    }
    Ok(Rebased::Shifted(current))
}

/// Rebases both positions of `edit` across `prior`.
///
/// Returns `Dependent` if either position of `edit` intersects either position
/// of `prior`, or if both edits add or remove the same named entity.
pub fn rebase_edit(
    edit: &Edit,
    prior: &Edit,
    forward: bool,
    anchors: &AnchorTable,
) -> Result<Rebased<Edit>> {
    if edit.same_entity(prior) {
        return Ok(Rebased::Dependent);
    }

    let Rebased::Shifted(position) = rebase_across(edit.position(), prior, forward, anchors)? else {
        return Ok(Rebased::Dependent);
    };
    let moved_position = match edit.moved_position() {
        Some(moved) => match rebase_across(moved, prior, forward, anchors)? {
            Rebased::Shifted(moved) => Some(moved),
            Rebased::Dependent => return Ok(Rebased::Dependent),
        },
        None => None,
    };

    Ok(Rebased::Shifted(edit.relocated(position, moved_position)))
}

/// Rebases every edit of a batch across every edit of `prior`, newest prior
/// edit first when going backwards and oldest first when going forwards.
pub fn rebase_edits(
    edits: &[Edit],
    prior: &[Edit],
    forward: bool,
    anchors: &AnchorTable,
) -> Result<Rebased<Vec<Edit>>> {
    let mut rebased = Vec::with_capacity(edits.len());
    for edit in edits {
        let mut current = edit.clone();
        let mut order: Vec<&Edit> = prior.iter().collect();
        if !forward {
            order.reverse();
        }
        for prior_edit in order {
            match rebase_edit(&current, prior_edit, forward, anchors)? {
                Rebased::Shifted(next) => current = next,
                Rebased::Dependent => return Ok(Rebased::Dependent),
            }
        }
        rebased.push(current);
    }
    Ok(Rebased::Shifted(rebased))
}
