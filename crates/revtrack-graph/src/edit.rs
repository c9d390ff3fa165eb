/// Atomic edit operations and their payloads.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::position::Position;

/// Every kind of edit a changeset can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditKind {
    AddedString,
    RemovedString,
    MovedString,
    ParagraphInserted,
    ParagraphRemoved,
    TableInserted,
    TableRemoved,
    FrameInserted,
    FrameRemoved,
    GraphicInserted,
    GraphicRemoved,
    ObjectInserted,
    ObjectRemoved,
}

/// Groups kinds that share a payload type and a rebasing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditFamily {
    Text,
    Paragraph,
    Table,
    Frame,
    Graphic,
    Object,
}

/// Whether an edit adds content, takes it away, or relocates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Insert,
    Remove,
    Move,
}

impl EditKind {
    pub fn family(self) -> EditFamily {
        match self {
            Self::AddedString | Self::RemovedString | Self::MovedString => EditFamily::Text,
            Self::ParagraphInserted | Self::ParagraphRemoved => EditFamily::Paragraph,
            Self::TableInserted | Self::TableRemoved => EditFamily::Table,
            Self::FrameInserted | Self::FrameRemoved => EditFamily::Frame,
            Self::GraphicInserted | Self::GraphicRemoved => EditFamily::Graphic,
            Self::ObjectInserted | Self::ObjectRemoved => EditFamily::Object,
        }
    }

    pub fn polarity(self) -> Polarity {
        match self {
            Self::MovedString => Polarity::Move,
            Self::AddedString
            | Self::ParagraphInserted
            | Self::TableInserted
            | Self::FrameInserted
            | Self::GraphicInserted
            | Self::ObjectInserted => Polarity::Insert,
            Self::RemovedString
            | Self::ParagraphRemoved
            | Self::TableRemoved
            | Self::FrameRemoved
            | Self::GraphicRemoved
            | Self::ObjectRemoved => Polarity::Remove,
        }
    }

    /// Whether the edit carries a destination position.
    pub fn is_moved(self) -> bool {
        self.polarity() == Polarity::Move
    }

    /// Whether the edit adds or removes a named document entity.
    pub fn is_structural(self) -> bool {
        matches!(
            self.family(),
            EditFamily::Table | EditFamily::Frame | EditFamily::Graphic | EditFamily::Object
        )
    }
}

/// Table dimensions and identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePayload {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
}

/// Text frame identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePayload {
    pub name: String,
}

/// Bounding box of a drawing object, in document units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i64,
    pub y: i64,
    pub width: u64,
    pub height: u64,
}

/// A drawing object or embedded object as rebuilt by the shape catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapePayload {
    pub name: String,
    /// Catalog key of the factory that rebuilds this shape.
    pub shape_kind: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub style: BTreeMap<String, String>,
    /// Reference to the embedded object's storage, set only for embedded objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

/// Kind-specific data carried by an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPayload {
    Text(String),
    Break,
    Table(TablePayload),
    Frame(FramePayload),
    Shape(ShapePayload),
}

impl EditPayload {
    fn fits(&self, kind: EditKind) -> bool {
        match (kind.family(), self) {
            (EditFamily::Text, Self::Text(_)) => true,
            (EditFamily::Paragraph, Self::Break) => true,
            (EditFamily::Table, Self::Table(_)) => true,
            (EditFamily::Frame, Self::Frame(_)) => true,
            (EditFamily::Graphic, Self::Shape(_)) => true,
            (EditFamily::Object, Self::Shape(shape)) => shape.object.is_some(),
            _ => false,
        }
    }
}

/// One atomic operation on the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    kind: EditKind,
    position: Position,
    moved_position: Option<Position>,
    payload: EditPayload,
}

impl Edit {
    /// Builds an edit, checking that the payload and moved-to position fit the kind.
    ///
    /// # Errors
    ///
    /// Returns `PayloadMismatch` if the payload belongs to another family, or
    /// `MovedPositionMismatch` if a moved-to position is given for a kind that
    /// is not a move (or missing for one that is).
    pub fn new(
        kind: EditKind,
        position: Position,
        moved_position: Option<Position>,
        payload: EditPayload,
    ) -> Result<Self> {
        if !payload.fits(kind) {
            return Err(GraphError::PayloadMismatch { kind });
        }
        if kind.is_moved() != moved_position.is_some() {
            return Err(GraphError::MovedPositionMismatch { kind });
        }
        Ok(Self {
            kind,
            position,
            moved_position,
            payload,
        })
    }

    pub fn added_string(position: Position, text: impl Into<String>) -> Self {
        Self {
            kind: EditKind::AddedString,
            position,
            moved_position: None,
            payload: EditPayload::Text(text.into()),
        }
    }

    pub fn removed_string(position: Position, text: impl Into<String>) -> Self {
        Self {
            kind: EditKind::RemovedString,
            position,
            moved_position: None,
            payload: EditPayload::Text(text.into()),
        }
    }

    /// Text cut from `from` and pasted at `to`.
    pub fn moved_string(from: Position, to: Position, text: impl Into<String>) -> Self {
        Self {
            kind: EditKind::MovedString,
            position: from,
            moved_position: Some(to),
            payload: EditPayload::Text(text.into()),
        }
    }

    /// A paragraph split at `at`.
    pub fn paragraph_inserted(at: Position) -> Self {
        Self {
            kind: EditKind::ParagraphInserted,
            position: at,
            moved_position: None,
            payload: EditPayload::Break,
        }
    }

    /// Two paragraphs joined at `at`.
    pub fn paragraph_removed(at: Position) -> Self {
        Self {
            kind: EditKind::ParagraphRemoved,
            position: at,
            moved_position: None,
            payload: EditPayload::Break,
        }
    }

    pub fn kind(&self) -> EditKind {
        self.kind
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn moved_position(&self) -> Option<&Position> {
        self.moved_position.as_ref()
    }

    /// The position and, for moves, the moved-to position.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        std::iter::once(&self.position).chain(self.moved_position.as_ref())
    }

    pub fn payload(&self) -> &EditPayload {
        &self.payload
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            EditPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Name of the table, frame, graphic, or embedded object this edit adds or removes.
    pub fn entity(&self) -> Option<&str> {
        match (&self.payload, self.kind.family()) {
            (EditPayload::Table(table), _) => Some(&table.name),
            (EditPayload::Frame(frame), _) => Some(&frame.name),
            (EditPayload::Shape(shape), EditFamily::Object) => shape.object.as_deref(),
            (EditPayload::Shape(shape), _) => Some(&shape.name),
            (EditPayload::Text(_) | EditPayload::Break, _) => None,
        }
    }

    /// Whether both edits add or remove the same named entity.
    pub fn same_entity(&self, other: &Edit) -> bool {
        self.kind.is_structural()
            && self.kind.family() == other.kind.family()
            && self.entity().is_some()
            && self.entity() == other.entity()
    }

    /// Copy of this edit at new positions.
    pub(crate) fn relocated(&self, position: Position, moved_position: Option<Position>) -> Self {
        Self {
            kind: self.kind,
            position,
            moved_position,
            payload: self.payload.clone(),
        }
    }
}

/// Collapses a removal immediately followed by an insertion of the same text
/// into a single move.
///
/// One greedy pass from left to right; any other edit passes through as is.
/// The pairing only looks at adjacency and text, so an unrelated delete that
/// happens to be followed by typing the same text is also reported as a move.
pub fn detect_moves(edits: &[Edit]) -> Vec<Edit> {
    let mut detected = Vec::with_capacity(edits.len());
    let mut iter = edits.iter().peekable();

    while let Some(edit) = iter.next() {
        if edit.kind == EditKind::RemovedString {
            if let Some(next) = iter.peek() {
                if next.kind == EditKind::AddedString && next.text() == edit.text() {
                    detected.push(Edit {
                        kind: EditKind::MovedString,
                        position: edit.position.clone(),
                        moved_position: Some(next.position.clone()),
                        payload: edit.payload.clone(),
                    });
                    iter.next();
                    continue;
                }
            }
        }
        detected.push(edit.clone());
    }

    detected
}
