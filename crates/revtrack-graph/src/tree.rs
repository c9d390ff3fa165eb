/// Persisted form of a revision graph and its load/save against a container.
///
/// A graph is stored as one JSON tree per direction. Changesets carry their
/// parent ids as numbered `parent1`, `parent2`, ... attributes; children are
/// never stored and are re-derived on load. Authors are stored once in a root
/// list and referenced by index.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::changeset::{Changeset, Timestamp};
use crate::container::{Container, ManifestEntry};
use crate::edit::{Edit, EditFamily, EditKind, EditPayload, FramePayload, ShapePayload, TablePayload};
use crate::env::{Environment, ShapeRecord};
use crate::error::{GraphError, Result};
use crate::graph::{Direction, RevisionGraph};
use crate::position::{AnchorTable, CellId, Position, PositionId, TextPoint};

/// Prefix of the numbered parent attributes on a changeset node.
const PARENT_PREFIX: &str = "parent";

/// Root of a persisted history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTree {
    pub direction: Direction,
    pub version: u32,
    pub created: Timestamp,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<AnchorNode>,
    #[serde(default)]
    pub changesets: Vec<ChangesetNode>,
}

/// A registered container position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorNode {
    pub id: PositionId,
    pub start: [usize; 2],
    pub end: [usize; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<PositionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesetNode {
    pub id: u64,
    /// Index into the root's author list.
    pub author: u32,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub comment: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub corrected: bool,
    /// `parentN` attributes, keyed by attribute name.
    #[serde(flatten)]
    pub parents: BTreeMap<String, u64>,
    #[serde(default)]
    pub edits: Vec<EditNode>,
}

/// One edit, tagged by kind name, with its positions and payload attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditNode {
    pub kind: EditKind,
    pub start: [usize; 2],
    pub end: [usize; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<PositionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_start: Option<[usize; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_end: Option<[usize; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_anchor: Option<PositionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_cell: Option<CellId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TablePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FramePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ShapePayload>,
}

fn point_attr(point: TextPoint) -> [usize; 2] {
    [point.paragraph, point.offset]
}

fn position_from_attrs(
    start: [usize; 2],
    end: [usize; 2],
    anchor: Option<PositionId>,
    cell: Option<CellId>,
) -> Position {
    let mut position = Position::new(TextPoint::new(start[0], start[1]), TextPoint::new(end[0], end[1]));
    if let Some(anchor) = anchor {
        position = position.with_anchor(anchor);
    }
    if let Some(cell) = cell {
        position = position.with_cell(cell);
    }
    position
}

impl AnchorNode {
    fn from_anchor(id: PositionId, position: &Position) -> Self {
        Self {
            id,
            start: point_attr(position.start()),
            end: point_attr(position.end()),
            anchor: position.anchor(),
            cell: position.cell(),
        }
    }
}

impl EditNode {
    pub fn from_edit(edit: &Edit) -> Self {
        let position = edit.position();
        let moved = edit.moved_position();
        let mut node = Self {
            kind: edit.kind(),
            start: point_attr(position.start()),
            end: point_attr(position.end()),
            anchor: position.anchor(),
            cell: position.cell(),
            moved_start: moved.map(|m| point_attr(m.start())),
            moved_end: moved.map(|m| point_attr(m.end())),
            moved_anchor: moved.and_then(Position::anchor),
            moved_cell: moved.and_then(Position::cell),
            text: None,
            table: None,
            frame: None,
            shape: None,
        };
        match edit.payload() {
            EditPayload::Text(text) => node.text = Some(text.clone()),
            EditPayload::Break => {}
            EditPayload::Table(table) => node.table = Some(table.clone()),
            EditPayload::Frame(frame) => node.frame = Some(frame.clone()),
            EditPayload::Shape(shape) => node.shape = Some(shape.clone()),
        }
        node
    }

    /// Rebuilds the edit, passing shapes through the environment's catalog.
    pub fn into_edit(self, env: &Environment) -> Result<Edit> {
        let kind = self.kind;
        let mismatch = || GraphError::PayloadMismatch { kind };
        let payload = match kind.family() {
            EditFamily::Text => EditPayload::Text(self.text.ok_or_else(mismatch)?),
            EditFamily::Paragraph => EditPayload::Break,
            EditFamily::Table => EditPayload::Table(self.table.ok_or_else(mismatch)?),
            EditFamily::Frame => EditPayload::Frame(self.frame.ok_or_else(mismatch)?),
            EditFamily::Graphic | EditFamily::Object => {
                let shape = self.shape.ok_or_else(mismatch)?;
                EditPayload::Shape(env.shapes.reconstruct(ShapeRecord {
                    name: shape.name,
                    shape_kind: shape.shape_kind,
                    geometry: shape.geometry,
                    style: shape.style,
                    object: shape.object,
                })?)
            }
        };

        let position = position_from_attrs(self.start, self.end, self.anchor, self.cell);
        let moved_position = match (self.moved_start, self.moved_end) {
            (Some(start), Some(end)) => Some(position_from_attrs(start, end, self.moved_anchor, self.moved_cell)),
            (None, None) => None,
            _ => return Err(GraphError::MovedPositionMismatch { kind }),
        };
        Edit::new(kind, position, moved_position, payload)
    }
}

impl ChangesetNode {
    /// Parent ids from the `parentN` attributes.
    ///
    /// # Errors
    ///
    /// Returns a fatal error for any other unrecognized attribute.
    pub fn parent_ids(&self) -> Result<Vec<u64>> {
        self.parents
            .iter()
            .map(|(key, id)| {
                let numbered = key
                    .strip_prefix(PARENT_PREFIX)
                    .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
                if numbered {
                    Ok(*id)
                } else {
                    Err(GraphError::fatal(
                        format!("Unexpected attribute on changeset {}", self.id),
                        anyhow::anyhow!("`{key}` is not a parent reference"),
                    ))
                }
            })
            .collect()
    }
}

impl HistoryTree {
    /// Captures the persisted form of `graph`, changesets oldest first.
    pub fn from_graph(graph: &RevisionGraph) -> Result<Self> {
        let mut authors: Vec<String> = Vec::new();
        let mut changesets = Vec::with_capacity(graph.current_revision_count());

        for changeset in graph.changesets() {
            let index = match authors.iter().position(|a| a == changeset.author()) {
                Some(index) => index,
                None => {
                    authors.push(changeset.author().to_string());
                    authors.len() - 1
                }
            };
            let author = u32::try_from(index).map_err(|_| GraphError::Exhausted("author references"))?;

            let parents = changeset
                .parents()
                .iter()
                .enumerate()
                .map(|(n, id)| (format!("{PARENT_PREFIX}{}", n + 1), *id))
                .collect();

            changesets.push(ChangesetNode {
                id: changeset.id(),
                author,
                timestamp: changeset.timestamp(),
                comment: changeset.comment().to_string(),
                corrected: changeset.is_corrected(),
                parents,
                edits: changeset.edits().iter().map(EditNode::from_edit).collect(),
            });
        }

        Ok(Self {
            direction: graph.direction(),
            version: graph.environment().config.format_version,
            created: graph.created(),
            authors,
            anchors: graph
                .anchors()
                .iter()
                .map(|(id, position)| AnchorNode::from_anchor(id, position))
                .collect(),
            changesets,
        })
    }

    /// Rebuilds a graph, re-deriving children from the stored parent ids.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the tree is from a newer format version, or a
    /// consistency error if it was saved for the other direction or
    /// references authors, anchors, or parents that don't exist.
    pub fn into_graph(self, direction: Direction, env: Arc<Environment>) -> Result<RevisionGraph> {
        let supported = env.config.format_version;
        if self.version > supported {
            return Err(GraphError::fatal(
                "Unsupported history format",
                anyhow::anyhow!("version {} is newer than {supported}", self.version),
            ));
        }
        if self.direction != direction {
            return Err(GraphError::Consistency(format!(
                "tree records {:?} history but was loaded as {direction:?}",
                self.direction
            )));
        }

        let mut anchors = AnchorTable::new();
        for node in self.anchors {
            anchors.restore(node.id, position_from_attrs(node.start, node.end, node.anchor, node.cell))?;
        }

        let mut records = Vec::with_capacity(self.changesets.len());
        for node in self.changesets {
            let author = usize::try_from(node.author)
                .ok()
                .and_then(|index| self.authors.get(index))
                .ok_or_else(|| {
                    GraphError::Consistency(format!(
                        "changeset {} references unknown author {}",
                        node.id, node.author
                    ))
                })?;
            let parent_ids = node.parent_ids()?;
            let edits = node
                .edits
                .into_iter()
                .map(|edit| edit.into_edit(&env))
                .collect::<Result<Vec<_>>>()?;

            let mut changeset = Changeset::new(node.timestamp, author.as_str(), node.comment, edits);
            changeset.id = node.id;
            changeset.corrected = node.corrected;
            for parent in parent_ids {
                changeset.add_parent_id(parent);
            }
            records.push(changeset);
        }

        RevisionGraph::from_records(direction, env, self.created, anchors, records)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| GraphError::fatal("Failed to encode history tree", e))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| GraphError::fatal("Failed to decode history tree", e))
    }
}

impl RevisionGraph {
    /// Loads the graph of `direction` from its part in `container`.
    ///
    /// # Errors
    ///
    /// Returns `MissingPart` if the container has no such part, a fatal error
    /// if it cannot be read or decoded, or a consistency error if the stored
    /// graph contradicts itself.
    pub fn load(container: &dyn Container, direction: Direction, env: Arc<Environment>) -> Result<Self> {
        let part = env.config.part_name(direction).to_string();
        let bytes = container
            .read_part(&part)
            .map_err(|e| GraphError::fatal(format!("Failed to read history part `{part}`"), e))?
            .ok_or_else(|| GraphError::MissingPart { part: part.clone() })?;

        let graph = HistoryTree::from_bytes(&bytes)?.into_graph(direction, env)?;
        tracing::info!(
            part,
            changesets = graph.current_revision_count(),
            "Loaded revision graph"
        );
        Ok(graph)
    }

    /// Loads the graph, starting an empty one if the container has no history
    /// for this direction yet.
    pub fn load_or_new(container: &dyn Container, direction: Direction, env: Arc<Environment>) -> Result<Self> {
        match Self::load(container, direction, Arc::clone(&env)) {
            Ok(graph) => Ok(graph),
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Starting with empty history: {e}");
                Ok(Self::new(direction, env))
            }
            Err(e) => Err(e),
        }
    }

    /// Writes the graph into its part of `container`, registering the part in
    /// the manifest if it is not listed yet.
    pub fn save(&self, container: &dyn Container) -> Result<()> {
        let config = &self.environment().config;
        let part = config.part_name(self.direction());
        let bytes = HistoryTree::from_graph(self)?.to_bytes()?;

        container
            .write_part(part, &bytes)
            .map_err(|e| GraphError::fatal(format!("Failed to write history part `{part}`"), e))?;
        let listed = container
            .has_manifest_entry(part)
            .map_err(|e| GraphError::fatal("Failed to read container manifest", e))?;
        if !listed {
            container
                .register_part(&ManifestEntry {
                    part: part.to_string(),
                    media_type: config.media_type.clone(),
                })
                .map_err(|e| GraphError::fatal("Failed to update container manifest", e))?;
        }

        tracing::info!(
            part,
            changesets = self.current_revision_count(),
            bytes = bytes.len(),
            "Saved revision graph"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::RedbContainer;
    use crate::edit::Geometry;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn at(seconds: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn env() -> Arc<Environment> {
        Arc::new(Environment::with_builtins())
    }

    fn sample_graph() -> RevisionGraph {
        let mut graph = RevisionGraph::new(Direction::Undo, env());
        let table = graph
            .register_anchor(Position::span(4, 0, 5, 0))
            .expect("register table");
        graph
            .add_changeset(
                vec![Edit::added_string(Position::span(0, 0, 0, 5), "hello")],
                "alice",
                at(0),
                "greeting",
                0,
                true,
            )
            .expect("first");
        graph
            .add_changeset(
                vec![
                    Edit::removed_string(Position::span(0, 1, 0, 3), "el"),
                    Edit::added_string(Position::span(0, 1, 0, 2).with_anchor(table).with_cell(CellId(3)), "x"),
                ],
                "bob",
                at(1),
                "",
                0,
                true,
            )
            .expect("second");
        graph
            .add_changeset(
                vec![Edit::moved_string(Position::span(2, 0, 2, 3), Position::span(0, 0, 0, 3), "abc")],
                "alice",
                at(2),
                "reorder",
                0,
                true,
            )
            .expect("third");
        graph
    }

    fn summary(graph: &RevisionGraph) -> Vec<(u64, Vec<u64>, Vec<u64>, Vec<Edit>)> {
        graph
            .changesets()
            .map(|cs| {
                (
                    cs.id(),
                    cs.parents().iter().copied().collect(),
                    cs.children().iter().copied().collect(),
                    cs.edits().to_vec(),
                )
            })
            .collect()
    }

    #[test]
    fn test_tree_round_trip_preserves_graph() {
        let graph = sample_graph();
        let bytes = HistoryTree::from_graph(&graph).expect("tree").to_bytes().expect("encode");
        let restored = HistoryTree::from_bytes(&bytes)
            .expect("decode")
            .into_graph(Direction::Undo, env())
            .expect("rebuild");

        assert_eq!(summary(&restored), summary(&graph));
        assert_eq!(restored.created(), graph.created());
        assert_eq!(restored.anchors().len(), 1);
        assert_eq!(restored.find_changeset(2).map(Changeset::author), Some("bob"));
        restored.validate().expect("valid");
    }

    #[test]
    fn test_parents_are_numbered_attributes() {
        let graph = sample_graph();
        let tree = HistoryTree::from_graph(&graph).expect("tree");
        let value: serde_json::Value = serde_json::from_slice(&tree.to_bytes().expect("encode")).expect("json");

        let second = &value["changesets"][1];
        assert_eq!(second["parent1"], serde_json::json!(1));
        assert!(second.get("children").is_none());
        assert_eq!(value["authors"], serde_json::json!(["alice", "bob"]));
        assert_eq!(second["author"], serde_json::json!(1));
        assert_eq!(value["direction"], serde_json::json!("undo"));

        let moved = &value["changesets"][2]["edits"][0];
        assert_eq!(moved["kind"], serde_json::json!("MovedString"));
        assert_eq!(moved["movedStart"], serde_json::json!([0, 0]));
    }

    #[test]
    fn test_next_id_continues_after_load() {
        let graph = sample_graph();
        let tree = HistoryTree::from_graph(&graph).expect("tree");
        let mut restored = tree.into_graph(Direction::Undo, env()).expect("rebuild");

        let id = restored
            .add_changeset(vec![Edit::added_string(Position::point(9, 0), "z")], "carol", at(3), "", 0, true)
            .expect("add")
            .id();
        assert_eq!(id, 4);
    }

    #[test]
    fn test_missing_parent_is_consistency_error() {
        let mut tree = HistoryTree::from_graph(&sample_graph()).expect("tree");
        tree.changesets[1].parents.insert("parent2".to_string(), 77);

        let err = tree.into_graph(Direction::Undo, env()).expect_err("missing parent");
        assert!(err.is_consistency());
        assert!(err.to_string().contains("77"));
    }

    #[test]
    fn test_unknown_attribute_is_fatal() {
        let mut tree = HistoryTree::from_graph(&sample_graph()).expect("tree");
        tree.changesets[0].parents.insert("sibling".to_string(), 2);

        let err = tree.into_graph(Direction::Undo, env()).expect_err("bad attribute");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_newer_version_is_refused() {
        let mut tree = HistoryTree::from_graph(&sample_graph()).expect("tree");
        tree.version += 1;
        assert!(tree.into_graph(Direction::Undo, env()).expect_err("newer").is_fatal());
    }

    #[test]
    fn test_direction_mismatch_is_refused() {
        let tree = HistoryTree::from_graph(&sample_graph()).expect("tree");
        assert!(tree.into_graph(Direction::Redo, env()).expect_err("wrong direction").is_consistency());
    }

    #[test]
    fn test_duplicate_ids_are_refused() {
        let mut tree = HistoryTree::from_graph(&sample_graph()).expect("tree");
        tree.changesets[2].id = 1;
        tree.changesets[2].parents.clear();
        assert!(tree.into_graph(Direction::Undo, env()).expect_err("duplicate").is_consistency());
    }

    #[test]
    fn test_shapes_are_rebuilt_through_catalog() {
        let node = EditNode {
            kind: EditKind::ObjectInserted,
            start: [1, 0],
            end: [1, 0],
            anchor: None,
            cell: None,
            moved_start: None,
            moved_end: None,
            moved_anchor: None,
            moved_cell: None,
            text: None,
            table: None,
            frame: None,
            shape: Some(ShapePayload {
                name: "Chart 1".to_string(),
                shape_kind: "chart".to_string(),
                geometry: Geometry::default(),
                style: BTreeMap::new(),
                object: Some("Object 1".to_string()),
            }),
        };

        let edit = node.clone().into_edit(&Environment::with_builtins()).expect("known kind");
        assert_eq!(edit.entity(), Some("Object 1"));

        let bare = Environment::default();
        assert!(matches!(
            node.into_edit(&bare),
            Err(GraphError::UnknownShape(kind)) if kind == "chart"
        ));
    }

    #[test]
    fn test_missing_text_payload_is_rejected() {
        let mut node = EditNode::from_edit(&Edit::added_string(Position::span(0, 0, 0, 1), "a"));
        node.text = None;
        assert!(matches!(
            node.into_edit(&Environment::with_builtins()),
            Err(GraphError::PayloadMismatch { kind: EditKind::AddedString })
        ));
    }

    #[test]
    fn test_load_missing_part_is_recoverable() {
        let dir = TempDir::new().expect("temp dir");
        let container = RedbContainer::open(&dir.path().join("doc.redb")).expect("open");

        let err = RevisionGraph::load(&container, Direction::Undo, env()).expect_err("missing");
        assert!(err.is_recoverable());

        let graph = RevisionGraph::load_or_new(&container, Direction::Undo, env()).expect("fallback");
        assert!(graph.is_empty());
    }

    #[test]
    fn test_corrupt_part_is_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let container = RedbContainer::open(&dir.path().join("doc.redb")).expect("open");
        container.write_part("undo", b"<not json>").expect("write");

        let err = RevisionGraph::load_or_new(&container, Direction::Undo, env()).expect_err("corrupt");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_save_registers_part_once() {
        let dir = TempDir::new().expect("temp dir");
        let container = RedbContainer::open(&dir.path().join("doc.redb")).expect("open");
        let graph = sample_graph();

        graph.save(&container).expect("save");
        graph.save(&container).expect("save again");

        let manifest = container.manifest().expect("manifest");
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].part, "undo");
        assert_eq!(manifest[0].media_type, graph.environment().config.media_type);

        let loaded = RevisionGraph::load(&container, Direction::Undo, env()).expect("load");
        assert_eq!(summary(&loaded), summary(&graph));
    }
}
