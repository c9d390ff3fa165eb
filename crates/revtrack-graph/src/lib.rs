/// Document revision graph.
///
/// Records every edit made to a structured text document as a timestamped
/// `Changeset`, links changesets that touch overlapping content into a
/// dependency graph, and rebases edit positions across unrelated changesets so
/// history can be inspected or discarded out of chronological order. Graphs
/// are persisted as one tree per direction inside a document container.
pub mod changeset;
pub mod config;
pub mod container;
pub mod edit;
pub mod env;
pub mod error;
pub mod graph;
pub mod position;
pub mod rebase;
pub mod tree;

pub use changeset::{Changeset, Timestamp};
pub use config::GraphConfig;
pub use container::{Container, ManifestEntry, RedbContainer};
pub use edit::{detect_moves, Edit, EditKind, EditPayload};
pub use env::{Environment, ShapeCatalog};
pub use error::{GraphError, Result};
pub use graph::{CancelFlag, Direction, RevisionGraph, Scope};
pub use position::{AnchorTable, CellId, Position, PositionId, PositionOrder, TextPoint};
pub use rebase::{rebase, rebase_edit, rebase_edits, Rebased};
pub use tree::HistoryTree;
