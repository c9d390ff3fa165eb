/// A batch of edits committed together, and its place in the revision graph.
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::edit::Edit;

/// Commit time of a changeset. Unique within a graph.
pub type Timestamp = DateTime<Utc>;

/// A group of edits from one editing session that undo/redo as a unit.
///
/// `parents` and `children` hold graph ids. Inside a `RevisionGraph` the two
/// sets are kept mirrored: `b` is a child of `a` exactly when `a` is a parent
/// of `b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    /// Assigned by the graph on insertion; 0 until then.
    pub(crate) id: u64,
    timestamp: Timestamp,
    author: String,
    comment: String,
    pub(crate) edits: Vec<Edit>,
    parents: BTreeSet<u64>,
    children: BTreeSet<u64>,
    /// Set once any edit position was rebased after recording.
    pub(crate) corrected: bool,
}

impl Changeset {
    /// Creates a detached changeset, not yet part of any graph.
    pub fn new(
        timestamp: Timestamp,
        author: impl Into<String>,
        comment: impl Into<String>,
        edits: Vec<Edit>,
    ) -> Self {
        Self {
            id: 0,
            timestamp,
            author: author.into(),
            comment: comment.into(),
            edits,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            corrected: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn parents(&self) -> &BTreeSet<u64> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<u64> {
        &self.children
    }

    pub fn is_corrected(&self) -> bool {
        self.corrected
    }

    pub fn add_parent_id(&mut self, id: u64) {
        self.parents.insert(id);
    }

    pub fn remove_parent_id(&mut self, id: u64) {
        self.parents.remove(&id);
    }

    pub fn add_child(&mut self, id: u64) {
        self.children.insert(id);
    }

    pub fn remove_child(&mut self, id: u64) {
        self.children.remove(&id);
    }

    /// Drops every parent id, returning the ids that were removed.
    pub fn clear_parents(&mut self) -> BTreeSet<u64> {
        std::mem::take(&mut self.parents)
    }

    pub(crate) fn into_parts(self) -> (Timestamp, String, String, Vec<Edit>) {
        (self.timestamp, self.author, self.comment, self.edits)
    }

    pub(crate) fn clear_children(&mut self) {
        self.children.clear();
    }

    pub(crate) fn clear_edits(&mut self) {
        self.edits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use chrono::TimeZone;

    fn sample() -> Changeset {
        Changeset::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            "alice",
            "fix typo",
            vec![Edit::added_string(Position::span(0, 0, 0, 2), "hi")],
        )
    }

    #[test]
    fn test_new_changeset_is_detached() {
        let cs = sample();
        assert_eq!(cs.id(), 0);
        assert_eq!(cs.author(), "alice");
        assert_eq!(cs.comment(), "fix typo");
        assert_eq!(cs.edits().len(), 1);
        assert!(cs.parents().is_empty());
        assert!(cs.children().is_empty());
        assert!(!cs.is_corrected());
    }

    #[test]
    fn test_parent_and_child_sets() {
        let mut cs = sample();
        cs.add_parent_id(3);
        cs.add_parent_id(1);
        cs.add_parent_id(3);
        cs.add_child(7);
        cs.add_child(9);
        cs.remove_child(7);

        assert_eq!(cs.parents().iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(cs.children().iter().copied().collect::<Vec<_>>(), vec![9]);

        let cleared = cs.clear_parents();
        assert_eq!(cleared.len(), 2);
        assert!(cs.parents().is_empty());
    }
}
