/// The revision graph: changesets linked by the content they depend on.
///
/// Each changeset is indexed by its unique timestamp and by its id. A parent
/// edge `a -> b` means some edit of `b` touches content an edit of `a` touched,
/// and `a` comes first in the graph's direction. Edges are repaired locally on
/// every insertion and removal rather than recomputed for the whole graph.
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::changeset::{Changeset, Timestamp};
use crate::edit::Edit;
use crate::env::Environment;
use crate::error::{GraphError, Result};
use crate::position::{AnchorTable, Position, PositionId};
use crate::rebase::{rebase_edits, Rebased};

/// Which history a graph records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Undo,
    Redo,
}

impl Direction {
    /// Whether a changeset stamped `a` comes before one stamped `b`, and so
    /// may be its parent.
    ///
    /// Undo history runs oldest to newest; redo history runs the other way.
    pub fn precedes(self, a: Timestamp, b: Timestamp) -> bool {
        match self {
            Self::Undo => a < b,
            Self::Redo => a > b,
        }
    }
}

/// Which changesets `reconcile_against` compares with, by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Earlier,
    Later,
    All,
}

/// Cooperative cancellation for bulk commits.
///
/// Checked between changeset insertions only; an insertion that has started
/// always completes so edges stay mirrored.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Changesets of one document and one direction, with their dependency edges.
///
/// Not internally synchronized: callers serialize access, e.g. behind a
/// `Mutex`, and must not commit from several threads at once.
pub struct RevisionGraph {
    direction: Direction,
    env: Arc<Environment>,
    changesets: HashMap<Timestamp, Changeset>,
    timestamps_by_id: HashMap<u64, Timestamp>,
    /// Strictly ascending; same element set as `changesets`' keys.
    sorted_timestamps: Vec<Timestamp>,
    /// Next id to assign. Ids start at 1; 0 means "no changeset".
    next_id: u64,
    anchors: AnchorTable,
    created: Timestamp,
}

impl std::fmt::Debug for RevisionGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionGraph")
            .field("direction", &self.direction)
            .field("changesets", &self.changesets.len())
            .field("anchors", &self.anchors.len())
            .field("next_id", &self.next_id)
            .field("created", &self.created)
            .finish()
    }
}

impl RevisionGraph {
    /// Creates an empty graph.
    pub fn new(direction: Direction, env: Arc<Environment>) -> Self {
        Self {
            direction,
            env,
            changesets: HashMap::new(),
            timestamps_by_id: HashMap::new(),
            sorted_timestamps: Vec::new(),
            next_id: 1,
            anchors: AnchorTable::new(),
            created: Utc::now(),
        }
    }

    /// Rebuilds a graph from changesets read back from storage.
    ///
    /// Each changeset carries its parent ids; children are derived here in a
    /// single pass from newest to oldest.
    pub(crate) fn from_records(
        direction: Direction,
        env: Arc<Environment>,
        created: Timestamp,
        anchors: AnchorTable,
        records: Vec<Changeset>,
    ) -> Result<Self> {
        let mut graph = Self::new(direction, env);
        graph.created = created;
        graph.anchors = anchors;

        let mut max_id = 0;
        for record in records {
            if record.id == 0 {
                return Err(GraphError::Consistency("changeset id 0 is reserved".to_string()));
            }
            if graph.timestamps_by_id.contains_key(&record.id) {
                return Err(GraphError::Consistency(format!(
                    "changeset id {} stored twice",
                    record.id
                )));
            }
            if graph.changesets.contains_key(&record.timestamp()) {
                return Err(GraphError::Consistency(format!(
                    "timestamp {} stored twice",
                    record.timestamp()
                )));
            }
            max_id = max_id.max(record.id);
            graph.insert_indexed(record);
        }
        graph.next_id = max_id
            .checked_add(1)
            .ok_or(GraphError::Exhausted("changeset ids"))?;

        let newest_first: Vec<Timestamp> = graph.sorted_timestamps.iter().rev().copied().collect();
        for ts in newest_first {
            let child = graph.changeset_at(ts)?;
            let (child_id, parents) = (child.id, child.parents().clone());
            for parent_id in parents {
                let parent_ts = graph.timestamps_by_id.get(&parent_id).copied().ok_or_else(|| {
                    GraphError::Consistency(format!(
                        "changeset {child_id} references missing parent {parent_id}"
                    ))
                })?;
                graph.changeset_at_mut(parent_ts)?.add_child(child_id);
            }
        }

        Ok(graph)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    /// When the graph was first created; preserved across save and load.
    pub fn created(&self) -> Timestamp {
        self.created
    }

    pub fn anchors(&self) -> &AnchorTable {
        &self.anchors
    }

    /// Registers a container position (table cell, frame, embedded object)
    /// that edit positions can anchor to.
    pub fn register_anchor(&mut self, position: Position) -> Result<PositionId> {
        self.anchors.register(position)
    }

    /// Number of changesets in the graph.
    pub fn current_revision_count(&self) -> usize {
        self.changesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Timestamps of all changesets, oldest first.
    pub fn sorted_timestamps(&self) -> &[Timestamp] {
        &self.sorted_timestamps
    }

    /// All changesets, oldest first.
    pub fn changesets(&self) -> impl Iterator<Item = &Changeset> {
        self.sorted_timestamps
            .iter()
            .filter_map(|ts| self.changesets.get(ts))
    }

    pub fn get_changeset(&self, timestamp: Timestamp) -> Option<&Changeset> {
        self.changesets.get(&timestamp)
    }

    /// Looks a changeset up by its revision id.
    pub fn find_changeset(&self, revision: u64) -> Option<&Changeset> {
        self.timestamps_by_id
            .get(&revision)
            .and_then(|ts| self.changesets.get(ts))
    }

    /// The changesets stamped with the given timestamps, in the given order.
    /// Unknown timestamps are skipped.
    pub fn get_changeset_list(&self, timestamps: &[Timestamp]) -> Vec<&Changeset> {
        timestamps
            .iter()
            .filter_map(|ts| self.changesets.get(ts))
            .collect()
    }

    /// Every changeset stamped at or after `timestamp`, oldest first.
    pub fn changesets_since(&self, timestamp: Timestamp) -> Vec<&Changeset> {
        let start = self.sorted_timestamps.partition_point(|ts| *ts < timestamp);
        self.get_changeset_list(&self.sorted_timestamps[start..])
    }

    /// The most recently stamped changeset.
    pub fn latest(&self) -> Option<&Changeset> {
        self.sorted_timestamps
            .last()
            .and_then(|ts| self.changesets.get(ts))
    }

    pub fn parents_of(&self, id: u64) -> Result<Vec<&Changeset>> {
        let changeset = self.changeset_by_id(id)?;
        changeset
            .parents()
            .iter()
            .map(|parent| self.changeset_by_id(*parent))
            .collect()
    }

    pub fn children_of(&self, id: u64) -> Result<Vec<&Changeset>> {
        let changeset = self.changeset_by_id(id)?;
        changeset
            .children()
            .iter()
            .map(|child| self.changeset_by_id(*child))
            .collect()
    }

    /// Commits a batch of edits as a new changeset.
    ///
    /// `parent_id == 0` means no explicit parent; the most recent changeset is
    /// then the provisional parent. With `merge`, parents are computed by
    /// overlap analysis in this graph's direction (an explicit parent is kept,
    /// a provisional one is replaced) and the new changeset's neighbors are
    /// repaired. Without `merge`, the provisional or explicit parent is kept
    /// and every overlapping changeset becomes a parent regardless of time.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTimestamp` if the timestamp is taken, or
    /// `UnknownChangeset` if `parent_id` names no changeset.
    pub fn add_changeset(
        &mut self,
        edits: Vec<Edit>,
        author: &str,
        timestamp: Timestamp,
        comment: &str,
        parent_id: u64,
        merge: bool,
    ) -> Result<&Changeset> {
        if self.changesets.contains_key(&timestamp) {
            return Err(GraphError::DuplicateTimestamp(timestamp));
        }
        if parent_id != 0 && !self.timestamps_by_id.contains_key(&parent_id) {
            return Err(GraphError::UnknownChangeset(parent_id));
        }

        let provisional_parent = match parent_id {
            0 => self.latest().map(Changeset::id),
            explicit => Some(explicit),
        };

        let mut changeset = Changeset::new(timestamp, author, comment, edits);
        changeset.id = self.allocate_id()?;
        let id = changeset.id;
        self.insert_indexed(changeset);

        if merge {
            self.find_parents(id, true)?;
            if parent_id != 0 {
                self.link(parent_id, id)?;
            }
            self.repair_neighbors(id)?;
        } else {
            if let Some(parent) = provisional_parent {
                self.link(parent, id)?;
            }
            self.find_parents(id, false)?;
        }

        let changeset = self.changeset_at(timestamp)?;
        tracing::debug!(
            id,
            direction = ?self.direction,
            parents = ?changeset.parents(),
            edits = changeset.edits().len(),
            "Committed changeset"
        );
        Ok(changeset)
    }

    /// Inserts a detached changeset whose timestamp may be older than
    /// changesets already in the graph.
    ///
    /// Later changesets that do not depend on it have their positions
    /// corrected to include its edits; those that do depend on it become its
    /// children. Parent ids already set on `changeset` are kept as explicit
    /// edges. Returns the assigned id.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTimestamp` if the timestamp is taken, or
    /// `UnknownChangeset` if a preset parent id names no changeset.
    pub fn add_changeset_node_with_correction(&mut self, mut changeset: Changeset) -> Result<u64> {
        let timestamp = changeset.timestamp();
        if self.changesets.contains_key(&timestamp) {
            return Err(GraphError::DuplicateTimestamp(timestamp));
        }
        let explicit_parents = changeset.clear_parents();
        if let Some(missing) = explicit_parents
            .iter()
            .find(|id| !self.timestamps_by_id.contains_key(id))
        {
            return Err(GraphError::UnknownChangeset(*missing));
        }
        changeset.clear_children();
        changeset.id = self.allocate_id()?;
        let id = changeset.id;
        self.insert_indexed(changeset);

        for parent in explicit_parents {
            self.link(parent, id)?;
        }
        let first_dependent = self.correct_later(id)?;
        self.find_parents(id, true)?;
        self.repair_neighbors(id)?;
        // linked after the repair, which rebuilds sibling parent sets
        if let Some(dependent) = first_dependent {
            self.link_in_direction(id, dependent)?;
        }

        tracing::debug!(id, ?first_dependent, "Inserted changeset with correction");
        Ok(id)
    }

    /// Commits changesets one by one, stopping early if `cancel` is raised.
    ///
    /// Uses `add_changeset_node_with_correction` when the environment's
    /// `merge_on_commit` is set, otherwise appends without merging.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` with the number of changesets already committed if
    /// the flag was raised, or the first insertion error.
    pub fn commit_all(
        &mut self,
        changesets: impl IntoIterator<Item = Changeset>,
        cancel: &CancelFlag,
    ) -> Result<Vec<u64>> {
        let merge = self.env.config.merge_on_commit;
        let mut committed = Vec::new();
        for changeset in changesets {
            if cancel.is_cancelled() {
                tracing::info!(committed = committed.len(), "Bulk commit cancelled");
                return Err(GraphError::Cancelled {
                    committed: committed.len(),
                });
            }
            let id = if merge {
                self.add_changeset_node_with_correction(changeset)?
            } else {
                let (timestamp, author, comment, edits) = changeset.into_parts();
                self.add_changeset(edits, &author, timestamp, &comment, 0, false)?
                    .id()
            };
            committed.push(id);
        }
        Ok(committed)
    }

    /// Removes a changeset and returns it, detached.
    ///
    /// The changeset disappears from the dated index and from its parents'
    /// children. Its former children lose it as a parent and have their
    /// parents recomputed immediately, so edges stay mirrored after every
    /// removal. With `clear_edits`, the returned changeset's edits are dropped.
    pub fn remove_changeset(&mut self, id: u64, clear_edits: bool) -> Result<Changeset> {
        let timestamp = self
            .timestamps_by_id
            .get(&id)
            .copied()
            .ok_or(GraphError::UnknownChangeset(id))?;
        let mut removed = self.changesets.remove(&timestamp).ok_or_else(|| {
            GraphError::Consistency(format!("changeset {id} is indexed but missing"))
        })?;
        self.timestamps_by_id.remove(&id);
        if let Ok(index) = self.sorted_timestamps.binary_search(&timestamp) {
            self.sorted_timestamps.remove(index);
        }

        for parent in removed.clear_parents() {
            self.changeset_by_id_mut(parent)?.remove_child(id);
        }
        let orphans: Vec<u64> = removed.children().iter().copied().collect();
        removed.clear_children();
        for child in &orphans {
            self.changeset_by_id_mut(*child)?.remove_parent_id(id);
        }
        for child in &orphans {
            self.detach_parents(*child)?;
            self.find_parents(*child, true)?;
        }

        if clear_edits {
            removed.clear_edits();
        }
        tracing::debug!(id, repaired = ?orphans, "Removed changeset");
        Ok(removed)
    }

    /// Removes the changeset stamped `timestamp`, keeping its edits.
    pub fn pop_changeset(&mut self, timestamp: Timestamp) -> Result<Changeset> {
        let id = self
            .changesets
            .get(&timestamp)
            .map(Changeset::id)
            .ok_or(GraphError::UnknownTimestamp(timestamp))?;
        self.remove_changeset(id, false)
    }

    /// Records a parent edge from every changeset that `id` depends on.
    ///
    /// Every edit of `id` is compared with every edit of every other
    /// changeset. With `merge`, only changesets that precede `id` in this
    /// graph's direction are considered.
    pub fn find_parents(&mut self, id: u64, merge: bool) -> Result<()> {
        let changeset = self.changeset_by_id(id)?;
        let timestamp = changeset.timestamp();

        let mut found = Vec::new();
        for other_ts in &self.sorted_timestamps {
            if *other_ts == timestamp {
                continue;
            }
            if merge && !self.direction.precedes(*other_ts, timestamp) {
                continue;
            }
            let other = self.changeset_at(*other_ts)?;
            if changeset.children().contains(&other.id) {
                continue;
            }
            if self.depends_on(changeset, other)? {
                found.push(other.id);
            }
        }

        for parent in found {
            self.link(parent, id)?;
        }
        Ok(())
    }

    /// Recomputes the parents of every sibling of `id`.
    ///
    /// A sibling is any other child of one of `id`'s parents. Each sibling
    /// loses all its parents and gets them back from `find_parents`, which lets
    /// a changeset inserted between a parent and its children slot in.
    /// Edges further away are not revisited.
    pub fn repair_neighbors(&mut self, id: u64) -> Result<()> {
        let mut siblings = BTreeSet::new();
        for parent in self.parents_of(id)? {
            siblings.extend(parent.children().iter().copied().filter(|child| *child != id));
        }

        for sibling in siblings {
            self.detach_parents(sibling)?;
            self.find_parents(sibling, true)?;
            tracing::debug!(
                sibling,
                parents = ?self.changeset_by_id(sibling)?.parents(),
                "Repaired neighbor"
            );
        }
        Ok(())
    }

    /// Compares `id` with the changesets in `scope` by rebasing edits across
    /// them one changeset at a time, nearest first.
    ///
    /// Returns the first changeset found to be dependent. For `Earlier`, the
    /// edits of `id` are rebased back through older changesets. For `Later`,
    /// each newer changeset is rebased back through the changesets between it
    /// and `id`, then checked against `id`. With `for_add`, the dependency
    /// found is linked. Edit positions are never modified, so the call can be
    /// repeated to re-validate a graph.
    pub fn reconcile_against(&mut self, id: u64, scope: Scope, for_add: bool) -> Result<Option<u64>> {
        match scope {
            Scope::Earlier => self.reconcile_earlier(id, for_add),
            Scope::Later => self.reconcile_later(id, for_add),
            Scope::All => {
                let earlier = self.reconcile_earlier(id, for_add)?;
                let later = self.reconcile_later(id, for_add)?;
                Ok(earlier.or(later))
            }
        }
    }

    /// Checks every structural invariant of the graph.
    ///
    /// # Errors
    ///
    /// Returns a consistency error describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        if !self.sorted_timestamps.windows(2).all(|w| w[0] < w[1]) {
            return Err(GraphError::Consistency("timestamps are not strictly ascending".to_string()));
        }
        if self.sorted_timestamps.len() != self.changesets.len()
            || self.timestamps_by_id.len() != self.changesets.len()
        {
            return Err(GraphError::Consistency("indexes disagree on changeset count".to_string()));
        }

        for changeset in self.changesets() {
            if self.timestamps_by_id.get(&changeset.id) != Some(&changeset.timestamp()) {
                return Err(GraphError::Consistency(format!(
                    "changeset {} is not indexed by id",
                    changeset.id
                )));
            }
            for parent in changeset.parents() {
                if !self.changeset_by_id(*parent)?.children().contains(&changeset.id) {
                    return Err(GraphError::Consistency(format!(
                        "{parent} is a parent of {} but does not list it as a child",
                        changeset.id
                    )));
                }
            }
            for child in changeset.children() {
                if !self.changeset_by_id(*child)?.parents().contains(&changeset.id) {
                    return Err(GraphError::Consistency(format!(
                        "{child} is a child of {} but does not list it as a parent",
                        changeset.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn reconcile_earlier(&mut self, id: u64, for_add: bool) -> Result<Option<u64>> {
        let changeset = self.changeset_by_id(id)?;
        let mut working = changeset.edits().to_vec();
        let end = self
            .sorted_timestamps
            .partition_point(|ts| *ts < changeset.timestamp());
        let candidates: Vec<Timestamp> = self.sorted_timestamps[..end].iter().rev().copied().collect();

        for candidate_ts in candidates {
            let candidate = self.changeset_at(candidate_ts)?;
            let candidate_id = candidate.id;
            match rebase_edits(&working, candidate.edits(), false, &self.anchors)? {
                Rebased::Shifted(edits) => working = edits,
                Rebased::Dependent => {
                    if for_add {
                        self.link_in_direction(candidate_id, id)?;
                    }
                    return Ok(Some(candidate_id));
                }
            }
        }
        Ok(None)
    }

    fn reconcile_later(&mut self, id: u64, for_add: bool) -> Result<Option<u64>> {
        let changeset = self.changeset_by_id(id)?;
        let start = self
            .sorted_timestamps
            .partition_point(|ts| *ts <= changeset.timestamp());

        let mut found = None;
        for index in start..self.sorted_timestamps.len() {
            let candidate = self.changeset_at(self.sorted_timestamps[index])?;
            let mut working = candidate.edits().to_vec();
            // Bring the candidate back to the frame `id` was recorded in.
            let mut reached = true;
            for between_ts in self.sorted_timestamps[start..index].iter().rev() {
                let between = self.changeset_at(*between_ts)?;
                match rebase_edits(&working, between.edits(), false, &self.anchors)? {
                    Rebased::Shifted(edits) => working = edits,
                    Rebased::Dependent => {
                        reached = false;
                        break;
                    }
                }
            }
            if reached && rebase_edits(&working, changeset.edits(), false, &self.anchors)?.is_dependent() {
                found = Some(candidate.id);
                break;
            }
        }

        if let (Some(dependent), true) = (found, for_add) {
            self.link_in_direction(id, dependent)?;
        }
        Ok(found)
    }

    /// Moves later changesets into the frame that includes the edits of `id`,
    /// which was inserted after them out of chronological order.
    ///
    /// Independent later changesets store their corrected positions and are
    /// flagged `corrected`. Stops at the first later changeset that depends on
    /// `id` and returns it, unlinked.
    fn correct_later(&mut self, id: u64) -> Result<Option<u64>> {
        let changeset = self.changeset_by_id(id)?;
        // The edits of `id`, carried forward into each later changeset's frame.
        let mut working = changeset.edits().to_vec();
        let start = self
            .sorted_timestamps
            .partition_point(|ts| *ts <= changeset.timestamp());
        let candidates: Vec<Timestamp> = self.sorted_timestamps[start..].to_vec();

        for candidate_ts in candidates {
            let candidate = self.changeset_at(candidate_ts)?;
            let candidate_id = candidate.id;
            let corrected = rebase_edits(candidate.edits(), &working, true, &self.anchors)?;
            let advanced = rebase_edits(&working, candidate.edits(), true, &self.anchors)?;

            let Rebased::Shifted(edits) = corrected else {
                return Ok(Some(candidate_id));
            };
            let candidate = self.changeset_by_id_mut(candidate_id)?;
            if candidate.edits != edits {
                candidate.edits = edits;
                candidate.corrected = true;
            }
            match advanced {
                Rebased::Shifted(edits) => working = edits,
                Rebased::Dependent => break,
            }
        }
        Ok(None)
    }

    /// Whether any edit of `a` touches content or an entity an edit of `b`
    /// touches, directly or once rebased across `b` in either direction.
    fn depends_on(&self, a: &Changeset, b: &Changeset) -> Result<bool> {
        for edit_a in a.edits() {
            for edit_b in b.edits() {
                if edit_a.same_entity(edit_b) {
                    return Ok(true);
                }
                for pos_a in edit_a.positions() {
                    for pos_b in edit_b.positions() {
                        if self.anchors.overlaps(pos_a, pos_b)? {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        for forward in [true, false] {
            if rebase_edits(a.edits(), b.edits(), forward, &self.anchors)?.is_dependent() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn allocate_id(&mut self) -> Result<u64> {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or(GraphError::Exhausted("changeset ids"))?;
        Ok(id)
    }

    fn insert_indexed(&mut self, changeset: Changeset) {
        let timestamp = changeset.timestamp();
        let index = self.sorted_timestamps.partition_point(|ts| *ts < timestamp);
        self.sorted_timestamps.insert(index, timestamp);
        self.timestamps_by_id.insert(changeset.id, timestamp);
        self.changesets.insert(timestamp, changeset);
    }

    fn link(&mut self, parent: u64, child: u64) -> Result<()> {
        self.changeset_by_id_mut(parent)?.add_child(child);
        self.changeset_by_id_mut(child)?.add_parent_id(parent);
        Ok(())
    }

    /// Links two dependent changesets so that whichever comes first in this
    /// graph's direction is the parent.
    fn link_in_direction(&mut self, a: u64, b: u64) -> Result<()> {
        let ts_a = self.changeset_by_id(a)?.timestamp();
        let ts_b = self.changeset_by_id(b)?.timestamp();
        if self.direction.precedes(ts_a, ts_b) {
            self.link(a, b)
        } else {
            self.link(b, a)
        }
    }

    /// Clears the parents of `id`, unlinking it from each of them.
    fn detach_parents(&mut self, id: u64) -> Result<()> {
        for parent in self.changeset_by_id_mut(id)?.clear_parents() {
            self.changeset_by_id_mut(parent)?.remove_child(id);
        }
        Ok(())
    }

    fn changeset_at(&self, timestamp: Timestamp) -> Result<&Changeset> {
        self.changesets.get(&timestamp).ok_or_else(|| {
            GraphError::Consistency(format!("timestamp {timestamp} is indexed but missing"))
        })
    }

    fn changeset_at_mut(&mut self, timestamp: Timestamp) -> Result<&mut Changeset> {
        self.changesets.get_mut(&timestamp).ok_or_else(|| {
            GraphError::Consistency(format!("timestamp {timestamp} is indexed but missing"))
        })
    }

    fn changeset_by_id(&self, id: u64) -> Result<&Changeset> {
        let timestamp = self
            .timestamps_by_id
            .get(&id)
            .copied()
            .ok_or(GraphError::UnknownChangeset(id))?;
        self.changeset_at(timestamp)
    }

    fn changeset_by_id_mut(&mut self, id: u64) -> Result<&mut Changeset> {
        let timestamp = self
            .timestamps_by_id
            .get(&id)
            .copied()
            .ok_or(GraphError::UnknownChangeset(id))?;
        self.changeset_at_mut(timestamp)
    }
}
