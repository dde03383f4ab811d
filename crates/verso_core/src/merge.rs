//! Three-way merge conflict model.
//!
//! When two branches of an artifact diverge, the UI needs the two tips, their
//! most recent common ancestor, and the list of conflicts to walk the user
//! through. This module only carries that data; producing the conflicts is
//! the job of whatever differ the caller uses.
//!
//! The common ancestor is assumed to be an ancestor of both source and
//! target. Nothing here checks it.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::change_id::{ChangeId, CommitId};

/// Everything the UI needs to present and resolve a three-way merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MergeConflictInfo<C> {
    /// Tip of the branch being merged in.
    #[ts(type = "string[] | string")]
    pub source_commit_id: ChangeId,

    /// Tip of the branch being merged into.
    #[ts(type = "string[] | string")]
    pub target_commit_id: ChangeId,

    /// Most recent common ancestor of source and target.
    #[ts(type = "string[] | string")]
    pub common_ancestor_commit_id: ChangeId,

    /// Unresolved conflicts, in presentation order.
    pub conflicts: Vec<C>,
}

impl<C> MergeConflictInfo<C> {
    /// Create a merge description.
    pub fn new(
        source_commit_id: ChangeId,
        target_commit_id: ChangeId,
        common_ancestor_commit_id: ChangeId,
        conflicts: Vec<C>,
    ) -> Self {
        Self {
            source_commit_id,
            target_commit_id,
            common_ancestor_commit_id,
            conflicts,
        }
    }

    /// Number of unresolved conflicts.
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Whether anything still needs the user's attention.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Whether this is really a fast-forward: the ancestor is one of the tips.
    pub fn is_trivial(&self) -> bool {
        self.common_ancestor_commit_id == self.source_commit_id
            || self.common_ancestor_commit_id == self.target_commit_id
    }

    /// Whether any side is the uncommitted working state.
    pub fn involves_uncommitted(&self) -> bool {
        self.ids().into_iter().any(ChangeId::is_uncommitted)
    }

    /// Whether all three ids come from the same substrate.
    ///
    /// The working state counts as compatible with either substrate.
    pub fn is_same_substrate(&self) -> bool {
        let commits: Vec<&CommitId> = self
            .ids()
            .into_iter()
            .filter_map(ChangeId::as_commit)
            .collect();
        let heads = commits
            .iter()
            .filter(|c| matches!(c, CommitId::Heads(_)))
            .count();
        heads == 0 || heads == commits.len()
    }

    /// Mark the conflict at `index` resolved, returning it.
    ///
    /// Out-of-range indexes are ignored.
    pub fn resolve_conflict(&mut self, index: usize) -> Option<C> {
        if index < self.conflicts.len() {
            Some(self.conflicts.remove(index))
        } else {
            log::warn!(
                "Ignoring resolution of conflict {} of {}",
                index,
                self.conflicts.len()
            );
            None
        }
    }

    /// True once every conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.conflicts.is_empty()
    }

    fn ids(&self) -> [&ChangeId; 3] {
        [
            &self.source_commit_id,
            &self.target_commit_id,
            &self.common_ancestor_commit_id,
        ]
    }
}
