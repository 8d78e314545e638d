use std::collections::HashMap;

use rill_types::ObjectId;
use tracing::debug;

/// Outcome classification for one commit within a single integration pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitStatus {
    /// Merged without manual intervention.
    CleanMerge,
    /// Was already an ancestor of the destination tip.
    AlreadyMerged,
    /// The merge hit path conflicts.
    PathConflict,
    /// The merge base could not be computed automatically; a manual
    /// recursive merge is needed.
    ManualRecursiveMerge,
    /// A prerequisite commit is missing from the candidate set and the
    /// destination history.
    MissingDependency,
    /// The commit itself could not be resolved in the store.
    RevisionGone,
}

impl CommitStatus {
    /// Whether the commit ended up in the branch history.
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::CleanMerge | Self::AlreadyMerged)
    }
}

impl std::fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CleanMerge => "clean merge",
            Self::AlreadyMerged => "already merged",
            Self::PathConflict => "path conflict",
            Self::ManualRecursiveMerge => "manual recursive merge required",
            Self::MissingDependency => "missing dependency",
            Self::RevisionGone => "revision gone",
        };
        f.write_str(s)
    }
}

/// Per-pass status side table.
///
/// Commits are immutable, so pass-scoped state lives here instead of on
/// the commit values. A status is assigned at most once: the first
/// assignment wins and later attempts are ignored. The ledger is discarded
/// with the pass; nothing in it is persisted.
#[derive(Debug, Default)]
pub struct StatusLedger {
    statuses: HashMap<ObjectId, CommitStatus>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a status. Returns `false` (and changes nothing) if the
    /// commit already has one.
    pub fn mark(&mut self, commit: ObjectId, status: CommitStatus) -> bool {
        match self.statuses.entry(commit) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                debug!(commit = %commit.abbrev(), %status, "status assigned");
                slot.insert(status);
                true
            }
        }
    }

    pub fn get(&self, commit: &ObjectId) -> Option<CommitStatus> {
        self.statuses.get(commit).copied()
    }

    pub fn is_marked(&self, commit: &ObjectId) -> bool {
        self.statuses.contains_key(commit)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// All commits carrying the given status.
    pub fn with_status(&self, status: CommitStatus) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .statuses
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}
