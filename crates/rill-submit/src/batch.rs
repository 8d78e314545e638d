//! Extension points of the external transaction framework.
//!
//! One integration request executes as three phases, invoked in order,
//! exactly once each: repository writes, review-metadata writes, then
//! side-effecting notifications. The framework owns ref updates and
//! retry-on-contention; operations implemented here must tolerate being
//! re-run from scratch against a freshly read tip.

use rill_store::BufferedInserter;
use rill_types::{ChangeId, Identity, ObjectId, PatchSetId};

use crate::error::SubmitResult;

/// Read-only access to the repository's refs.
pub trait RefReader {
    /// Canonical names of all refs starting with `prefix`.
    fn refs_with_prefix(&self, prefix: &str) -> SubmitResult<Vec<String>>;
}

/// Review metadata persistence, written during the metadata phase.
pub trait ReviewStore {
    /// The patch set of `change` whose commit is `commit`, with its
    /// reviewer groups, if any.
    fn find_patch_set(
        &self,
        change: ChangeId,
        commit: &ObjectId,
    ) -> SubmitResult<Option<(PatchSetId, Vec<String>)>>;

    /// Persist a new patch set.
    fn insert_patch_set(
        &mut self,
        id: PatchSetId,
        commit: ObjectId,
        description: &str,
        groups: Vec<String>,
    ) -> SubmitResult<()>;

    /// Record an informational message on the change.
    fn add_message(&mut self, change: ChangeId, message: &str) -> SubmitResult<()>;
}

/// Receiver for events emitted after the transaction commits.
pub trait EventSink {
    fn revision_created(&mut self, patch_set: PatchSetId, commit: ObjectId);
}

/// Context for the repository phase: object writes buffer in the inserter
/// and are flushed by the framework once the whole transaction holds.
pub struct RepoContext<'a> {
    pub inserter: &'a BufferedInserter<'a>,
    pub refs: &'a dyn RefReader,
    /// The acting identity; its timestamp is the transaction time.
    pub user: Identity,
}

/// Context for the review-metadata phase.
pub struct ChangeContext<'a> {
    pub review: &'a mut dyn ReviewStore,
}

/// Context for the notification phase.
pub struct PostUpdateContext<'a> {
    pub events: &'a mut dyn EventSink,
}

/// A multi-phase operation run by the transaction framework.
pub trait BatchOp {
    /// Phase 1: create repository objects.
    fn update_repo(&mut self, ctx: &mut RepoContext<'_>) -> SubmitResult<()>;

    /// Phase 2: persist review metadata. Returns whether anything changed.
    fn update_change(&mut self, ctx: &mut ChangeContext<'_>) -> SubmitResult<bool>;

    /// Phase 3: emit notifications.
    fn post_update(&mut self, ctx: &mut PostUpdateContext<'_>) -> SubmitResult<()>;
}
