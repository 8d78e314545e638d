use rill_merge::MergeStrategyKind;
use rill_store::ObjectStore;
use rill_types::{Identity, ObjectId, PatchSetId};
use tracing::info;

use crate::batch::{BatchOp, ChangeContext, PostUpdateContext, RepoContext};
use crate::candidate::{BranchName, Candidate};
use crate::config::ProjectConfig;
use crate::error::{IntegrateError, SubmitResult};
use crate::message::MessageComposer;
use crate::writer::CommitWriter;

/// A persisted patch set, visible to callers once the metadata phase has
/// run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchSet {
    pub id: PatchSetId,
    pub commit: ObjectId,
}

/// Staged insertion of one new patch set.
///
/// Built during the repository phase, it performs the metadata write in
/// `update_change` and the event emission in `post_update`. Reviewer
/// groups carry forward from the patch set the rebase was based on, when
/// that patch set is resolvable.
pub struct PatchSetInserter {
    patch_set_id: PatchSetId,
    commit: ObjectId,
    description: String,
    message: Option<String>,
    groups_from: Option<ObjectId>,
    fire_revision_created: bool,
    patch_set: Option<PatchSet>,
}

impl PatchSetInserter {
    pub fn new(patch_set_id: PatchSetId, commit: ObjectId) -> Self {
        Self {
            patch_set_id,
            commit,
            description: String::new(),
            message: None,
            groups_from: None,
            fire_revision_created: true,
            patch_set: None,
        }
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    pub fn set_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    /// Carry reviewer groups forward from the patch set whose commit is
    /// `base`, if the review store can resolve one.
    pub fn set_groups_from(&mut self, base: ObjectId) -> &mut Self {
        self.groups_from = Some(base);
        self
    }

    pub fn set_fire_revision_created(&mut self, fire: bool) -> &mut Self {
        self.fire_revision_created = fire;
        self
    }

    pub fn update_change(&mut self, ctx: &mut ChangeContext<'_>) -> SubmitResult<bool> {
        let change = self.patch_set_id.change;
        let groups = match self.groups_from {
            Some(base) => ctx
                .review
                .find_patch_set(change, &base)?
                .map(|(_, groups)| groups)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        ctx.review
            .insert_patch_set(self.patch_set_id, self.commit, &self.description, groups)?;
        if let Some(message) = &self.message {
            ctx.review.add_message(change, message)?;
        }
        self.patch_set = Some(PatchSet {
            id: self.patch_set_id,
            commit: self.commit,
        });
        Ok(true)
    }

    pub fn post_update(&mut self, ctx: &mut PostUpdateContext<'_>) -> SubmitResult<()> {
        if self.fire_revision_created {
            ctx.events.revision_created(self.patch_set_id, self.commit);
        }
        Ok(())
    }

    /// The persisted patch set. Only valid after `update_change`.
    pub fn patch_set(&self) -> SubmitResult<&PatchSet> {
        self.patch_set
            .as_ref()
            .ok_or(IntegrateError::OutOfPhase("patch_set before update_change"))
    }
}

/// Rebase one change onto a new base, as a three-phase batch operation.
///
/// The repository phase resolves the original and the base, rejects an
/// already-up-to-date request, writes the rebased commit, computes the
/// next patch-set number from the change's existing patch-set refs, and
/// stages a [`PatchSetInserter`]. The later phases delegate to the staged
/// inserter. Nothing is flushed here; the framework flushes after all
/// phases hold, so a failure leaves no partial state behind.
pub struct RebaseChangeOp<'a> {
    project: &'a ProjectConfig,
    strategy: MergeStrategyKind,
    original: Candidate,
    dest: BranchName,
    base: ObjectId,
    committer: Option<Identity>,
    composer: Option<&'a MessageComposer<'a>>,
    fire_revision_created: bool,
    match_author_to_committer_date: bool,
    post_message: bool,
    rebased_commit: Option<ObjectId>,
    rebased_patch_set_id: Option<PatchSetId>,
    inserter: Option<PatchSetInserter>,
}

impl<'a> RebaseChangeOp<'a> {
    pub fn new(
        project: &'a ProjectConfig,
        strategy: MergeStrategyKind,
        original: Candidate,
        dest: BranchName,
        base: ObjectId,
    ) -> Self {
        Self {
            project,
            strategy,
            original,
            dest,
            base,
            committer: None,
            composer: None,
            fire_revision_created: true,
            match_author_to_committer_date: false,
            post_message: true,
            rebased_commit: None,
            rebased_patch_set_id: None,
            inserter: None,
        }
    }

    /// Override the committer; defaults to the transaction user.
    pub fn set_committer(&mut self, committer: Identity) -> &mut Self {
        self.committer = Some(committer);
        self
    }

    /// Compose a detailed message (footers, modifier chain) for the
    /// rebased commit instead of carrying the original message verbatim.
    pub fn set_detailed_message(&mut self, composer: &'a MessageComposer<'a>) -> &mut Self {
        self.composer = Some(composer);
        self
    }

    pub fn set_fire_revision_created(&mut self, fire: bool) -> &mut Self {
        self.fire_revision_created = fire;
        self
    }

    pub fn set_match_author_to_committer_date(&mut self, matched: bool) -> &mut Self {
        self.match_author_to_committer_date = matched;
        self
    }

    /// Whether to record the informational "was rebased" message.
    pub fn set_post_message(&mut self, post: bool) -> &mut Self {
        self.post_message = post;
        self
    }

    /// The rebased commit id. Only valid after `update_repo`.
    pub fn rebased_commit(&self) -> SubmitResult<ObjectId> {
        self.rebased_commit
            .ok_or(IntegrateError::OutOfPhase("rebased_commit before update_repo"))
    }

    /// The new patch-set id. Only valid after `update_repo`.
    pub fn patch_set_id(&self) -> SubmitResult<PatchSetId> {
        self.rebased_patch_set_id
            .ok_or(IntegrateError::OutOfPhase("patch_set_id before update_repo"))
    }

    /// The persisted patch set. Only valid after `update_change`.
    pub fn patch_set(&self) -> SubmitResult<&PatchSet> {
        self.inserter
            .as_ref()
            .ok_or(IntegrateError::OutOfPhase("patch_set before update_repo"))?
            .patch_set()
    }
}

impl BatchOp for RebaseChangeOp<'_> {
    fn update_repo(&mut self, ctx: &mut RepoContext<'_>) -> SubmitResult<()> {
        // Explicit resolution: absence of either commit is a hard failure.
        let original_commit = ctx.inserter.read_commit(&self.original.commit)?;
        let base_commit = ctx.inserter.read_commit(&self.base)?;

        let committer = self.committer.clone().unwrap_or_else(|| ctx.user.clone());

        let message = match self.composer {
            Some(composer) => composer.compose(
                &original_commit,
                &self.original,
                Some(&base_commit),
                &self.dest,
            )?,
            None => original_commit.message.clone(),
        };

        let writer = CommitWriter::new(ctx.inserter, self.project, self.strategy);
        let rebased = writer.create_rebase(
            &self.original.commit,
            &self.base,
            &committer,
            message,
            self.match_author_to_committer_date,
        )?;

        // Next patch-set number: one past everything under the change's
        // patch-set ref namespace (and the patch set being rebased).
        let prefix = PatchSetId::ref_prefix(self.original.change());
        let mut highest = self.original.patch_set.number;
        for name in ctx.refs.refs_with_prefix(&prefix)? {
            if let Ok(ps) = PatchSetId::parse_ref(&name) {
                highest = highest.max(ps.number);
            }
        }
        let next = PatchSetId::new(self.original.change(), highest + 1);

        let mut inserter = PatchSetInserter::new(next, rebased);
        inserter
            .set_description("Rebase")
            .set_groups_from(self.base)
            .set_fire_revision_created(self.fire_revision_created);
        if self.post_message {
            inserter.set_message(format!(
                "Patch Set {}: Patch Set {} was rebased",
                next.number, self.original.patch_set.number
            ));
        }

        info!(
            change = %self.original.change(),
            patch_set = next.number,
            commit = %rebased.abbrev(),
            "rebased"
        );
        self.rebased_commit = Some(rebased);
        self.rebased_patch_set_id = Some(next);
        self.inserter = Some(inserter);
        Ok(())
    }

    fn update_change(&mut self, ctx: &mut ChangeContext<'_>) -> SubmitResult<bool> {
        self.inserter
            .as_mut()
            .ok_or(IntegrateError::OutOfPhase("update_change before update_repo"))?
            .update_change(ctx)
    }

    fn post_update(&mut self, ctx: &mut PostUpdateContext<'_>) -> SubmitResult<()> {
        self.inserter
            .as_mut()
            .ok_or(IntegrateError::OutOfPhase("post_update before update_repo"))?
            .post_update(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use rill_store::{Blob, BufferedInserter, Commit, EntryMode, InMemoryObjectStore, Tree, TreeEntry};
    use rill_types::{ChangeId, ChangeKey, Timestamp};

    use crate::batch::{EventSink, RefReader, ReviewStore};

    fn ident(name: &str, secs: i64) -> Identity {
        Identity::new(name, format!("{}@example.com", name.to_lowercase()), Timestamp::new(secs, 0))
    }

    fn tree_with(store: &InMemoryObjectStore, files: &[(&str, &[u8])]) -> ObjectId {
        let entries = files
            .iter()
            .map(|(name, data)| {
                let blob = store.write(&Blob::new(data.to_vec()).to_stored_object()).unwrap();
                TreeEntry::new(EntryMode::Regular, *name, blob)
            })
            .collect();
        store
            .write(&Tree::from_entries(entries).to_stored_object().unwrap())
            .unwrap()
    }

    fn write_commit(
        store: &InMemoryObjectStore,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        msg: &str,
        secs: i64,
    ) -> ObjectId {
        let commit = Commit {
            tree,
            parents,
            author: ident("Author", secs),
            committer: ident("Author", secs),
            message: msg.to_string(),
        };
        store.write(&commit.to_stored_object()).unwrap()
    }

    #[derive(Default)]
    struct InMemoryReview {
        patch_sets: Vec<(PatchSetId, ObjectId, String, Vec<String>)>,
        messages: Vec<(ChangeId, String)>,
    }

    impl ReviewStore for InMemoryReview {
        fn find_patch_set(
            &self,
            change: ChangeId,
            commit: &ObjectId,
        ) -> SubmitResult<Option<(PatchSetId, Vec<String>)>> {
            Ok(self
                .patch_sets
                .iter()
                .find(|(id, c, _, _)| id.change == change && c == commit)
                .map(|(id, _, _, groups)| (*id, groups.clone())))
        }

        fn insert_patch_set(
            &mut self,
            id: PatchSetId,
            commit: ObjectId,
            description: &str,
            groups: Vec<String>,
        ) -> SubmitResult<()> {
            self.patch_sets.push((id, commit, description.to_string(), groups));
            Ok(())
        }

        fn add_message(&mut self, change: ChangeId, message: &str) -> SubmitResult<()> {
            self.messages.push((change, message.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct StaticRefs(HashMap<String, ObjectId>);

    impl RefReader for StaticRefs {
        fn refs_with_prefix(&self, prefix: &str) -> SubmitResult<Vec<String>> {
            Ok(self
                .0
                .keys()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingEvents(Vec<(PatchSetId, ObjectId)>);

    impl EventSink for RecordingEvents {
        fn revision_created(&mut self, patch_set: PatchSetId, commit: ObjectId) {
            self.0.push((patch_set, commit));
        }
    }

    struct Fixture {
        store: InMemoryObjectStore,
        refs: StaticRefs,
        review: InMemoryReview,
        events: RecordingEvents,
        original: Candidate,
        base: ObjectId,
    }

    /// One change at patch set 2, to be rebased onto a moved branch tip.
    fn fixture() -> Fixture {
        let store = InMemoryObjectStore::new();
        let root = write_commit(&store, tree_with(&store, &[("shared", b"s\n")]), vec![], "root", 100);
        let base = write_commit(
            &store,
            tree_with(&store, &[("shared", b"s\n"), ("tip", b"t\n")]),
            vec![root],
            "tip work",
            200,
        );
        let original_commit = write_commit(
            &store,
            tree_with(&store, &[("shared", b"s\n"), ("change", b"c\n")]),
            vec![root],
            "My change\n",
            300,
        );

        let change = ChangeId(61);
        let ps2 = PatchSetId::new(change, 2);
        let mut refs = StaticRefs::default();
        refs.0.insert(PatchSetId::new(change, 1).ref_name(), root);
        refs.0.insert(ps2.ref_name(), original_commit);

        let mut review = InMemoryReview::default();
        review.patch_sets.push((
            PatchSetId::new(change, 2),
            original_commit,
            "upload".to_string(),
            vec!["group-a".to_string()],
        ));
        review
            .patch_sets
            .push((PatchSetId::new(change, 1), root, "upload".to_string(), vec![]));

        Fixture {
            store,
            refs,
            review,
            events: RecordingEvents::default(),
            original: Candidate::new(original_commit, ChangeKey::derive(b"rebase-test"), ps2, None),
            base,
        }
    }

    fn project() -> ProjectConfig {
        ProjectConfig::default()
    }

    #[test]
    fn accessors_fail_before_their_phase() {
        let f = fixture();
        let p = project();
        let op = RebaseChangeOp::new(
            &p,
            MergeStrategyKind::Recursive,
            f.original.clone(),
            BranchName::new("main"),
            f.base,
        );
        assert!(matches!(op.rebased_commit(), Err(IntegrateError::OutOfPhase(_))));
        assert!(matches!(op.patch_set_id(), Err(IntegrateError::OutOfPhase(_))));
        assert!(matches!(op.patch_set(), Err(IntegrateError::OutOfPhase(_))));
    }

    #[test]
    fn three_phases_in_order() {
        let mut f = fixture();
        let p = project();
        let mut op = RebaseChangeOp::new(
            &p,
            MergeStrategyKind::Recursive,
            f.original.clone(),
            BranchName::new("main"),
            f.base,
        );

        let inserter = BufferedInserter::new(&f.store);
        let mut repo_ctx = RepoContext {
            inserter: &inserter,
            refs: &f.refs,
            user: ident("Service", 900),
        };
        op.update_repo(&mut repo_ctx).unwrap();

        let rebased = op.rebased_commit().unwrap();
        let commit = inserter.read_commit(&rebased).unwrap();
        assert_eq!(commit.parents, vec![f.base]);
        assert_eq!(commit.author.name, "Author");
        assert_eq!(commit.committer.name, "Service");
        // Patch set 2 is the highest existing ref, so the rebase lands at 3.
        assert_eq!(op.patch_set_id().unwrap().number, 3);
        // Metadata not yet persisted.
        assert!(matches!(op.patch_set(), Err(IntegrateError::OutOfPhase(_))));

        let mut change_ctx = ChangeContext { review: &mut f.review };
        assert!(op.update_change(&mut change_ctx).unwrap());
        let ps = op.patch_set().unwrap().clone();
        assert_eq!(ps.commit, rebased);
        let stored = f.review.patch_sets.last().unwrap();
        assert_eq!(stored.2, "Rebase");
        assert_eq!(
            f.review.messages.last().unwrap().1,
            "Patch Set 3: Patch Set 2 was rebased"
        );

        let mut post_ctx = PostUpdateContext { events: &mut f.events };
        op.post_update(&mut post_ctx).unwrap();
        assert_eq!(f.events.0, vec![(ps.id, rebased)]);
    }

    #[test]
    fn groups_carry_forward_from_the_base_patch_set() {
        let mut f = fixture();
        let p = project();
        // Make the base commit resolvable as a patch set with groups.
        f.review.patch_sets.push((
            PatchSetId::new(f.original.change(), 1),
            f.base,
            "upload".to_string(),
            vec!["carried".to_string()],
        ));

        let mut op = RebaseChangeOp::new(
            &p,
            MergeStrategyKind::Recursive,
            f.original.clone(),
            BranchName::new("main"),
            f.base,
        );
        let inserter = BufferedInserter::new(&f.store);
        let mut repo_ctx = RepoContext {
            inserter: &inserter,
            refs: &f.refs,
            user: ident("Service", 900),
        };
        op.update_repo(&mut repo_ctx).unwrap();
        op.update_change(&mut ChangeContext { review: &mut f.review }).unwrap();

        let stored = f.review.patch_sets.last().unwrap();
        assert_eq!(stored.3, vec!["carried".to_string()]);
    }

    #[test]
    fn rebase_onto_current_base_fails_and_flushes_nothing() {
        let mut f = fixture();
        let p = project();
        let root = f.store.read_commit(&f.original.commit).unwrap().parents[0];
        let mut op = RebaseChangeOp::new(
            &p,
            MergeStrategyKind::Recursive,
            f.original.clone(),
            BranchName::new("main"),
            root, // the change's current parent
        );

        let before = f.store.len();
        let inserter = BufferedInserter::new(&f.store);
        let mut repo_ctx = RepoContext {
            inserter: &inserter,
            refs: &f.refs,
            user: ident("Service", 900),
        };
        let err = op.update_repo(&mut repo_ctx).unwrap_err();
        assert!(matches!(err, IntegrateError::AlreadyUpToDate));
        assert_eq!(f.store.len(), before, "nothing persisted");
        assert!(
            matches!(op.update_change(&mut ChangeContext { review: &mut f.review }), Err(IntegrateError::OutOfPhase(_)))
        );
    }

    #[test]
    fn post_message_and_event_can_be_suppressed() {
        let mut f = fixture();
        let p = project();
        let mut op = RebaseChangeOp::new(
            &p,
            MergeStrategyKind::Recursive,
            f.original.clone(),
            BranchName::new("main"),
            f.base,
        );
        op.set_post_message(false).set_fire_revision_created(false);

        let inserter = BufferedInserter::new(&f.store);
        let mut repo_ctx = RepoContext {
            inserter: &inserter,
            refs: &f.refs,
            user: ident("Service", 900),
        };
        op.update_repo(&mut repo_ctx).unwrap();
        op.update_change(&mut ChangeContext { review: &mut f.review }).unwrap();
        op.post_update(&mut PostUpdateContext { events: &mut f.events }).unwrap();

        assert!(f.review.messages.is_empty());
        assert!(f.events.0.is_empty());
    }

    #[test]
    fn detailed_message_runs_through_the_composer() {
        use crate::approvals::{Account, AccountDirectory, AccountId, Approval, ApprovalsProvider};
        use crate::config::EngineConfig;

        struct NoApprovals;
        impl ApprovalsProvider for NoApprovals {
            fn by_patch_set(&self, _ps: &PatchSetId) -> SubmitResult<Vec<Approval>> {
                Ok(Vec::new())
            }
        }
        struct NoAccounts;
        impl AccountDirectory for NoAccounts {
            fn account(&self, _id: AccountId) -> Option<Account> {
                None
            }
        }

        let mut f = fixture();
        let p = project();
        let engine = EngineConfig::default();
        let composer = MessageComposer::new(&p, &engine, &NoApprovals, &NoAccounts);
        let mut op = RebaseChangeOp::new(
            &p,
            MergeStrategyKind::Recursive,
            f.original.clone(),
            BranchName::new("main"),
            f.base,
        );
        op.set_detailed_message(&composer);

        let inserter = BufferedInserter::new(&f.store);
        let mut repo_ctx = RepoContext {
            inserter: &inserter,
            refs: &f.refs,
            user: ident("Service", 900),
        };
        op.update_repo(&mut repo_ctx).unwrap();
        op.update_change(&mut ChangeContext { review: &mut f.review }).unwrap();

        let rebased = op.rebased_commit().unwrap();
        let message = inserter.read_commit(&rebased).unwrap().message;
        assert!(message.starts_with("My change\n"));
        assert!(message.contains(&format!("Change-Id: {}", f.original.key)));
    }
}
