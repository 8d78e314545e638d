use rill_graph::{RevWalk, WalkOrder};
use rill_merge::{BaseFailure, MergeError, MergeOutcome, MergeStrategyKind, Merger};
use rill_store::{Commit, ObjectStore};
use rill_types::{Identity, ObjectId};
use tracing::{debug, info};

use crate::candidate::{BranchName, BranchTip, CandidateSet};
use crate::config::ProjectConfig;
use crate::error::{IntegrateError, SubmitResult};
use crate::status::{CommitStatus, StatusLedger};

/// Maximum change keys enumerated in a merge summary before eliding.
const SUMMARY_KEY_LIMIT: usize = 5;

/// Rewrites a merge-result tree before a cherry-picked commit is
/// finalized.
///
/// This is the seam for content rewriting on the pick path (generated-file
/// stamping and the like). Processors receive the destination tip and the
/// candidate tree and return the tree to commit, usually a new one
/// inserted through the same store.
pub trait TreeProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(
        &self,
        store: &dyn ObjectStore,
        tip: &Commit,
        tree: ObjectId,
    ) -> SubmitResult<ObjectId>;
}

/// Constructs the immutable commit objects a pass produces: merge commits,
/// cherry-picks, and rebases. Inserts are buffered by the store handed in;
/// nothing here flushes.
pub struct CommitWriter<'a> {
    store: &'a dyn ObjectStore,
    project: &'a ProjectConfig,
    strategy: MergeStrategyKind,
}

impl<'a> CommitWriter<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        project: &'a ProjectConfig,
        strategy: MergeStrategyKind,
    ) -> Self {
        Self {
            store,
            project,
            strategy,
        }
    }

    // -----------------------------------------------------------------
    // Merge commits
    // -----------------------------------------------------------------

    /// Attempt to merge candidate `n` into the tip as one batch step.
    ///
    /// On success the tip advances to the new merge commit. On conflict
    /// (or a merge-base failure) the candidate and its not-yet-merged
    /// ancestors are marked in the ledger and the tip stays put; batch
    /// passes never abort on per-commit outcomes. Store faults do abort.
    pub fn merge_one_commit(
        &self,
        author: &Identity,
        committer: &Identity,
        tip: &mut BranchTip,
        n: &ObjectId,
        candidates: &CandidateSet,
        dest: &BranchName,
        ledger: &mut StatusLedger,
    ) -> SubmitResult<()> {
        let Some(tip_id) = tip.current() else {
            // Unborn branch: the first integration is a plain fast-forward.
            tip.advance(*n);
            return Ok(());
        };

        let mut merger = Merger::new(self.store, self.strategy);
        match merger.merge(&tip_id, n) {
            Ok(MergeOutcome::Success { tree }) => {
                let merged =
                    self.write_merge_commit(author, committer, &tip_id, n, tree, candidates, dest)?;
                info!(tip = %merged.abbrev(), candidate = %n.abbrev(), "merged");
                tip.advance(merged);
                Ok(())
            }
            Ok(MergeOutcome::Conflicts { .. }) => {
                self.fail_candidate(&tip_id, n, CommitStatus::PathConflict, candidates, ledger)
            }
            Err(MergeError::Base(failure)) => {
                let status = match failure {
                    BaseFailure::ConflictsDuringBaseMerge => CommitStatus::PathConflict,
                    _ => CommitStatus::ManualRecursiveMerge,
                };
                self.fail_candidate(&tip_id, n, status, candidates, ledger)
            }
            Err(e) => Err(classify_fault(e)),
        }
    }

    /// Mark `n` and its not-yet-merged candidate ancestors with a failure
    /// status.
    fn fail_candidate(
        &self,
        tip: &ObjectId,
        n: &ObjectId,
        status: CommitStatus,
        candidates: &CandidateSet,
        ledger: &mut StatusLedger,
    ) -> SubmitResult<()> {
        debug!(candidate = %n.abbrev(), %status, "merge step failed");
        let mut walk = RevWalk::new(self.store);
        walk.mark_start(*n).mark_uninteresting(*tip);
        for id in walk.walk()? {
            if candidates.contains(&id) {
                ledger.mark(id, status);
            }
        }
        Ok(())
    }

    /// Write the merge commit for a successful batch step: parents are
    /// `[tip, candidate]` so first-parent history follows the branch, and
    /// the message summarizes every change the candidate brings in.
    pub fn write_merge_commit(
        &self,
        author: &Identity,
        committer: &Identity,
        tip: &ObjectId,
        n: &ObjectId,
        tree: ObjectId,
        candidates: &CandidateSet,
        dest: &BranchName,
    ) -> SubmitResult<ObjectId> {
        let mut walk = RevWalk::new(self.store);
        walk.mark_start(*n).mark_uninteresting(*tip);
        let merged: Vec<ObjectId> = walk
            .walk()?
            .into_iter()
            .filter(|id| candidates.contains(id))
            .collect();

        let mut message = self.summarize(&merged, candidates)?;
        if !dest.is_primary() {
            message.push_str(" into ");
            message.push_str(dest.short_name());
        }
        if merged.len() > 1 {
            message.push_str("\n\n* changes:\n");
            for id in &merged {
                let short = self.store.read_commit(id)?.short_message().to_string();
                message.push_str("  ");
                message.push_str(&short);
                message.push('\n');
            }
        }

        let commit = Commit {
            tree,
            parents: vec![*tip, *n],
            author: author.clone(),
            committer: committer.clone(),
            message,
        };
        Ok(self.store.write(&commit.to_stored_object())?)
    }

    /// The headline of a merge commit message.
    fn summarize(&self, merged: &[ObjectId], candidates: &CandidateSet) -> SubmitResult<String> {
        if merged.len() == 1 {
            let short = self.store.read_commit(&merged[0])?.short_message().to_string();
            return Ok(format!("Merge \"{short}\""));
        }

        // Unique topics in first-seen order.
        let mut topics: Vec<&str> = Vec::new();
        for id in merged {
            if let Some(topic) = candidates.get(id).and_then(|c| c.topic.as_deref()) {
                if !topic.is_empty() && !topics.contains(&topic) {
                    topics.push(topic);
                }
            }
        }

        Ok(match topics.len() {
            1 => format!("Merge changes from topic \"{}\"", topics[0]),
            n if n > 1 => {
                let list: Vec<String> = topics.iter().map(|t| format!("\"{t}\"")).collect();
                format!("Merge changes from topics {}", list.join(", "))
            }
            _ => {
                let keys: Vec<&str> = merged
                    .iter()
                    .take(SUMMARY_KEY_LIMIT)
                    .filter_map(|id| candidates.get(id).map(|c| c.key.abbreviate()))
                    .collect();
                let mut joined = keys.join(",");
                if merged.len() > SUMMARY_KEY_LIMIT {
                    joined.push_str(", ...");
                }
                format!("Merge changes {joined}")
            }
        })
    }

    /// Merge a single source commit into the tip on request (not part of a
    /// batch). Under any strategy except `Theirs`, merging a commit that
    /// is already in the tip's history is an error rather than a no-op.
    pub fn create_merge_commit(
        &self,
        author: &Identity,
        committer: &Identity,
        tip: &ObjectId,
        source: &ObjectId,
        message: String,
    ) -> SubmitResult<ObjectId> {
        if self.strategy != MergeStrategyKind::Theirs {
            let mut walk = RevWalk::new(self.store);
            if walk.is_merged_into(source, tip)? {
                return Err(IntegrateError::AlreadyMerged(*source));
            }
        }

        let mut merger = Merger::new(self.store, self.strategy);
        let tree = match merger.merge(tip, source) {
            Ok(MergeOutcome::Success { tree }) => tree,
            Ok(MergeOutcome::Conflicts { paths }) => {
                return Err(IntegrateError::MergeConflict { paths })
            }
            Err(MergeError::Base(BaseFailure::ConflictsDuringBaseMerge)) => {
                return Err(IntegrateError::MergeConflict { paths: Vec::new() })
            }
            Err(e) => return Err(classify_fault(e)),
        };

        let commit = Commit {
            tree,
            parents: vec![*tip, *source],
            author: author.clone(),
            committer: committer.clone(),
            message,
        };
        Ok(self.store.write(&commit.to_stored_object())?)
    }

    // -----------------------------------------------------------------
    // Cherry-pick
    // -----------------------------------------------------------------

    /// Reapply `original`'s change onto the tip.
    ///
    /// The three-way base is the original's parent selected by
    /// `parent_index`, which allows picking a non-first-parent side of a
    /// merge. The message may gain an incrementing `[N]` tag parsed from
    /// the tip's own subject. A [`TreeProcessor`], when given, rewrites
    /// the merged tree before the commit is built.
    #[allow(clippy::too_many_arguments)]
    pub fn create_cherry_pick(
        &self,
        tip: &ObjectId,
        original: &ObjectId,
        committer: &Identity,
        message: String,
        parent_index: usize,
        allow_identical_tree: bool,
        processor: Option<&dyn TreeProcessor>,
    ) -> SubmitResult<ObjectId> {
        let tip_commit = self.store.read_commit(tip)?;
        let original_commit = self.store.read_commit(original)?;
        let base = original_commit.parent(parent_index).ok_or_else(|| {
            IntegrateError::fault(format!(
                "cherry-pick of {} has no parent {parent_index}",
                original.abbrev()
            ))
        })?;

        let mut merger = three_way(self.store, self.strategy)?;
        merger.set_base(base);
        let mut tree = match merger.merge(tip, original) {
            Ok(MergeOutcome::Success { tree }) => tree,
            Ok(MergeOutcome::Conflicts { paths }) => {
                return Err(IntegrateError::MergeConflict { paths })
            }
            Err(e) => return Err(classify_fault(e)),
        };

        if tree == tip_commit.tree && !allow_identical_tree {
            return Err(IntegrateError::IdenticalTree);
        }

        let message = match next_pick_tag(tip_commit.short_message()) {
            Some(tag) => format!("[{tag}] {message}"),
            None => message,
        };

        if let Some(processor) = processor {
            debug!(processor = processor.name(), "post-processing cherry-pick tree");
            tree = processor.process(self.store, &tip_commit, tree)?;
        }

        let mut author = original_commit.author.clone();
        if self.project.match_author_to_committer_date {
            author = author.with_when(committer.when);
        }

        let commit = Commit {
            tree,
            parents: vec![*tip],
            author,
            committer: committer.clone(),
            message,
        };
        Ok(self.store.write(&commit.to_stored_object())?)
    }

    // -----------------------------------------------------------------
    // Rebase
    // -----------------------------------------------------------------

    /// Replay `original` onto `new_base` via a three-way merge against the
    /// original's first parent.
    ///
    /// Rebasing onto the current parent is `AlreadyUpToDate`, a terminal
    /// condition the caller must not retry. The author is preserved unless
    /// `match_author_date` forces the author's timestamp and zone to the
    /// committer's.
    pub fn create_rebase(
        &self,
        original: &ObjectId,
        new_base: &ObjectId,
        committer: &Identity,
        message: String,
        match_author_date: bool,
    ) -> SubmitResult<ObjectId> {
        let original_commit = self.store.read_commit(original)?;
        let parent = original_commit.parent(0).ok_or_else(|| {
            IntegrateError::fault(format!("cannot rebase root commit {}", original.abbrev()))
        })?;

        if parent == *new_base {
            return Err(IntegrateError::AlreadyUpToDate);
        }

        let mut merger = three_way(self.store, self.strategy)?;
        merger.set_base(parent);
        let tree = match merger.merge(new_base, original) {
            Ok(MergeOutcome::Success { tree }) => tree,
            Ok(MergeOutcome::Conflicts { paths }) => {
                return Err(IntegrateError::MergeConflict { paths })
            }
            Err(e) => return Err(classify_fault(e)),
        };

        let mut author = original_commit.author.clone();
        if match_author_date {
            author = author.with_when(committer.when);
        }

        let commit = Commit {
            tree,
            parents: vec![*new_base],
            author,
            committer: committer.clone(),
            message,
        };
        Ok(self.store.write(&commit.to_stored_object())?)
    }

    // -----------------------------------------------------------------
    // Status sweeps
    // -----------------------------------------------------------------

    /// One reachability sweep at the end of a pass: every candidate
    /// reachable from the final tip but not from a previously accepted
    /// tip, and not yet carrying a status, merged cleanly.
    pub fn mark_clean_merges(
        &self,
        tip: Option<&ObjectId>,
        already_accepted: &[ObjectId],
        candidates: &CandidateSet,
        ledger: &mut StatusLedger,
    ) -> SubmitResult<()> {
        let Some(tip) = tip else {
            // Nothing was merged onto an unborn branch.
            return Ok(());
        };

        let mut walk = RevWalk::new(self.store);
        walk.set_order(WalkOrder::ReverseTopo).mark_start(*tip);
        for accepted in already_accepted {
            if accepted != tip {
                walk.mark_uninteresting(*accepted);
            }
        }

        for id in walk.walk()? {
            if candidates.contains(&id) && !ledger.is_marked(&id) {
                ledger.mark(id, CommitStatus::CleanMerge);
            }
        }
        Ok(())
    }

    /// The first of `commits` that is already an ancestor of `tip`.
    pub fn find_any_merged_into(
        &self,
        tip: &ObjectId,
        commits: &[ObjectId],
    ) -> SubmitResult<Option<ObjectId>> {
        let mut walk = RevWalk::new(self.store);
        for commit in commits {
            if walk.is_merged_into(commit, tip)? {
                return Ok(Some(*commit));
            }
        }
        Ok(None)
    }
}

/// Next `[N]` tag given the tip's subject line: one more than the tip's
/// own tag, or nothing if the tip carries none.
fn next_pick_tag(tip_subject: &str) -> Option<u32> {
    let rest = tip_subject.strip_prefix('[')?;
    let close = rest.find(']')?;
    let n: u32 = rest[..close].parse().ok()?;
    Some(n + 1)
}

fn three_way<'a>(
    store: &'a dyn ObjectStore,
    strategy: MergeStrategyKind,
) -> SubmitResult<Merger<'a>> {
    Merger::three_way(store, strategy)
        .map_err(|e| IntegrateError::InvalidConfiguration(e.to_string()))
}

/// Map merge-engine failures that are not expected outcomes.
fn classify_fault(e: MergeError) -> IntegrateError {
    match e {
        MergeError::UnknownStrategy(_) | MergeError::NotThreeWay(_) => {
            IntegrateError::InvalidConfiguration(e.to_string())
        }
        MergeError::Store(inner) => inner.into(),
        MergeError::Graph(inner) => inner.into(),
        MergeError::Base(_) => IntegrateError::Fault(Box::new(e)),
    }
}
