use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use rill_graph::RevWalk;
use rill_merge::{MergeError, MergeStrategyKind, Merger};
use rill_store::{BufferedInserter, ObjectStore, StoreError};
use rill_types::ObjectId;
use tracing::{debug, warn};

use crate::candidate::CandidateSet;
use crate::error::{IntegrateError, SubmitResult};
use crate::status::{CommitStatus, StatusLedger};

/// How one candidate's dependency chain checked out.
enum ChainCheck {
    /// Every parent chain lands in the candidate set or the tip's history.
    Complete,
    /// A prerequisite commit is in neither.
    Missing(ObjectId),
    /// The candidate's own commit object cannot be read.
    Gone,
}

/// Orders and classifies a batch of candidate commits against a branch tip.
///
/// Classification (`can_fast_forward` / `can_cherry_pick` / `can_merge`)
/// performs trial merges into a throwaway buffer that is never flushed, so
/// probing mergeability leaves no trace in the store.
pub struct IntegrationSorter<'a> {
    store: &'a dyn ObjectStore,
    candidates: &'a CandidateSet,
    strategy: MergeStrategyKind,
}

impl<'a> IntegrationSorter<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        candidates: &'a CandidateSet,
        strategy: MergeStrategyKind,
    ) -> Self {
        Self {
            store,
            candidates,
            strategy,
        }
    }

    /// Filter and order the candidate set for integration.
    ///
    /// Commits whose parent chains escape both the candidate set and the
    /// tip's history are excluded with `MissingDependency`; dependents of
    /// an excluded commit fail the same check and are excluded with them.
    /// The survivors come back topologically ordered, parents first, so
    /// they can be integrated in sequence.
    pub fn sort(
        &self,
        tip: Option<&ObjectId>,
        ledger: &mut StatusLedger,
    ) -> SubmitResult<Vec<ObjectId>> {
        let mut ids: Vec<ObjectId> = self.candidates.commits().copied().collect();
        ids.sort();

        let mut included: HashSet<ObjectId> = HashSet::new();
        for id in &ids {
            match self.check_chain(tip, id)? {
                ChainCheck::Complete => {
                    included.insert(*id);
                }
                ChainCheck::Missing(dep) => {
                    debug!(commit = %id.abbrev(), missing = %dep.abbrev(), "excluding candidate");
                    ledger.mark(*id, CommitStatus::MissingDependency);
                }
                ChainCheck::Gone => {
                    ledger.mark(*id, CommitStatus::RevisionGone);
                }
            }
        }

        self.topo_order(&included)
    }

    /// Whether any prerequisite of `commit` is absent from both the
    /// candidate set and the destination history.
    pub fn has_missing_dependencies(
        &self,
        tip: Option<&ObjectId>,
        commit: &ObjectId,
    ) -> SubmitResult<bool> {
        Ok(!matches!(self.check_chain(tip, commit)?, ChainCheck::Complete))
    }

    fn check_chain(&self, tip: Option<&ObjectId>, commit: &ObjectId) -> SubmitResult<ChainCheck> {
        let mut walk = RevWalk::new(self.store);
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        seen.insert(*commit);
        queue.push_back(*commit);

        while let Some(current) = queue.pop_front() {
            let parents = match self.store.read_commit(&current) {
                Ok(c) => c.parents,
                Err(StoreError::NotFound(_)) if current == *commit => return Ok(ChainCheck::Gone),
                Err(StoreError::NotFound(id)) => return Ok(ChainCheck::Missing(id)),
                Err(e) => return Err(e.into()),
            };
            for parent in parents {
                if !seen.insert(parent) {
                    continue;
                }
                if self.candidates.contains(&parent) {
                    // Dependencies inside the batch are walked through, so
                    // a break anywhere below excludes the dependents too.
                    queue.push_back(parent);
                    continue;
                }
                let in_history = match tip {
                    Some(t) => walk.is_merged_into(&parent, t)?,
                    None => false,
                };
                if !in_history {
                    return Ok(ChainCheck::Missing(parent));
                }
            }
        }
        Ok(ChainCheck::Complete)
    }

    /// Parents-first order among the included candidates, oldest first
    /// among peers, ties broken by id.
    fn topo_order(&self, included: &HashSet<ObjectId>) -> SubmitResult<Vec<ObjectId>> {
        let mut blockers: HashMap<ObjectId, usize> = HashMap::new();
        let mut dependents: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        let mut committed_at: HashMap<ObjectId, i64> = HashMap::new();

        for id in included {
            let commit = self.store.read_commit(id)?;
            committed_at.insert(*id, commit.committer.when.seconds);
            let mut count = 0;
            for parent in &commit.parents {
                if included.contains(parent) {
                    count += 1;
                    dependents.entry(*parent).or_default().push(*id);
                }
            }
            blockers.insert(*id, count);
        }

        let mut ready: BinaryHeap<Reverse<(i64, ObjectId)>> = BinaryHeap::new();
        for (id, count) in &blockers {
            if *count == 0 {
                ready.push(Reverse((committed_at[id], *id)));
            }
        }

        let mut out = Vec::with_capacity(included.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            out.push(id);
            if let Some(children) = dependents.get(&id) {
                for child in children {
                    let count = blockers.get_mut(child).expect("child is included");
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse((committed_at[child], *child)));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Drop candidates that sit in another candidate's history, leaving
    /// only the chain heads. Merging a head brings its candidate
    /// ancestors along, so one merge commit integrates a whole chain.
    pub fn reduce_to_heads(&self, sorted: &[ObjectId]) -> SubmitResult<Vec<ObjectId>> {
        let mut frontier: Vec<ObjectId> = Vec::new();
        for id in sorted {
            frontier.extend(self.store.read_commit(id)?.parents);
        }

        // Everything reachable from a member's parents is dominated.
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = frontier.into_iter().collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            if let Ok(commit) = self.store.read_commit(&current) {
                queue.extend(commit.parents);
            }
        }

        Ok(sorted.iter().filter(|id| !seen.contains(id)).copied().collect())
    }

    /// Scan the ordered queue for the first commit that can become the new
    /// tip without a merge commit: the very first integration onto an
    /// unborn branch, or a descendant of the current tip. That commit is
    /// removed from the queue and returned.
    pub fn first_fast_forward(
        &self,
        tip: Option<&ObjectId>,
        queue: &mut Vec<ObjectId>,
    ) -> SubmitResult<Option<ObjectId>> {
        let mut walk = RevWalk::new(self.store);
        for i in 0..queue.len() {
            let n = queue[i];
            let fast_forwardable = match tip {
                None => true,
                Some(t) => walk.is_merged_into(t, &n)?,
            };
            if fast_forwardable {
                queue.remove(i);
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    /// Whether integrating `commit` needs no merge commit: the tip is
    /// unborn, or one of the two is an ancestor of the other (the latter
    /// being the no-op case).
    pub fn can_fast_forward(
        &self,
        tip: Option<&ObjectId>,
        commit: &ObjectId,
    ) -> SubmitResult<bool> {
        if self.has_missing_dependencies(tip, commit)? {
            return Ok(false);
        }
        let Some(tip) = tip else {
            return Ok(true);
        };
        let mut walk = RevWalk::new(self.store);
        Ok(walk.is_merged_into(tip, commit)? || walk.is_merged_into(commit, tip)?)
    }

    /// Whether a three-way merge of the tip and `commit` would succeed.
    ///
    /// Oversized objects and merge-base failures degrade to `false`;
    /// store faults surface.
    pub fn can_merge(&self, tip: Option<&ObjectId>, commit: &ObjectId) -> SubmitResult<bool> {
        if self.has_missing_dependencies(tip, commit)? {
            return Ok(false);
        }
        let Some(tip) = tip else {
            return Ok(true);
        };
        let scratch = BufferedInserter::new(self.store);
        let mut merger = three_way(&scratch, self.strategy)?;
        self.trial(merger.merge(tip, commit), commit)
    }

    /// Whether `commit` can be cherry-picked onto the tip.
    ///
    /// Root commits cannot (there is no delta to reapply); merge commits
    /// are never literally cherry-picked and fall back to
    /// fast-forward-or-merge.
    pub fn can_cherry_pick(&self, tip: Option<&ObjectId>, commit: &ObjectId) -> SubmitResult<bool> {
        let Some(tip) = tip else {
            // Unborn branch; the commit can land as-is.
            return Ok(true);
        };

        let candidate = self.store.read_commit(commit)?;
        match candidate.parents.len() {
            0 => Ok(false),
            1 => {
                let scratch = BufferedInserter::new(self.store);
                let mut merger = three_way(&scratch, self.strategy)?;
                merger.set_base(candidate.parents[0]);
                self.trial(merger.merge(tip, commit), commit)
            }
            _ => Ok(self.can_fast_forward(Some(tip), commit)?
                || self.can_merge(Some(tip), commit)?),
        }
    }

    /// Collapse a trial-merge result to a conservative yes/no.
    fn trial(
        &self,
        result: Result<rill_merge::MergeOutcome, MergeError>,
        commit: &ObjectId,
    ) -> SubmitResult<bool> {
        match result {
            Ok(outcome) => Ok(outcome.is_success()),
            Err(MergeError::Base(_)) => Ok(false),
            Err(MergeError::Store(StoreError::TooLarge { id, size })) => {
                warn!(commit = %commit.abbrev(), object = %id.abbrev(), size, "not merging oversized object");
                Ok(false)
            }
            Err(MergeError::Store(e)) => Err(e.into()),
            Err(MergeError::Graph(e)) => Err(e.into()),
            Err(e @ (MergeError::UnknownStrategy(_) | MergeError::NotThreeWay(_))) => {
                Err(IntegrateError::InvalidConfiguration(e.to_string()))
            }
        }
    }
}

/// Build a three-way merger, mapping strategy misuse to a configuration
/// error.
fn three_way<'a>(
    store: &'a dyn ObjectStore,
    strategy: MergeStrategyKind,
) -> SubmitResult<Merger<'a>> {
    Merger::three_way(store, strategy)
        .map_err(|e| IntegrateError::InvalidConfiguration(e.to_string()))
}
