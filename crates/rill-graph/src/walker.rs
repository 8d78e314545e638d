use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use rill_store::{Commit, ObjectStore};
use rill_types::ObjectId;
use tracing::trace;

use crate::error::{GraphError, GraphResult};

/// Emission order for [`RevWalk::walk`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WalkOrder {
    /// Topological, children before parents, newest first among peers.
    #[default]
    Topo,
    /// Topological reversed: parents before children. Guarantees every
    /// commit is emitted after all commits that can reach it.
    ReverseTopo,
}

/// A marked walk over commit history.
///
/// Commits reachable from any start mark are visible unless they are also
/// reachable from an uninteresting mark (the frontier cut). Loaded commits
/// are cached for the lifetime of the walk, so repeated ancestry queries
/// against the same history are cheap.
pub struct RevWalk<'a> {
    store: &'a dyn ObjectStore,
    starts: Vec<ObjectId>,
    uninteresting: Vec<ObjectId>,
    order: WalkOrder,
    cache: HashMap<ObjectId, Commit>,
}

impl<'a> RevWalk<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            starts: Vec::new(),
            uninteresting: Vec::new(),
            order: WalkOrder::default(),
            cache: HashMap::new(),
        }
    }

    /// Mark a commit as a walk start.
    pub fn mark_start(&mut self, id: ObjectId) -> &mut Self {
        self.starts.push(id);
        self
    }

    /// Mark a commit (and everything it can reach) as uninteresting.
    pub fn mark_uninteresting(&mut self, id: ObjectId) -> &mut Self {
        self.uninteresting.push(id);
        self
    }

    /// Set the emission order for [`walk`](Self::walk).
    pub fn set_order(&mut self, order: WalkOrder) -> &mut Self {
        self.order = order;
        self
    }

    /// Clear all marks, keeping the loaded-commit cache.
    pub fn reset(&mut self) -> &mut Self {
        self.starts.clear();
        self.uninteresting.clear();
        self.order = WalkOrder::default();
        self
    }

    /// Load a commit through the cache. Cheap after the first access.
    pub fn commit(&mut self, id: &ObjectId) -> GraphResult<&Commit> {
        if !self.cache.contains_key(id) {
            let commit = self.store.read_commit(id)?;
            self.cache.insert(*id, commit);
        }
        Ok(&self.cache[id])
    }

    fn parents(&mut self, id: &ObjectId) -> GraphResult<Vec<ObjectId>> {
        let parents = self.commit(id)?.parents.clone();
        for parent in &parents {
            if !self.cache.contains_key(parent) && !self.store.exists(parent)? {
                return Err(GraphError::MissingParent {
                    child: *id,
                    parent: *parent,
                });
            }
        }
        Ok(parents)
    }

    fn committed_at(&mut self, id: &ObjectId) -> GraphResult<i64> {
        Ok(self.commit(id)?.committer.when.seconds)
    }

    /// All commits reachable from `seeds`, including the seeds.
    fn reachable(&mut self, seeds: &[ObjectId]) -> GraphResult<HashSet<ObjectId>> {
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        for seed in seeds {
            if seen.insert(*seed) {
                queue.push_back(*seed);
            }
        }
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(seen)
    }

    /// Enumerate the visible commits in the configured order.
    ///
    /// Visible means reachable from a start mark but not from any
    /// uninteresting mark. Peers are ordered newest-committed first, ties
    /// broken by id, so the output is fully deterministic.
    pub fn walk(&mut self) -> GraphResult<Vec<ObjectId>> {
        let starts = self.starts.clone();
        let uninteresting = self.uninteresting.clone();

        let hidden = self.reachable(&uninteresting)?;

        // Collect the visible subgraph without descending past the frontier.
        let mut visible: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        for start in &starts {
            if !hidden.contains(start) && visible.insert(*start) {
                queue.push_back(*start);
            }
        }
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if !hidden.contains(&parent) && visible.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        // Kahn's algorithm over the induced subgraph, children first.
        let mut child_count: HashMap<ObjectId, usize> =
            visible.iter().map(|id| (*id, 0)).collect();
        for id in &visible {
            for parent in self.parents(id)? {
                if let Some(count) = child_count.get_mut(&parent) {
                    *count += 1;
                }
            }
        }

        let mut ready: BinaryHeap<(i64, ObjectId)> = BinaryHeap::new();
        for (id, count) in &child_count {
            if *count == 0 {
                ready.push((self.committed_at(id)?, *id));
            }
        }

        let mut out = Vec::with_capacity(visible.len());
        while let Some((_, id)) = ready.pop() {
            out.push(id);
            for parent in self.parents(&id)? {
                if let Some(count) = child_count.get_mut(&parent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push((self.committed_at(&parent)?, parent));
                    }
                }
            }
        }

        if self.order == WalkOrder::ReverseTopo {
            out.reverse();
        }
        trace!(commits = out.len(), "walk complete");
        Ok(out)
    }

    /// Whether `ancestor` is reachable from `tip` (or equal to it).
    pub fn is_merged_into(&mut self, ancestor: &ObjectId, tip: &ObjectId) -> GraphResult<bool> {
        if ancestor == tip {
            return Ok(true);
        }
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        seen.insert(*tip);
        queue.push_back(*tip);
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if parent == *ancestor {
                    return Ok(true);
                }
                if seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(false)
    }

    /// The merge bases of `a` and `b`: common ancestors not dominated by
    /// any other common ancestor. The result may be empty (unrelated
    /// histories) or hold several bases (criss-cross merges).
    pub fn merge_bases(&mut self, a: &ObjectId, b: &ObjectId) -> GraphResult<Vec<ObjectId>> {
        let ancestors_a = self.reachable(&[*a])?;
        let ancestors_b = self.reachable(&[*b])?;
        let common: HashSet<ObjectId> =
            ancestors_a.intersection(&ancestors_b).copied().collect();
        if common.is_empty() {
            return Ok(Vec::new());
        }

        // A common ancestor is dominated when it is reachable from another
        // common ancestor's parents.
        let mut frontier: Vec<ObjectId> = Vec::new();
        for id in &common {
            frontier.extend(self.parents(id)?);
        }
        let below = self.reachable(&frontier)?;

        let mut bases: Vec<ObjectId> = common
            .into_iter()
            .filter(|id| !below.contains(id))
            .collect();

        // Deterministic output: newest first, ties by id.
        let mut keyed: Vec<(i64, ObjectId)> = Vec::with_capacity(bases.len());
        for id in bases.drain(..) {
            keyed.push((self.committed_at(&id)?, id));
        }
        keyed.sort_by(|x, y| y.cmp(x));
        Ok(keyed.into_iter().map(|(_, id)| id).collect())
    }
}
