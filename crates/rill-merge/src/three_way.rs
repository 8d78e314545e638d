use std::collections::BTreeSet;

use rill_graph::RevWalk;
use rill_store::{Blob, Commit, EntryMode, ObjectStore, Tree, TreeEntry};
use rill_types::{Identity, ObjectId};
use tracing::debug;

use crate::content::{merge_text, ContentMerge};
use crate::error::{BaseFailure, MergeError, MergeResult};
use crate::strategy::MergeStrategyKind;

/// Depth limit for virtual-base recursion on criss-cross histories.
const MAX_BASE_RECURSION: usize = 10;

/// The result of a merge: a tree, or the list of paths that refused.
///
/// Never both. A conflicted merge produces no usable tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Success { tree: ObjectId },
    Conflicts { paths: Vec<String> },
}

impl MergeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The merged tree, if the merge succeeded.
    pub fn tree(&self) -> Option<ObjectId> {
        match self {
            Self::Success { tree } => Some(*tree),
            Self::Conflicts { .. } => None,
        }
    }

    /// The unmerged paths, empty on success.
    pub fn unmerged_paths(&self) -> &[String] {
        match self {
            Self::Success { .. } => &[],
            Self::Conflicts { paths } => paths,
        }
    }
}

/// Applies a [`MergeStrategyKind`] to a pair of commits.
///
/// With an explicit base ([`set_base`](Self::set_base)) the base is taken
/// literally even if it differs from the natural merge base, which is what
/// cherry-pick and rebase need. Without one, the merger computes the merge
/// base itself and, under the recursive strategy, builds virtual bases for
/// criss-cross histories.
///
/// All object inserts go through the store handed in; nothing is flushed
/// here.
pub struct Merger<'a> {
    store: &'a dyn ObjectStore,
    strategy: MergeStrategyKind,
    base: Option<ObjectId>,
}

impl<'a> Merger<'a> {
    /// A merger for any strategy. Used for ordinary merge commits, where
    /// `Theirs` is a legal (if blunt) choice.
    pub fn new(store: &'a dyn ObjectStore, strategy: MergeStrategyKind) -> Self {
        Self {
            store,
            strategy,
            base: None,
        }
    }

    /// A merger that must support three-way merging. Fails fast on a
    /// strategy that cannot (cherry-pick and rebase need a real base).
    pub fn three_way(
        store: &'a dyn ObjectStore,
        strategy: MergeStrategyKind,
    ) -> MergeResult<Self> {
        if !strategy.supports_three_way() {
            return Err(MergeError::NotThreeWay(strategy.name()));
        }
        Ok(Self::new(store, strategy))
    }

    /// Use `base` (a commit) as the merge base, bypassing computation.
    pub fn set_base(&mut self, base: ObjectId) -> &mut Self {
        self.base = Some(base);
        self
    }

    pub fn strategy(&self) -> MergeStrategyKind {
        self.strategy
    }

    /// Merge `theirs` into `ours`.
    pub fn merge(&mut self, ours: &ObjectId, theirs: &ObjectId) -> MergeResult<MergeOutcome> {
        let theirs_commit = self.store.read_commit(theirs)?;
        if self.strategy == MergeStrategyKind::Theirs {
            return Ok(MergeOutcome::Success {
                tree: theirs_commit.tree,
            });
        }

        let ours_commit = self.store.read_commit(ours)?;
        if ours_commit.tree == theirs_commit.tree {
            // Nothing to combine; the result is "ours", unchanged.
            return Ok(MergeOutcome::Success {
                tree: ours_commit.tree,
            });
        }

        let base_tree = match self.base {
            Some(base) => self.store.read_commit(&base)?.tree,
            None => self.implicit_base_tree(ours, theirs, 0)?,
        };

        let mut conflicts = Vec::new();
        let tree = self.merge_tree_ids(
            &base_tree,
            &ours_commit.tree,
            &theirs_commit.tree,
            "",
            &mut conflicts,
        )?;

        if conflicts.is_empty() {
            Ok(MergeOutcome::Success { tree })
        } else {
            conflicts.sort();
            conflicts.dedup();
            debug!(paths = conflicts.len(), "merge conflicted");
            Ok(MergeOutcome::Conflicts { paths: conflicts })
        }
    }

    /// The tree of the computed merge base for `ours`/`theirs`.
    fn implicit_base_tree(
        &self,
        ours: &ObjectId,
        theirs: &ObjectId,
        depth: usize,
    ) -> MergeResult<ObjectId> {
        let mut walk = RevWalk::new(self.store);
        let bases = walk.merge_bases(ours, theirs)?;
        match bases.len() {
            0 => Err(MergeError::Base(BaseFailure::NoCommonAncestor)),
            1 => Ok(self.store.read_commit(&bases[0])?.tree),
            _ if self.strategy != MergeStrategyKind::Recursive => {
                Err(MergeError::Base(BaseFailure::MultipleBasesUnsupported))
            }
            _ if depth >= MAX_BASE_RECURSION => Err(MergeError::Base(BaseFailure::TooManyBases)),
            _ => {
                // Fold the bases pairwise into virtual commits.
                let mut virtual_base = bases[0];
                for next in &bases[1..] {
                    virtual_base = self.virtual_base_commit(&virtual_base, next, depth + 1)?;
                }
                Ok(self.store.read_commit(&virtual_base)?.tree)
            }
        }
    }

    /// Merge two merge-base candidates into a deterministic virtual commit.
    fn virtual_base_commit(
        &self,
        a: &ObjectId,
        b: &ObjectId,
        depth: usize,
    ) -> MergeResult<ObjectId> {
        let base_tree = match self.implicit_base_tree(a, b, depth) {
            Ok(tree) => tree,
            // Unrelated bases merge against an empty tree.
            Err(MergeError::Base(BaseFailure::NoCommonAncestor)) => self.empty_tree()?,
            Err(e) => return Err(e),
        };

        let a_commit = self.store.read_commit(a)?;
        let b_commit = self.store.read_commit(b)?;

        let mut conflicts = Vec::new();
        let tree =
            self.merge_tree_ids(&base_tree, &a_commit.tree, &b_commit.tree, "", &mut conflicts)?;
        if !conflicts.is_empty() {
            return Err(MergeError::Base(BaseFailure::ConflictsDuringBaseMerge));
        }

        let when = a_commit.committer.when.max(b_commit.committer.when);
        let ident = Identity::new("merge base", "virtual@rill", when);
        let virtual_commit = Commit {
            tree,
            parents: vec![*a, *b],
            author: ident.clone(),
            committer: ident,
            message: format!("virtual merge base of {} and {}", a.abbrev(), b.abbrev()),
        };
        Ok(self.store.write(&virtual_commit.to_stored_object())?)
    }

    /// Three-way merge of tree objects; returns the merged tree id and
    /// accumulates conflicted paths.
    fn merge_tree_ids(
        &self,
        base: &ObjectId,
        ours: &ObjectId,
        theirs: &ObjectId,
        prefix: &str,
        conflicts: &mut Vec<String>,
    ) -> MergeResult<ObjectId> {
        if ours == theirs || base == theirs {
            return Ok(*ours);
        }
        if base == ours {
            return Ok(*theirs);
        }

        let base_tree = self.store.read_tree(base)?;
        let ours_tree = self.store.read_tree(ours)?;
        let theirs_tree = self.store.read_tree(theirs)?;

        let mut names: BTreeSet<&str> = BTreeSet::new();
        for tree in [&base_tree, &ours_tree, &theirs_tree] {
            names.extend(tree.entries().iter().map(|e| e.name.as_str()));
        }

        let mut entries: Vec<TreeEntry> = Vec::new();
        for name in names {
            let b = base_tree.entry(name);
            let o = ours_tree.entry(name);
            let t = theirs_tree.entry(name);
            let path = join_path(prefix, name);

            // Agreement and one-sided change resolve structurally.
            if o == t {
                entries.extend(o.cloned());
                continue;
            }
            if b == o {
                entries.extend(t.cloned());
                continue;
            }
            if b == t {
                entries.extend(o.cloned());
                continue;
            }

            // Both sides touched the path, divergently. The two-way
            // strategy stops here.
            if self.strategy == MergeStrategyKind::SimpleTwoWay {
                conflicts.push(path);
                continue;
            }

            match (o, t) {
                (Some(oe), Some(te)) if oe.is_tree() && te.is_tree() => {
                    let sub_base = match b {
                        Some(be) if be.is_tree() => be.id,
                        _ => self.empty_tree()?,
                    };
                    let merged = self.merge_tree_ids(&sub_base, &oe.id, &te.id, &path, conflicts)?;
                    if !self.store.read_tree(&merged)?.is_empty() {
                        entries.push(TreeEntry::new(EntryMode::Directory, name, merged));
                    }
                }
                (Some(oe), Some(te))
                    if !oe.is_tree()
                        && oe.mode == te.mode
                        && oe.mode != EntryMode::Symlink
                        && self.strategy.allows_content_merge() =>
                {
                    let base_data = match b {
                        Some(be) if !be.is_tree() && be.mode != EntryMode::Symlink => {
                            self.store.read_blob(&be.id)?.data
                        }
                        _ => Vec::new(),
                    };
                    let ours_data = self.store.read_blob(&oe.id)?.data;
                    let theirs_data = self.store.read_blob(&te.id)?.data;
                    match merge_text(&base_data, &ours_data, &theirs_data) {
                        ContentMerge::Merged(data) => {
                            let id = self.store.write(&Blob::new(data).to_stored_object())?;
                            entries.push(TreeEntry::new(oe.mode, name, id));
                        }
                        ContentMerge::Conflicted => conflicts.push(path),
                    }
                }
                // Delete/modify, type mismatch, mode divergence, symlinks.
                _ => conflicts.push(path),
            }
        }

        let merged = Tree::from_entries(entries);
        Ok(self.store.write(&merged.to_stored_object()?)?)
    }

    fn empty_tree(&self) -> MergeResult<ObjectId> {
        Ok(self.store.write(&Tree::empty().to_stored_object()?)?)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
