use std::collections::HashMap;

use rill_types::{ChangeId, ChangeKey, ObjectId, PatchSetId};

/// A pending commit under consideration, with its review-side identity.
///
/// The commit value itself stays immutable in the store; this is the back
/// reference from a commit to the change and patch set it came from.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub commit: ObjectId,
    pub key: ChangeKey,
    pub patch_set: PatchSetId,
    pub topic: Option<String>,
}

impl Candidate {
    pub fn new(
        commit: ObjectId,
        key: ChangeKey,
        patch_set: PatchSetId,
        topic: Option<String>,
    ) -> Self {
        Self {
            commit,
            key,
            patch_set,
            topic,
        }
    }

    pub fn change(&self) -> ChangeId {
        self.patch_set.change
    }
}

/// The candidate commits of one integration pass, indexed by commit id.
#[derive(Debug, Default)]
pub struct CandidateSet {
    by_commit: HashMap<ObjectId, Candidate>,
}

impl CandidateSet {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            by_commit: candidates.into_iter().map(|c| (c.commit, c)).collect(),
        }
    }

    pub fn contains(&self, commit: &ObjectId) -> bool {
        self.by_commit.contains_key(commit)
    }

    pub fn get(&self, commit: &ObjectId) -> Option<&Candidate> {
        self.by_commit.get(commit)
    }

    pub fn commits(&self) -> impl Iterator<Item = &ObjectId> {
        self.by_commit.keys()
    }

    pub fn len(&self) -> usize {
        self.by_commit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_commit.is_empty()
    }
}

/// The destination branch's head for the duration of one pass.
///
/// `None` represents an unborn branch. The tip only ever advances: each
/// accepted integration moves it to a commit that has the previous tip in
/// its history. The starting point is remembered so the pass can tell
/// newly accepted commits from prior history.
#[derive(Clone, Debug)]
pub struct BranchTip {
    initial: Option<ObjectId>,
    current: Option<ObjectId>,
}

impl BranchTip {
    pub fn new(current: Option<ObjectId>) -> Self {
        Self {
            initial: current,
            current,
        }
    }

    pub fn current(&self) -> Option<ObjectId> {
        self.current
    }

    /// The tip as it was when the pass began.
    pub fn initial(&self) -> Option<ObjectId> {
        self.initial
    }

    pub fn is_unborn(&self) -> bool {
        self.current.is_none()
    }

    /// Advance to a new head.
    pub fn advance(&mut self, commit: ObjectId) {
        self.current = Some(commit);
    }
}

/// A destination branch name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchName(String);

impl BranchName {
    /// The primary branch; merge summaries do not mention it.
    pub const PRIMARY: &'static str = "refs/heads/main";

    /// Accepts either a full ref (`refs/heads/x`) or a short name (`x`).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.starts_with("refs/") {
            Self(name)
        } else {
            Self(format!("refs/heads/{name}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name without the `refs/heads/` prefix.
    pub fn short_name(&self) -> &str {
        self.0.strip_prefix("refs/heads/").unwrap_or(&self.0)
    }

    pub fn is_primary(&self) -> bool {
        self.0 == Self::PRIMARY
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 32])
    }

    fn candidate(b: u8, change: u32) -> Candidate {
        Candidate::new(
            oid(b),
            ChangeKey::derive(&[b]),
            PatchSetId::new(ChangeId(change), 1),
            None,
        )
    }

    #[test]
    fn candidate_set_lookup() {
        let set = CandidateSet::new(vec![candidate(1, 100), candidate(2, 200)]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&oid(1)));
        assert!(!set.contains(&oid(9)));
        assert_eq!(set.get(&oid(2)).unwrap().change(), ChangeId(200));
    }

    #[test]
    fn tip_remembers_where_it_started() {
        let mut tip = BranchTip::new(Some(oid(1)));
        tip.advance(oid(2));
        tip.advance(oid(3));
        assert_eq!(tip.initial(), Some(oid(1)));
        assert_eq!(tip.current(), Some(oid(3)));
    }

    #[test]
    fn unborn_tip() {
        let mut tip = BranchTip::new(None);
        assert!(tip.is_unborn());
        tip.advance(oid(5));
        assert!(!tip.is_unborn());
        assert_eq!(tip.initial(), None);
    }

    #[test]
    fn branch_names_normalize() {
        assert_eq!(BranchName::new("main").as_str(), "refs/heads/main");
        assert_eq!(BranchName::new("refs/heads/dev").short_name(), "dev");
        assert!(BranchName::new("main").is_primary());
        assert!(!BranchName::new("stable-1.2").is_primary());
    }
}
