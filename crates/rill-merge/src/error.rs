/// Why a merge base could not be produced.
///
/// Callers classify these rather than failing a whole pass: conflicts
/// while computing the base itself indicate a path conflict, every other
/// reason means the merge needs manual recursive handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseFailure {
    /// The two histories share no common ancestor.
    NoCommonAncestor,
    /// Multiple merge bases and the configured strategy cannot build a
    /// virtual base.
    MultipleBasesUnsupported,
    /// Virtual-base recursion exceeded its depth limit.
    TooManyBases,
    /// The bases conflicted while being merged into a virtual base.
    ConflictsDuringBaseMerge,
}

impl std::fmt::Display for BaseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCommonAncestor => write!(f, "no common ancestor"),
            Self::MultipleBasesUnsupported => write!(f, "multiple merge bases not supported"),
            Self::TooManyBases => write!(f, "too many merge bases"),
            Self::ConflictsDuringBaseMerge => write!(f, "conflicts during merge base computation"),
        }
    }
}

/// Errors from merge engine operations.
///
/// Note that content conflicts are *not* errors: they come back as
/// [`MergeOutcome::Conflicts`](crate::MergeOutcome). These are faults and
/// configuration mistakes.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A strategy name from configuration is not recognized.
    #[error("invalid merge strategy: {0}")]
    UnknownStrategy(String),

    /// The strategy cannot perform three-way merges.
    #[error("merge strategy {0} does not support three-way merging")]
    NotThreeWay(&'static str),

    /// No usable merge base.
    #[error("merge base failure: {0}")]
    Base(BaseFailure),

    /// Error from the object store.
    #[error(transparent)]
    Store(#[from] rill_store::StoreError),

    /// Error from graph traversal.
    #[error(transparent)]
    Graph(#[from] rill_graph::GraphError),
}

/// Result alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
