use rill_types::ObjectId;

/// Errors surfaced by integration operations.
///
/// Two families live here. Expected single-change outcomes (conflict,
/// already merged, already up to date) abort that operation with a typed
/// error before anything is flushed. Faults wrap unexpected store or graph
/// failures and are never swallowed. During a batch pass the expected
/// family is recorded as per-commit status instead of being raised; see
/// the sorter and writer.
#[derive(Debug, thiserror::Error)]
pub enum IntegrateError {
    /// The merge produced conflicts; the paths that refused are listed.
    #[error("merge conflict(s): {}", .paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    /// A cherry-pick or rebase produced a tree identical to the tip's and
    /// identical results were not explicitly permitted.
    #[error("identical tree")]
    IdenticalTree,

    /// The commit is already an ancestor of the destination tip.
    #[error("'{0}' has already been merged")]
    AlreadyMerged(ObjectId),

    /// A rebase was requested onto the commit's current base. Terminal;
    /// retrying cannot succeed.
    #[error("change is already up to date")]
    AlreadyUpToDate,

    /// A prerequisite commit is in neither the candidate set nor the
    /// destination history.
    #[error("missing dependency {0}")]
    MissingDependency(ObjectId),

    /// Bad merge strategy, plugin contract violation, or similar
    /// misconfiguration. Not retryable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An accessor or phase was invoked before its prerequisite phase
    /// completed.
    #[error("out of phase: {0}")]
    OutOfPhase(&'static str),

    /// Unexpected failure from the store, graph, or a collaborator.
    #[error("integration fault: {0}")]
    Fault(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntegrateError {
    /// Wrap an ad hoc failure description as a fault.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into().into())
    }
}

impl From<rill_store::StoreError> for IntegrateError {
    fn from(e: rill_store::StoreError) -> Self {
        Self::Fault(Box::new(e))
    }
}

impl From<rill_graph::GraphError> for IntegrateError {
    fn from(e: rill_graph::GraphError) -> Self {
        Self::Fault(Box::new(e))
    }
}

/// Result alias for integration operations.
pub type SubmitResult<T> = Result<T, IntegrateError>;
