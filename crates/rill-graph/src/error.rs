use rill_types::ObjectId;

/// Errors from revision graph traversal.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A walked commit references a parent that is not in the store.
    #[error("commit {child} references missing parent {parent}")]
    MissingParent { child: ObjectId, parent: ObjectId },

    /// Error from the underlying object store.
    #[error(transparent)]
    Store(#[from] rill_store::StoreError),
}

/// Result alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
