use rill_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An object that was explicitly resolved by id does not exist.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The object exists but is not the expected kind.
    #[error("object {id} is a {actual}, expected {expected}")]
    WrongKind {
        id: ObjectId,
        expected: &'static str,
        actual: &'static str,
    },

    /// The object data cannot be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Serialization failure while encoding an object.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An object exceeds the configured size ceiling.
    ///
    /// Classification paths treat this as "not mergeable" rather than a
    /// fault; see the integration sorter.
    #[error("object {id} too large: {size} bytes")]
    TooLarge { id: ObjectId, size: u64 },

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
