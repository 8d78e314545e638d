use rill_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, Commit, StoredObject, Tree};

/// Content-addressed object store.
///
/// Invariants all implementations must satisfy:
/// - Objects are immutable once written; the same data always produces the
///   same id, so writes are idempotent.
/// - Concurrent reads are always safe.
/// - The store never interprets object contents.
/// - I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by id. `Ok(None)` means the object does not exist;
    /// `Err` is an I/O failure or corruption.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed id. A no-op if the
    /// object already exists.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Whether an object exists.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.read(id)?.is_some())
    }

    /// Write several objects; backends may override to batch I/O.
    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }

    /// Resolve an id that must name a commit. Absence is a hard error.
    fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        let obj = self.read(id)?.ok_or(StoreError::NotFound(*id))?;
        Commit::from_stored_object(&obj)
    }

    /// Resolve an id that must name a tree. Absence is a hard error.
    fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        let obj = self.read(id)?.ok_or(StoreError::NotFound(*id))?;
        Tree::from_stored_object(&obj)
    }

    /// Resolve an id that must name a blob. Absence is a hard error.
    fn read_blob(&self, id: &ObjectId) -> StoreResult<Blob> {
        let obj = self.read(id)?.ok_or(StoreError::NotFound(*id))?;
        Blob::from_stored_object(&obj)
    }
}
