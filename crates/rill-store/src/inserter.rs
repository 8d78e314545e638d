use std::collections::HashMap;
use std::sync::RwLock;

use rill_types::ObjectId;
use tracing::debug;

use crate::error::StoreResult;
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Pass-scoped write buffer over an [`ObjectStore`].
///
/// All objects created during one integration pass are inserted here and
/// flushed to the backing store exactly once, at the end of the pass.
/// Reads fall through to the backing store, so the inserter sees both
/// flushed history and its own unflushed objects; no other reader sees
/// the latter.
///
/// Dropping the inserter without calling [`flush`](Self::flush) discards
/// the buffered objects, which is exactly what a failed single-change
/// operation wants.
pub struct BufferedInserter<'a> {
    store: &'a dyn ObjectStore,
    pending: RwLock<PendingObjects>,
}

#[derive(Default)]
struct PendingObjects {
    by_id: HashMap<ObjectId, StoredObject>,
    order: Vec<ObjectId>,
}

impl<'a> BufferedInserter<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            pending: RwLock::new(PendingObjects::default()),
        }
    }

    /// Number of objects buffered and not yet flushed.
    pub fn pending(&self) -> usize {
        self.pending.read().expect("lock poisoned").order.len()
    }

    /// Write every buffered object to the backing store, in insertion
    /// order, and clear the buffer. Returns how many objects were flushed.
    pub fn flush(&self) -> StoreResult<usize> {
        let mut pending = self.pending.write().expect("lock poisoned");
        let batch: Vec<StoredObject> = pending
            .order
            .iter()
            .filter_map(|id| pending.by_id.get(id).cloned())
            .collect();
        self.store.write_batch(&batch)?;
        let count = batch.len();
        pending.by_id.clear();
        pending.order.clear();
        if count > 0 {
            debug!(count, "flushed buffered objects");
        }
        Ok(count)
    }
}

impl ObjectStore for BufferedInserter<'_> {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        {
            let pending = self.pending.read().expect("lock poisoned");
            if let Some(obj) = pending.by_id.get(id) {
                return Ok(Some(obj.clone()));
            }
        }
        self.store.read(id)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let mut pending = self.pending.write().expect("lock poisoned");
        if !pending.by_id.contains_key(&id) && !self.store.exists(&id)? {
            pending.by_id.insert(id, object.clone());
            pending.order.push(id);
        }
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        if self.pending.read().expect("lock poisoned").by_id.contains_key(id) {
            return Ok(true);
        }
        self.store.exists(id)
    }
}
