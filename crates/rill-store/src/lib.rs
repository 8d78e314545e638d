//! Content-addressed object storage for the Rill integration engine.
//!
//! Three object kinds exist: [`Blob`] (raw file content), [`Tree`]
//! (directory listing), and [`Commit`] (history node). All are immutable
//! once written; ids are BLAKE3 hashes of each kind's canonical encoding.
//!
//! The [`BufferedInserter`] wraps any [`ObjectStore`] with pass-scoped
//! write buffering: objects created during an integration pass stay
//! invisible to other readers until the caller flushes once at the end.

pub mod error;
pub mod inserter;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use inserter::BufferedInserter;
pub use memory::InMemoryObjectStore;
pub use object::{Blob, Commit, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry};
pub use traits::ObjectStore;
