//! Revision graph traversal for the Rill integration engine.
//!
//! [`RevWalk`] walks commit history held in any
//! [`ObjectStore`](rill_store::ObjectStore): mark commits of interest with
//! [`mark_start`](RevWalk::mark_start), cut the walk off with
//! [`mark_uninteresting`](RevWalk::mark_uninteresting), and enumerate the
//! visible commits in topological order. Ancestry queries
//! ([`is_merged_into`](RevWalk::is_merged_into)) and merge-base computation
//! ([`merge_bases`](RevWalk::merge_bases)) share the same loaded-commit
//! cache.

pub mod error;
pub mod walker;

pub use error::{GraphError, GraphResult};
pub use walker::{RevWalk, WalkOrder};
