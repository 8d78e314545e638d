//! Three-way merge engine for the Rill integration engine.
//!
//! [`MergeStrategyKind`] maps project configuration to a named strategy;
//! [`Merger`] applies it: tree-level three-way merge with per-file diff3
//! content resolution, implicit merge-base computation (including virtual
//! bases for criss-cross histories under the recursive strategy), and
//! structured conflict reporting via [`MergeOutcome`].
//!
//! The engine inserts trees and blobs through the store handed to it but
//! never flushes; callers flush once per integration pass.

pub mod content;
pub mod error;
pub mod strategy;
pub mod three_way;

pub use content::ContentMerge;
pub use error::{BaseFailure, MergeError, MergeResult};
pub use strategy::MergeStrategyKind;
pub use three_way::{MergeOutcome, Merger};
