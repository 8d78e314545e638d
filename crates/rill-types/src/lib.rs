//! Foundation types for the Rill change-integration engine.
//!
//! This crate provides the identity and naming types used throughout the
//! engine. Every other Rill crate depends on `rill-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Content-addressed identifier (BLAKE3 hash)
//! - [`ContentHasher`] — Domain-separated hasher producing object ids
//! - [`Identity`] / [`Timestamp`] — Author and committer lines
//! - [`ChangeId`] / [`ChangeKey`] / [`PatchSetId`] — Review-side naming
//! - [`LabelId`] — Approval label identifiers

pub mod change;
pub mod error;
pub mod identity;
pub mod object;

pub use change::{ChangeId, ChangeKey, LabelId, PatchSetId};
pub use error::TypeError;
pub use identity::{Identity, Timestamp};
pub use object::{ContentHasher, ObjectId};
