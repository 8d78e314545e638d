//! Change integration for the Rill version-control system.
//!
//! Given a destination branch tip and a set of candidate commits, this
//! crate decides how each candidate becomes part of the branch history
//! (fast-forward, three-way merge, cherry-pick, or rebase) and writes the
//! resulting immutable commit objects with correct parentage, tree
//! content, and composed messages.
//!
//! The pieces:
//!
//! - [`IntegrationSorter`] — dependency filtering, topological ordering,
//!   and mergeability classification against a mutable [`BranchTip`];
//! - [`CommitWriter`] — merge, cherry-pick, and rebase commit
//!   construction, plus the end-of-pass clean-merge sweep;
//! - [`MessageComposer`] — footer injection and the pluggable
//!   message-modifier chain;
//! - [`RebaseChangeOp`] — a single-change rebase sequenced over the
//!   external transaction framework's three phases ([`BatchOp`]);
//! - [`SubmitPass`] — the batch driver tying the above together.
//!
//! Per-commit outcomes of a batch land in a pass-scoped [`StatusLedger`]
//! rather than aborting the pass; single-change operations surface typed
//! [`IntegrateError`]s and flush nothing. This crate takes no locks:
//! concurrent writers to one branch are serialized by the caller, and a
//! contended pass re-runs from scratch on a fresh tip.

pub mod approvals;
pub mod batch;
pub mod candidate;
pub mod config;
pub mod error;
pub mod message;
pub mod rebase;
pub mod sorter;
pub mod status;
pub mod submit;
pub mod writer;

pub use approvals::{Account, AccountDirectory, AccountId, Approval, ApprovalsProvider};
pub use batch::{BatchOp, ChangeContext, EventSink, PostUpdateContext, RefReader, RepoContext, ReviewStore};
pub use candidate::{BranchName, BranchTip, Candidate, CandidateSet};
pub use config::{EngineConfig, LabelType, ProjectConfig};
pub use error::{IntegrateError, SubmitResult};
pub use message::{Footer, MessageComposer, MessageModifier, footer_lines};
pub use rebase::{PatchSet, PatchSetInserter, RebaseChangeOp};
pub use sorter::IntegrationSorter;
pub use status::{CommitStatus, StatusLedger};
pub use submit::{PassOutcome, SubmitPass};
pub use writer::{CommitWriter, TreeProcessor};
