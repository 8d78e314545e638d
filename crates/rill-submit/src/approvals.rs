use rill_types::{LabelId, PatchSetId};

use crate::error::SubmitResult;

/// Numeric account id, resolved to an [`Account`] through an
/// [`AccountDirectory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccountId(pub u32);

/// A user record as far as message composition cares: either field may be
/// missing, and a voter with neither is skipped entirely.
#[derive(Clone, Debug, Default)]
pub struct Account {
    pub full_name: Option<String>,
    pub preferred_email: Option<String>,
}

/// One vote on a patch set.
#[derive(Clone, Debug)]
pub struct Approval {
    pub account: AccountId,
    pub label: LabelId,
    /// Vote value; only positive votes produce footers.
    pub value: i16,
    /// When the vote was granted (epoch seconds).
    pub granted: i64,
    /// Submit votes are handled by the submit flow, not as footers.
    pub is_submit: bool,
}

/// Read-only source of approvals for a patch set.
///
/// Failures here degrade message composition (the reviewer footers are
/// skipped) rather than failing the integration.
pub trait ApprovalsProvider {
    fn by_patch_set(&self, patch_set: &PatchSetId) -> SubmitResult<Vec<Approval>>;
}

/// Resolves account ids to account records.
pub trait AccountDirectory {
    /// `None` when the account is unknown; such voters are skipped.
    fn account(&self, id: AccountId) -> Option<Account>;
}
