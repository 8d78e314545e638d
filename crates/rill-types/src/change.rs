use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object::ContentHasher;

/// Numeric id of a change under review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeId(pub u32);

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The stable `I`-prefixed key of a change, carried in `Change-Id` footers.
///
/// The key survives rebases and cherry-picks, unlike commit ids. Format:
/// `I` followed by 40 lowercase hex characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeKey(String);

impl ChangeKey {
    /// Validate and wrap an existing key string.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        let valid = key.len() == 41
            && key.starts_with('I')
            && key[1..].bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase());
        if !valid {
            return Err(TypeError::InvalidChangeKey(key));
        }
        Ok(Self(key))
    }

    /// Derive a key deterministically from seed bytes.
    pub fn derive(seed: &[u8]) -> Self {
        let id = ContentHasher::new("rill-change-key-v1").hash(seed);
        Self(format!("I{}", &id.to_hex()[..40]))
    }

    /// The full key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form (`I` plus 8 hex characters) for merge summaries.
    pub fn abbreviate(&self) -> &str {
        &self.0[..9]
    }
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one patch set of a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchSetId {
    pub change: ChangeId,
    pub number: u32,
}

impl PatchSetId {
    pub const fn new(change: ChangeId, number: u32) -> Self {
        Self { change, number }
    }

    /// The ref under which this patch set's commit is stored:
    /// `refs/changes/<NN>/<change>/<number>`, where `NN` is the change id
    /// modulo 100, zero-padded (sharding keeps ref directories small).
    pub fn ref_name(&self) -> String {
        format!(
            "refs/changes/{:02}/{}/{}",
            self.change.0 % 100,
            self.change,
            self.number
        )
    }

    /// Prefix shared by all patch-set refs of a change.
    pub fn ref_prefix(change: ChangeId) -> String {
        format!("refs/changes/{:02}/{}/", change.0 % 100, change)
    }

    /// Parse a patch-set id back out of its ref name.
    pub fn parse_ref(name: &str) -> Result<Self, TypeError> {
        let bad = || TypeError::InvalidPatchSetRef(name.to_string());
        let rest = name.strip_prefix("refs/changes/").ok_or_else(bad)?;
        let mut parts = rest.split('/');
        let shard = parts.next().ok_or_else(bad)?;
        let change: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let number: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        if parts.next().is_some() || shard.len() != 2 || shard.parse::<u32>() != Ok(change % 100) {
            return Err(bad());
        }
        Ok(Self::new(ChangeId(change), number))
    }
}

impl fmt::Display for PatchSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.change, self.number)
    }
}

/// Identifier of an approval label (e.g. `Code-Review`, `Verified`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelId(String);

impl LabelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The standard code-review label.
    pub fn code_review() -> Self {
        Self("Code-Review".to_string())
    }

    /// The standard verification label.
    pub fn verified() -> Self {
        Self("Verified".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Label names compare case-insensitively.
    pub fn is_code_review(&self) -> bool {
        self.0.eq_ignore_ascii_case("Code-Review")
    }

    pub fn is_verified(&self) -> bool {
        self.0.eq_ignore_ascii_case("Verified")
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn derived_key_is_valid() {
        let key = ChangeKey::derive(b"seed");
        assert_eq!(key.as_str().len(), 41);
        ChangeKey::new(key.as_str()).unwrap();
    }

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(ChangeKey::derive(b"a"), ChangeKey::derive(b"a"));
        assert_ne!(ChangeKey::derive(b"a"), ChangeKey::derive(b"b"));
    }

    #[test]
    fn key_rejects_bad_forms() {
        assert!(ChangeKey::new("deadbeef").is_err());
        assert!(ChangeKey::new("I123").is_err());
        // Uppercase hex is not canonical.
        let upper = format!("I{}", "A".repeat(40));
        assert!(ChangeKey::new(upper).is_err());
    }

    #[test]
    fn abbreviate_is_9_chars() {
        let key = ChangeKey::derive(b"abbrev");
        assert_eq!(key.abbreviate().len(), 9);
        assert!(key.as_str().starts_with(key.abbreviate()));
    }

    #[test]
    fn patch_set_ref_layout() {
        let ps = PatchSetId::new(ChangeId(4217), 3);
        assert_eq!(ps.ref_name(), "refs/changes/17/4217/3");
        assert_eq!(PatchSetId::ref_prefix(ChangeId(4217)), "refs/changes/17/4217/");
    }

    #[test]
    fn patch_set_ref_roundtrip() {
        let ps = PatchSetId::new(ChangeId(7), 12);
        assert_eq!(PatchSetId::parse_ref(&ps.ref_name()).unwrap(), ps);
    }

    #[test]
    fn parse_ref_rejects_garbage() {
        assert!(PatchSetId::parse_ref("refs/heads/main").is_err());
        assert!(PatchSetId::parse_ref("refs/changes/99/7/1").is_err()); // wrong shard
        assert!(PatchSetId::parse_ref("refs/changes/07/7/1/meta").is_err());
    }

    #[test]
    fn label_classification_ignores_case() {
        assert!(LabelId::new("code-review").is_code_review());
        assert!(LabelId::new("VERIFIED").is_verified());
        assert!(!LabelId::new("Custom-Label").is_code_review());
    }

    proptest! {
        #[test]
        fn any_patch_set_ref_roundtrips(change in 1u32..1_000_000, number in 1u32..10_000) {
            let ps = PatchSetId::new(ChangeId(change), number);
            prop_assert_eq!(PatchSetId::parse_ref(&ps.ref_name()).unwrap(), ps);
        }
    }
}
