use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in time as recorded in commit objects: epoch seconds plus the
/// recording clock's UTC offset in minutes.
///
/// The offset is part of the canonical encoding, so two commits that differ
/// only in time zone hash differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Offset from UTC in minutes (e.g. +120 for UTC+2).
    pub offset_minutes: i16,
}

impl Timestamp {
    /// Create a timestamp from epoch seconds and a UTC offset in minutes.
    pub const fn new(seconds: i64, offset_minutes: i16) -> Self {
        Self {
            seconds,
            offset_minutes,
        }
    }

    /// The epoch itself, UTC.
    pub const fn epoch() -> Self {
        Self::new(0, 0)
    }

    /// Canonical `<seconds> <±HHMM>` rendering used in identity lines.
    pub fn canonical(&self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.unsigned_abs();
        format!("{} {}{:02}{:02}", self.seconds, sign, abs / 60, abs % 60)
    }
}

/// An author or committer identity: display name, email, and the time the
/// identity was recorded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub when: Timestamp,
}

impl Identity {
    /// Create an identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: Timestamp) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    /// This identity with its timestamp (and zone) replaced.
    ///
    /// Used when author dates must match the committer's.
    pub fn with_when(&self, when: Timestamp) -> Self {
        Self {
            name: self.name.clone(),
            email: self.email.clone(),
            when,
        }
    }

    /// Canonical `Name <email> <seconds> <±HHMM>` line.
    ///
    /// This is the exact form fed into the commit hash, so any change to
    /// name, email, time, or zone changes the commit id.
    pub fn canonical_line(&self) -> String {
        format!("{} <{}> {}", self.name, self.email, self.when.canonical())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
