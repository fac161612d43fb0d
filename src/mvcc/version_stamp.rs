//! VersionStamp - Totally ordered store version
//!
//! - Identifies exactly one committed state of a store
//! - Non-decreasing over the lifetime of a store handle
//! - Advances only when a write transaction commits
//!
//! This is a PURE TYPE with NO behavior beyond construction, access and ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque, totally ordered identity of a committed store state.
///
/// Version zero is the empty store before any commit.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionStamp(u64);

impl VersionStamp {
    /// The version of a store that has never committed.
    pub const INITIAL: VersionStamp = VersionStamp(0);

    /// Creates a new VersionStamp with the given value.
    ///
    /// No Default implementation exists to prevent accidental construction.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    ///
    /// This accessor exists for logging and serialization only.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the stamp that the next commit will carry.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_stamp_requires_explicit_construction() {
        let stamp = VersionStamp::new(42);
        assert_eq!(stamp.value(), 42);
    }

    #[test]
    fn test_version_stamp_ordering() {
        let older = VersionStamp::new(3);
        let newer = VersionStamp::new(4);

        assert!(older < newer);
        assert_eq!(older.next(), newer);
        assert!(VersionStamp::INITIAL < older);
    }

    #[test]
    fn test_version_stamp_display() {
        assert_eq!(VersionStamp::new(7).to_string(), "v7");
    }

    #[test]
    fn test_version_stamp_serializes_as_integer() {
        let json = serde_json::to_string(&VersionStamp::new(12)).unwrap();
        assert_eq!(json, "12");

        let back: VersionStamp = serde_json::from_str("12").unwrap();
        assert_eq!(back, VersionStamp::new(12));
    }
}
