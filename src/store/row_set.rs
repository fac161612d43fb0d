//! Row identities and evaluated row sets

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::mvcc::VersionStamp;

/// Stable identity of a row.
///
/// Row ids are allocated in insertion order and never reused, so they stay
/// valid across commits; only membership of a result may change.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(u64);

impl RowId {
    /// Wrap a raw row id.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row#{}", self.0)
    }
}

/// Ordered row ids matching a predicate, tagged with the version they were
/// computed against.
///
/// Immutable once produced. The id buffer is shared, so moving or cloning a
/// set between contexts never copies it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowIdSet {
    version: VersionStamp,
    rows: Arc<[RowId]>,
}

impl RowIdSet {
    /// Create a set computed against `version`.
    pub fn new(version: VersionStamp, rows: Vec<RowId>) -> Self {
        Self {
            version,
            rows: rows.into(),
        }
    }

    /// The version this set was computed against.
    #[inline]
    pub fn version(&self) -> VersionStamp {
        self.version
    }

    /// Row ids, in result order.
    #[inline]
    pub fn rows(&self) -> &[RowId] {
        &self.rows
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no row matched.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
