//! Store errors
//!
//! Error codes:
//! - AERO_INVALID_PREDICATE (caller error, not retryable)
//! - AERO_INVALID_DOCUMENT (caller error on the write path)
//! - AERO_SNAPSHOT_UNAVAILABLE (consistency failure, fatal for the attempt)
//! - AERO_DIVERGENT_HISTORY (consistency failure, fatal for the attempt)
//! - AERO_ROW_NOT_FOUND
//! - AERO_STORE_INTERNAL

use thiserror::Error;

use super::RowId;
use crate::mvcc::VersionStamp;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a versioned store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Predicate does not fit the table schema
    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    /// Document does not fit the table schema
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Requested snapshot version is not retained
    #[error("Snapshot at {requested} unavailable (retained {horizon}..={current})")]
    SnapshotUnavailable {
        requested: VersionStamp,
        horizon: VersionStamp,
        current: VersionStamp,
    },

    /// `from` is not an ancestor of `to`
    #[error("Divergent history: cannot import from {from} into {to}")]
    DivergentHistory { from: VersionStamp, to: VersionStamp },

    /// Row does not exist at the write version
    #[error("Row not found: {0}")]
    RowNotFound(RowId),

    /// Internal store failure
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidPredicate(_) => "AERO_INVALID_PREDICATE",
            StoreError::InvalidDocument(_) => "AERO_INVALID_DOCUMENT",
            StoreError::SnapshotUnavailable { .. } => "AERO_SNAPSHOT_UNAVAILABLE",
            StoreError::DivergentHistory { .. } => "AERO_DIVERGENT_HISTORY",
            StoreError::RowNotFound(_) => "AERO_ROW_NOT_FOUND",
            StoreError::Internal(_) => "AERO_STORE_INTERNAL",
        }
    }

    /// Store errors never resolve by re-running the same attempt.
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub(crate) fn lock_poisoned() -> Self {
        StoreError::Internal("Lock poisoned".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::InvalidPredicate("x".into()).code(),
            "AERO_INVALID_PREDICATE"
        );
        assert_eq!(
            StoreError::DivergentHistory {
                from: VersionStamp::new(3),
                to: VersionStamp::new(2),
            }
            .code(),
            "AERO_DIVERGENT_HISTORY"
        );
    }

    #[test]
    fn test_snapshot_unavailable_display() {
        let err = StoreError::SnapshotUnavailable {
            requested: VersionStamp::new(1),
            horizon: VersionStamp::new(4),
            current: VersionStamp::new(9),
        };
        assert_eq!(err.to_string(), "Snapshot at v1 unavailable (retained v4..=v9)");
        assert!(!err.is_retryable());
    }
}
