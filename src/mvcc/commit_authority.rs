//! Commit Authority - version assignment for write transactions
//!
//! - Versions are assigned exactly once, at commit
//! - The ordering is total and strict
//! - A version that was never marked committed does not exist
//!
//! The authority is owned by the store's write path. Readers never consult it
//! directly; they observe the published version through the store.

use thiserror::Error;

use crate::mvcc::VersionStamp;

/// Assigns versions to commits in strict order.
#[derive(Debug)]
pub struct CommitAuthority {
    /// The highest version that has been committed.
    highest: u64,
}

impl CommitAuthority {
    /// Create a new authority for an empty store.
    pub fn new() -> Self {
        Self { highest: 0 }
    }

    /// Create an authority resuming after an already committed version.
    pub fn resume_from(version: VersionStamp) -> Self {
        Self {
            highest: version.value(),
        }
    }

    /// Get the version the next commit must carry.
    ///
    /// The version is only valid once `mark_committed` accepted it.
    pub fn next_version(&self) -> VersionStamp {
        VersionStamp::new(self.highest + 1)
    }

    /// Mark a version as committed.
    ///
    /// The version must be exactly one past the current highest.
    pub fn mark_committed(&mut self, version: VersionStamp) -> Result<(), CommitAuthorityError> {
        let expected = self.highest + 1;
        if version.value() != expected {
            return Err(CommitAuthorityError::OutOfOrder {
                attempted: version.value(),
                expected,
            });
        }
        self.highest = version.value();
        Ok(())
    }

    /// Get the current committed version.
    pub fn current(&self) -> VersionStamp {
        VersionStamp::new(self.highest)
    }
}

impl Default for CommitAuthority {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from commit authority operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitAuthorityError {
    /// Attempted to commit out of order.
    #[error("Out of order commit: attempted {attempted} but expected {expected}")]
    OutOfOrder {
        attempted: u64,
        expected: u64,
    },
}
