//! VersionChain - Version history of one row
//!
//! - Versions are kept in commit order
//! - Each version supersedes exactly the one before it
//! - No forks or branches

use super::{Version, VersionStamp};

/// The retained version history of a single row.
#[derive(Clone, Debug, Default)]
pub struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    /// Creates a new empty version chain.
    pub fn new() -> Self {
        Self {
            versions: Vec::new(),
        }
    }

    /// Returns the number of retained versions.
    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if this chain has no versions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Returns a slice of all retained versions, oldest first.
    ///
    /// This is a raw accessor. No visibility filtering is performed.
    #[inline]
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Returns the newest version, if any.
    pub fn latest(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Appends a version to this chain.
    ///
    /// Callers append in commit order; the write path is the only caller.
    pub fn push(&mut self, version: Version) {
        debug_assert!(self
            .versions
            .last()
            .map(|last| last.committed_at() <= version.committed_at())
            .unwrap_or(true));
        self.versions.push(version);
    }

    /// Removes versions no reader at or above `floor` can observe.
    ///
    /// The newest version committed at or below `floor` stays, since it is
    /// what a snapshot at `floor` resolves to. Returns how many versions were
    /// removed.
    pub fn prune_below(&mut self, floor: VersionStamp) -> usize {
        let keep_from = self
            .versions
            .iter()
            .rposition(|v| v.committed_at() <= floor)
            .unwrap_or(0);
        self.versions.drain(..keep_from).count()
    }

    /// Returns true if the row is deleted for every reader at or above `floor`.
    ///
    /// Such a chain holds nothing but a tombstone at or below the floor and can
    /// be dropped entirely.
    pub fn is_dead_at(&self, floor: VersionStamp) -> bool {
        match self.versions.as_slice() {
            [only] => only.is_tombstone() && only.committed_at() <= floor,
            _ => false,
        }
    }
}
