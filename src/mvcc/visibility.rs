//! MVCC Visibility - snapshot isolation for row reads
//!
//! Given a snapshot fixed at version `S` and a row's version chain,
//! the visible version is:
//! 1. Consider only versions committed at or below `S`
//! 2. From those, select the most recently committed
//! 3. If that version is a tombstone, the row is invisible
//!
//! A snapshot never observes a commit newer than its version, and two reads
//! through the same snapshot always resolve a row to the same version.

use super::{Version, VersionChain, VersionStamp};

/// Result of visibility evaluation for a row.
#[derive(Debug, Clone, PartialEq)]
pub enum VisibilityResult<'a> {
    /// A visible row version exists
    Visible(&'a Version),
    /// Row is invisible (no version yet, or deleted)
    Invisible,
}

impl<'a> VisibilityResult<'a> {
    /// Returns the visible version if any
    pub fn version(&self) -> Option<&'a Version> {
        match self {
            VisibilityResult::Visible(v) => Some(v),
            VisibilityResult::Invisible => None,
        }
    }

    /// Returns true if visible
    pub fn is_visible(&self) -> bool {
        matches!(self, VisibilityResult::Visible(_))
    }
}

/// Stateless visibility resolver.
pub struct Visibility;

impl Visibility {
    /// Evaluates visibility of a row for a snapshot at `snapshot_version`.
    pub fn visible_version(chain: &VersionChain, snapshot_version: VersionStamp) -> VisibilityResult<'_> {
        // Chains are in commit order, so the last qualifying version wins.
        let visible = chain
            .versions()
            .iter()
            .rev()
            .find(|v| v.committed_at() <= snapshot_version);

        match visible {
            Some(version) if !version.is_tombstone() => VisibilityResult::Visible(version),
            _ => VisibilityResult::Invisible,
        }
    }
}
