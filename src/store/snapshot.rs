//! Snapshot - Immutable view of a store fixed at one version
//!
//! - Established when opened, never changes afterwards
//! - Never observes commits newer than its version
//! - Keeps its version retained until the last clone is dropped

use std::sync::Arc;

use crate::mvcc::{SnapshotPin, VersionStamp};

/// An immutable view of a store at a fixed version.
///
/// Clones share one pin; history needed by the snapshot stays retained
/// while any clone is alive.
#[derive(Clone, Debug)]
pub struct Snapshot {
    version: VersionStamp,
    pin: Option<Arc<SnapshotPin>>,
}

impl Snapshot {
    /// Create a snapshot that keeps `pin` alive.
    pub fn pinned(pin: SnapshotPin) -> Self {
        Self {
            version: pin.version(),
            pin: Some(Arc::new(pin)),
        }
    }

    /// Create a snapshot for a store that never reclaims history.
    pub fn unpinned(version: VersionStamp) -> Self {
        Self { version, pin: None }
    }

    /// The version this snapshot is fixed at.
    #[inline]
    pub fn version(&self) -> VersionStamp {
        self.version
    }

    /// Returns true if this snapshot holds a retention pin.
    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }
}
