//! MVCC Garbage Collection bookkeeping
//!
//! A version may be removed only if no snapshot can still observe it.
//! Snapshots pin their version in the `VisibilityFloor` while alive; the
//! oldest pin (or the current version when nothing is pinned) is the floor
//! below which history may be reclaimed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::VersionStamp;

/// Counted set of versions pinned by live snapshots.
///
/// Several snapshots may share a version, so pins are reference counted
/// rather than set-based.
#[derive(Debug, Default)]
pub struct VisibilityFloor {
    pins: BTreeMap<VersionStamp, usize>,
}

impl VisibilityFloor {
    /// Create a floor with no pinned versions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more reader of `version`.
    pub fn pin(&mut self, version: VersionStamp) {
        *self.pins.entry(version).or_insert(0) += 1;
    }

    /// Release one reader of `version`.
    pub fn unpin(&mut self, version: VersionStamp) {
        if let Some(count) = self.pins.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(&version);
            }
        }
    }

    /// Oldest pinned version, if any snapshot is alive.
    pub fn lower_bound(&self) -> Option<VersionStamp> {
        self.pins.keys().next().copied()
    }

    /// Number of live pins across all versions.
    pub fn pinned_count(&self) -> usize {
        self.pins.values().sum()
    }

    /// The version below which history may be reclaimed.
    pub fn collection_floor(&self, current: VersionStamp) -> VersionStamp {
        match self.lower_bound() {
            Some(oldest) => oldest.min(current),
            None => current,
        }
    }
}

/// RAII pin of one version in a shared floor.
///
/// Dropping the pin releases the version for collection.
#[derive(Debug)]
pub struct SnapshotPin {
    floor: Arc<Mutex<VisibilityFloor>>,
    version: VersionStamp,
}

impl SnapshotPin {
    /// Pin `version` in `floor` until the returned guard is dropped.
    pub fn acquire(floor: &Arc<Mutex<VisibilityFloor>>, version: VersionStamp) -> Self {
        floor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pin(version);
        Self {
            floor: Arc::clone(floor),
            version,
        }
    }

    /// The pinned version.
    pub fn version(&self) -> VersionStamp {
        self.version
    }
}

impl Drop for SnapshotPin {
    fn drop(&mut self) {
        self.floor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unpin(self.version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_floor_uses_current() {
        let floor = VisibilityFloor::new();
        assert_eq!(floor.lower_bound(), None);
        assert_eq!(floor.collection_floor(VersionStamp::new(8)), VersionStamp::new(8));
    }

    #[test]
    fn test_oldest_pin_bounds_collection() {
        let mut floor = VisibilityFloor::new();
        floor.pin(VersionStamp::new(5));
        floor.pin(VersionStamp::new(3));
        floor.pin(VersionStamp::new(3));

        assert_eq!(floor.lower_bound(), Some(VersionStamp::new(3)));
        assert_eq!(floor.pinned_count(), 3);

        floor.unpin(VersionStamp::new(3));
        assert_eq!(floor.lower_bound(), Some(VersionStamp::new(3)));

        floor.unpin(VersionStamp::new(3));
        assert_eq!(floor.lower_bound(), Some(VersionStamp::new(5)));
    }

    #[test]
    fn test_unpin_unknown_version_is_ignored() {
        let mut floor = VisibilityFloor::new();
        floor.unpin(VersionStamp::new(1));
        assert_eq!(floor.pinned_count(), 0);
    }

    #[test]
    fn test_snapshot_pin_releases_on_drop() {
        let floor = Arc::new(Mutex::new(VisibilityFloor::new()));
        {
            let pin = SnapshotPin::acquire(&floor, VersionStamp::new(2));
            assert_eq!(pin.version(), VersionStamp::new(2));
            assert_eq!(floor.lock().unwrap().pinned_count(), 1);
        }
        assert_eq!(floor.lock().unwrap().pinned_count(), 0);
    }
}
