//! In-memory versioned store
//!
//! Every row keeps its full version chain until garbage collection proves
//! no snapshot can observe the older versions. The latest committed version
//! is published through an atomic so `current_version` never takes a lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::filters::PredicateFilter;
use super::predicate::Predicate;
use super::row_set::{RowId, RowIdSet};
use super::schema::TableSchema;
use super::snapshot::Snapshot;
use super::VersionedStore;
use crate::mvcc::{
    CommitAuthority, SnapshotPin, Version, VersionChain, VersionStamp, Visibility,
    VisibilityFloor,
};
use crate::observability::{log_event_with_fields, Event};

#[derive(Debug)]
struct StoreState {
    authority: CommitAuthority,
    rows: BTreeMap<RowId, VersionChain>,
    next_row_id: u64,
    /// Oldest version whose history is still complete.
    horizon: VersionStamp,
}

impl StoreState {
    fn check_retained(&self, requested: VersionStamp) -> StoreResult<()> {
        let current = self.authority.current();
        if requested < self.horizon || requested > current {
            return Err(StoreError::SnapshotUnavailable {
                requested,
                horizon: self.horizon,
                current,
            });
        }
        Ok(())
    }

    fn visible(&self, row: RowId, at: VersionStamp) -> Option<&Arc<Value>> {
        let chain = self.rows.get(&row)?;
        Visibility::visible_version(chain, at)
            .version()
            .and_then(Version::document)
    }
}

/// Outcome of one garbage collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
    /// Superseded versions removed from chains
    pub reclaimed_versions: usize,
    /// Rows whose whole history was a reclaimed tombstone
    pub dropped_rows: usize,
    /// Oldest version snapshots can still be opened at
    pub horizon: VersionStamp,
}

/// A single-table, in-memory store with MVCC history.
#[derive(Debug)]
pub struct MemoryStore {
    schema: TableSchema,
    state: RwLock<StoreState>,
    published: AtomicU64,
    floor: Arc<Mutex<VisibilityFloor>>,
}

impl MemoryStore {
    /// Create an empty store for `schema`.
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            state: RwLock::new(StoreState {
                authority: CommitAuthority::new(),
                rows: BTreeMap::new(),
                next_row_id: 1,
                horizon: VersionStamp::INITIAL,
            }),
            published: AtomicU64::new(VersionStamp::INITIAL.value()),
            floor: Arc::new(Mutex::new(VisibilityFloor::new())),
        }
    }

    /// The table schema.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Run a write transaction and commit it.
    ///
    /// A transaction that staged at least one change commits and advances
    /// the version by exactly one. If `f` fails, or staged nothing, no
    /// commit happens and the current version is returned unchanged.
    pub fn write<F>(&self, f: F) -> StoreResult<VersionStamp>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> StoreResult<()>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::lock_poisoned())?;

        let (staged, next_row_id) = {
            let mut txn = WriteTransaction::new(&self.schema, &state);
            f(&mut txn)?;
            (txn.staged, txn.next_row_id)
        };

        if staged.is_empty() {
            return Ok(state.authority.current());
        }

        let version = state.authority.next_version();
        state
            .authority
            .mark_committed(version)
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let changes = staged.len();
        for (row, change) in staged {
            let entry = state.rows.entry(row).or_default();
            match change {
                Some(document) => entry.push(Version::with_document(document, version)),
                None => entry.push(Version::with_tombstone(version)),
            }
        }
        state.next_row_id = next_row_id;
        self.published.store(version.value(), Ordering::Release);
        drop(state);

        log_event_with_fields(
            Event::StoreCommit,
            &[
                ("changes", changes.to_string().as_str()),
                ("table", self.schema.name.as_str()),
                ("version", version.to_string().as_str()),
            ],
        );
        Ok(version)
    }

    /// Reclaim history no live snapshot can observe.
    pub fn collect_garbage(&self) -> StoreResult<GcReport> {
        let mut state = self.state.write().map_err(|_| StoreError::lock_poisoned())?;
        let floor = self
            .floor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .collection_floor(state.authority.current());

        let mut reclaimed_versions = 0;
        for chain in state.rows.values_mut() {
            reclaimed_versions += chain.prune_below(floor);
        }
        let before = state.rows.len();
        state.rows.retain(|_, chain| !chain.is_dead_at(floor));
        let dropped_rows = before - state.rows.len();
        if floor > state.horizon {
            state.horizon = floor;
        }

        let report = GcReport {
            reclaimed_versions,
            dropped_rows,
            horizon: state.horizon,
        };
        drop(state);

        log_event_with_fields(
            Event::StoreGarbageCollected,
            &[
                ("dropped_rows", dropped_rows.to_string().as_str()),
                ("horizon", report.horizon.to_string().as_str()),
                ("reclaimed_versions", reclaimed_versions.to_string().as_str()),
            ],
        );
        Ok(report)
    }

    /// Number of snapshot pins currently alive.
    pub fn pinned_snapshots(&self) -> usize {
        self.floor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pinned_count()
    }

    /// Number of rows live at the current version.
    pub fn live_rows(&self) -> StoreResult<usize> {
        let state = self.state.read().map_err(|_| StoreError::lock_poisoned())?;
        let current = state.authority.current();
        Ok(state
            .rows
            .keys()
            .filter(|row| state.visible(**row, current).is_some())
            .count())
    }
}

impl VersionedStore for MemoryStore {
    fn current_version(&self) -> VersionStamp {
        VersionStamp::new(self.published.load(Ordering::Acquire))
    }

    fn open_snapshot(&self, version: Option<VersionStamp>) -> StoreResult<Snapshot> {
        // Holding the read lock while pinning keeps GC from racing the open.
        let state = self.state.read().map_err(|_| StoreError::lock_poisoned())?;
        let version = version.unwrap_or_else(|| state.authority.current());
        state.check_retained(version)?;
        let snapshot = Snapshot::pinned(SnapshotPin::acquire(&self.floor, version));
        drop(state);

        log_event_with_fields(
            Event::StoreSnapshotOpened,
            &[("version", version.to_string().as_str())],
        );
        Ok(snapshot)
    }

    fn evaluate(&self, snapshot: &Snapshot, predicate: &Predicate) -> StoreResult<RowIdSet> {
        predicate.validate(&self.schema)?;

        let state = self.state.read().map_err(|_| StoreError::lock_poisoned())?;
        let at = snapshot.version();
        state.check_retained(at)?;

        let rows = state
            .rows
            .keys()
            .filter(|row| {
                state
                    .visible(**row, at)
                    .map_or(false, |doc| PredicateFilter::matches(doc, predicate))
            })
            .copied()
            .collect();
        Ok(RowIdSet::new(at, rows))
    }

    fn import_row_id_set(
        &self,
        rows: &RowIdSet,
        from: VersionStamp,
        to: VersionStamp,
    ) -> StoreResult<RowIdSet> {
        if rows.version() != from || from > to {
            return Err(StoreError::DivergentHistory { from, to });
        }

        let state = self.state.read().map_err(|_| StoreError::lock_poisoned())?;
        state.check_retained(from)?;
        state.check_retained(to)?;

        let surviving = rows
            .rows()
            .iter()
            .filter(|row| state.visible(**row, to).is_some())
            .copied()
            .collect();
        Ok(RowIdSet::new(to, surviving))
    }

    fn read_row(&self, snapshot: &Snapshot, row: RowId) -> StoreResult<Option<Arc<Value>>> {
        let state = self.state.read().map_err(|_| StoreError::lock_poisoned())?;
        state.check_retained(snapshot.version())?;
        Ok(state.visible(row, snapshot.version()).cloned())
    }
}

/// Staged changes of one write transaction.
///
/// Changes become visible only when the enclosing `MemoryStore::write`
/// commits them under a single new version.
pub struct WriteTransaction<'a> {
    schema: &'a TableSchema,
    state: &'a StoreState,
    base: VersionStamp,
    next_row_id: u64,
    /// `None` stages a delete.
    staged: BTreeMap<RowId, Option<Value>>,
}

impl<'a> WriteTransaction<'a> {
    fn new(schema: &'a TableSchema, state: &'a StoreState) -> Self {
        Self {
            schema,
            state,
            base: state.authority.current(),
            next_row_id: state.next_row_id,
            staged: BTreeMap::new(),
        }
    }

    /// The version this transaction builds on.
    pub fn base_version(&self) -> VersionStamp {
        self.base
    }

    /// Insert a new row.
    pub fn insert(&mut self, document: Value) -> StoreResult<RowId> {
        self.schema.validate_document(&document)?;
        let row = RowId::new(self.next_row_id);
        self.next_row_id += 1;
        self.staged.insert(row, Some(document));
        Ok(row)
    }

    /// Replace the document of a live row.
    pub fn update(&mut self, row: RowId, document: Value) -> StoreResult<()> {
        self.schema.validate_document(&document)?;
        if !self.is_live(row) {
            return Err(StoreError::RowNotFound(row));
        }
        self.staged.insert(row, Some(document));
        Ok(())
    }

    /// Delete a live row.
    pub fn delete(&mut self, row: RowId) -> StoreResult<()> {
        if !self.is_live(row) {
            return Err(StoreError::RowNotFound(row));
        }
        if self.is_staged_insert(row) {
            self.staged.remove(&row);
        } else {
            self.staged.insert(row, None);
        }
        Ok(())
    }

    /// Delete every live row, including rows inserted by this transaction.
    pub fn clear(&mut self) {
        let state = self.state;
        self.staged.retain(|row, _| row.value() < state.next_row_id);
        for row in state.rows.keys() {
            if state.visible(*row, self.base).is_some() {
                self.staged.insert(*row, None);
            }
        }
    }

    /// Returns true if `row` exists as seen by this transaction.
    pub fn is_live(&self, row: RowId) -> bool {
        match self.staged.get(&row) {
            Some(change) => change.is_some(),
            None => self.state.visible(row, self.base).is_some(),
        }
    }

    fn is_staged_insert(&self, row: RowId) -> bool {
        row.value() >= self.state.next_row_id
    }
}
