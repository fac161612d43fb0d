//! Versioned store interface
//!
//! The query layer consumes a store only through `VersionedStore`:
//! 1. Read the current version (non-blocking)
//! 2. Open an immutable snapshot at a version
//! 3. Evaluate a predicate against a snapshot
//! 4. Import a row set computed at one version into a later one
//! 5. Resolve a row document through a snapshot
//!
//! `MemoryStore` is the in-process implementation with full MVCC history,
//! snapshot retention and garbage collection.

mod errors;
mod filters;
mod memory;
mod predicate;
mod row_set;
mod schema;
mod snapshot;

use std::sync::Arc;

use serde_json::Value;

pub use errors::{StoreError, StoreResult};
pub use filters::PredicateFilter;
pub use memory::{GcReport, MemoryStore, WriteTransaction};
pub use predicate::{Condition, FilterOp, Predicate};
pub use row_set::{RowId, RowIdSet};
pub use schema::{FieldType, TableSchema};
pub use snapshot::Snapshot;

use crate::mvcc::VersionStamp;

/// A store with a monotonic version counter and snapshot reads.
///
/// Implementations are shared between the origin context and workers, so
/// every method takes `&self` and must be callable from any thread. Only
/// committed write transactions advance the version.
pub trait VersionedStore: Send + Sync {
    /// The latest committed version. Never blocks.
    fn current_version(&self) -> VersionStamp;

    /// Open a snapshot at `version`, or at the current version for `None`.
    ///
    /// Fails with `SnapshotUnavailable` when the version is newer than the
    /// current one or its history has been reclaimed.
    fn open_snapshot(&self, version: Option<VersionStamp>) -> StoreResult<Snapshot>;

    /// Evaluate `predicate` against `snapshot`.
    ///
    /// Fails with `InvalidPredicate` on a schema or type mismatch.
    fn evaluate(&self, snapshot: &Snapshot, predicate: &Predicate) -> StoreResult<RowIdSet>;

    /// Re-derive `rows`, computed at `from`, against the later version `to`.
    ///
    /// Rows deleted in between are dropped; order is preserved. Fails with
    /// `DivergentHistory` if `from` is not an ancestor of `to`.
    fn import_row_id_set(
        &self,
        rows: &RowIdSet,
        from: VersionStamp,
        to: VersionStamp,
    ) -> StoreResult<RowIdSet>;

    /// Resolve the document of `row` as seen by `snapshot`.
    fn read_row(&self, snapshot: &Snapshot, row: RowId) -> StoreResult<Option<Arc<Value>>>;
}
