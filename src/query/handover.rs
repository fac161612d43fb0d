//! # Result Handover
//!
//! Moves a worker's row set into a view bound to the origin's store handle.
//!
//! Handover is only valid when the row set was computed at exactly the
//! target version. The view keeps row ids and a snapshot; documents are
//! resolved lazily, so handover never copies row data.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::errors::{QueryError, QueryResult};
use crate::mvcc::VersionStamp;
use crate::store::{RowId, RowIdSet, Snapshot, VersionedStore};

/// Performs the worker-to-origin handover.
pub struct ResultHandover;

impl ResultHandover {
    /// Bind `rows` to `store` at `target`.
    ///
    /// Refuses with `HandoverVersionMismatch` unless `rows` is tagged with
    /// `target`.
    pub fn hand_over(
        store: &Arc<dyn VersionedStore>,
        rows: RowIdSet,
        target: VersionStamp,
    ) -> QueryResult<ResultView> {
        if rows.version() != target {
            return Err(QueryError::HandoverVersionMismatch {
                rows_version: rows.version(),
                target_version: target,
            });
        }
        let snapshot = store.open_snapshot(Some(target))?;
        Ok(ResultView {
            store: Arc::clone(store),
            snapshot,
            rows,
        })
    }
}

/// Live, read-only result delivered to `on_success`.
pub struct ResultView {
    store: Arc<dyn VersionedStore>,
    snapshot: Snapshot,
    rows: RowIdSet,
}

impl ResultView {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Version the view is bound to; equal to the origin's version at delivery.
    pub fn version(&self) -> VersionStamp {
        self.rows.version()
    }

    pub fn row_ids(&self) -> &[RowId] {
        self.rows.rows()
    }

    pub fn rows(&self) -> &RowIdSet {
        &self.rows
    }

    /// Document at `index`, resolved through the view's snapshot.
    pub fn get(&self, index: usize) -> QueryResult<Option<Arc<Value>>> {
        match self.rows.rows().get(index) {
            Some(row) => Ok(self.store.read_row(&self.snapshot, *row)?),
            None => Ok(None),
        }
    }

    /// All documents in result order.
    pub fn documents(&self) -> QueryResult<Vec<Arc<Value>>> {
        let mut documents = Vec::with_capacity(self.rows.len());
        for row in self.rows.rows() {
            if let Some(document) = self.store.read_row(&self.snapshot, *row)? {
                documents.push(document);
            }
        }
        Ok(documents)
    }
}

impl fmt::Debug for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultView")
            .field("version", &self.rows.version())
            .field("len", &self.rows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldType, MemoryStore, Predicate, TableSchema};
    use serde_json::json;

    fn seeded_store(rows: i64) -> Arc<MemoryStore> {
        let schema = TableSchema::new("items").field("column_long", FieldType::Int);
        let store = Arc::new(MemoryStore::new(schema));
        store
            .write(|txn| {
                for i in 0..rows {
                    txn.insert(json!({ "column_long": i }))?;
                }
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_handover_at_matching_version() {
        let store = seeded_store(3);
        let dyn_store: Arc<dyn VersionedStore> = store.clone();
        let snapshot = store.open_snapshot(None).unwrap();
        let rows = store.evaluate(&snapshot, &Predicate::all()).unwrap();

        let view = ResultHandover::hand_over(&dyn_store, rows, store.current_version()).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.version(), store.current_version());
        assert_eq!(view.get(0).unwrap().unwrap()["column_long"], 0);
        assert!(view.get(3).unwrap().is_none());
        assert_eq!(view.documents().unwrap().len(), 3);
    }

    #[test]
    fn test_handover_refuses_mismatch() {
        let store = seeded_store(2);
        let dyn_store: Arc<dyn VersionedStore> = store.clone();
        let snapshot = store.open_snapshot(None).unwrap();
        let rows = store.evaluate(&snapshot, &Predicate::all()).unwrap();
        store
            .write(|txn| txn.insert(json!({ "column_long": 9 })).map(|_| ()))
            .unwrap();

        let err = ResultHandover::hand_over(&dyn_store, rows, store.current_version()).unwrap_err();
        assert_eq!(err.code(), "AERO_HANDOVER_VERSION_MISMATCH");
    }

    #[test]
    fn test_view_reads_are_isolated_from_later_writes() {
        let store = seeded_store(2);
        let dyn_store: Arc<dyn VersionedStore> = store.clone();
        let snapshot = store.open_snapshot(None).unwrap();
        let rows = store.evaluate(&snapshot, &Predicate::all()).unwrap();
        let view = ResultHandover::hand_over(&dyn_store, rows, store.current_version()).unwrap();

        store
            .write(|txn| {
                txn.clear();
                Ok(())
            })
            .unwrap();

        assert_eq!(view.documents().unwrap().len(), 2);
    }
}
