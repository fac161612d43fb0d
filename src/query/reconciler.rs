//! Version reconciliation
//!
//! Runs on the origin context when a worker result arrives. Compares the
//! version the result was computed at with the store's current version and
//! decides between handover, retry and failure.
//!
//! Two modes:
//! - `Strict`: every mismatch is decided by the retry policy
//! - `Rederive`: a mismatch is first resolved by importing the row set into
//!   the current version; the import is delivered only if no row was lost,
//!   otherwise the retry policy decides

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::QueryError;
use super::handover::{ResultHandover, ResultView};
use super::retry::{RetryDecision, RetryPolicy};
use crate::mvcc::VersionStamp;
use crate::store::{RowIdSet, VersionedStore};

/// How a version mismatch is resolved before the retry policy is asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    #[default]
    Strict,
    /// Import into the current version when membership survived.
    ///
    /// Import tracks row liveness only; an update that moves a row out of
    /// the predicate's range, or a new matching row, goes unnoticed.
    Rederive,
}

impl ReconcileMode {
    pub fn name(&self) -> &'static str {
        match self {
            ReconcileMode::Strict => "strict",
            ReconcileMode::Rederive => "rederive",
        }
    }
}

/// Outcome of reconciling one worker result.
#[derive(Debug)]
pub enum Reconciliation {
    /// Versions matched; deliver the view
    Converged(ResultView),
    /// Versions differed but the import kept every row; deliver the view
    Rederived(ResultView),
    /// Versions differed and the policy allows another attempt
    Retry {
        snapshot_version: VersionStamp,
        origin_version: VersionStamp,
    },
    /// Terminal; deliver the error
    GiveUp(QueryError),
}

/// Decides what happens to a worker result at the origin.
pub struct VersionReconciler {
    store: Arc<dyn VersionedStore>,
    mode: ReconcileMode,
}

impl VersionReconciler {
    pub fn new(store: Arc<dyn VersionedStore>, mode: ReconcileMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    /// Reconcile `rows` from attempt number `attempts` (1-based).
    pub fn reconcile(
        &self,
        rows: RowIdSet,
        policy: RetryPolicy,
        attempts: u32,
        cancelled: bool,
    ) -> Reconciliation {
        let origin_version = self.store.current_version();
        let snapshot_version = rows.version();

        if snapshot_version == origin_version {
            return match ResultHandover::hand_over(&self.store, rows, origin_version) {
                Ok(view) => Reconciliation::Converged(view),
                Err(e) => Reconciliation::GiveUp(e),
            };
        }

        if self.mode == ReconcileMode::Rederive {
            match self
                .store
                .import_row_id_set(&rows, snapshot_version, origin_version)
            {
                Ok(imported) if imported.len() == rows.len() => {
                    return match ResultHandover::hand_over(&self.store, imported, origin_version) {
                        Ok(view) => Reconciliation::Rederived(view),
                        Err(e) => Reconciliation::GiveUp(e),
                    };
                }
                Ok(_) => {}
                Err(e) => return Reconciliation::GiveUp(e.into()),
            }
        }

        match policy.decide(attempts.saturating_sub(1), cancelled) {
            RetryDecision::Retry => Reconciliation::Retry {
                snapshot_version,
                origin_version,
            },
            RetryDecision::GiveUp => Reconciliation::GiveUp(QueryError::UnreachableVersion {
                attempts,
                snapshot_version,
                origin_version,
            }),
        }
    }
}
