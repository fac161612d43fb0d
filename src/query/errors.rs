//! # Query Errors
//!
//! Error types delivered through `on_error` or returned from submission.
//!
//! A version mismatch is not an error: it is a reconciliation outcome the
//! retry policy decides on. Only exhausting the policy produces
//! `UnreachableVersion`.

use thiserror::Error;

use super::context::ContextId;
use super::request::{RequestId, RequestState};
use crate::mvcc::VersionStamp;
use crate::store::StoreError;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Query errors
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    // ==================
    // Store Errors
    // ==================
    /// Store failed evaluation, import or read (never retried)
    #[error(transparent)]
    Store(#[from] StoreError),

    // ==================
    // Reconciliation Errors
    // ==================
    /// Retries exhausted without the worker and origin versions converging
    #[error(
        "Unreachable version after {attempts} attempt(s): result computed at {snapshot_version}, origin at {origin_version}"
    )]
    UnreachableVersion {
        attempts: u32,
        snapshot_version: VersionStamp,
        origin_version: VersionStamp,
    },

    /// Handover requested across a version mismatch
    #[error("Handover refused: rows computed at {rows_version}, target is {target_version}")]
    HandoverVersionMismatch {
        rows_version: VersionStamp,
        target_version: VersionStamp,
    },

    // ==================
    // Context Errors
    // ==================
    /// A message reached an origin context it was not addressed to
    #[error("Context mismatch: message for {expected} delivered to {actual}")]
    ContextMismatch { expected: ContextId, actual: ContextId },

    /// Request state machine refused a transition
    #[error("Invalid transition for request {request_id}: {from} -> {to}")]
    InvalidTransition {
        request_id: RequestId,
        from: RequestState,
        to: RequestState,
    },

    // ==================
    // Dispatcher Errors
    // ==================
    /// An attempt for this request is already running on a worker
    #[error("Request {0} already has an attempt in flight")]
    AlreadyInFlight(RequestId),

    /// Dispatcher stopped accepting work
    #[error("Dispatcher closed")]
    DispatcherClosed,

    /// No tokio runtime available to run workers on
    #[error("No runtime available: {0}")]
    NoRuntime(String),

    /// Store call or background hook panicked on the worker
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    // ==================
    // Configuration Errors
    // ==================
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueryError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Store(e) => e.code(),
            QueryError::UnreachableVersion { .. } => "AERO_UNREACHABLE_VERSION",
            QueryError::HandoverVersionMismatch { .. } => "AERO_HANDOVER_VERSION_MISMATCH",
            QueryError::ContextMismatch { .. } => "AERO_CONTEXT_MISMATCH",
            QueryError::InvalidTransition { .. } => "AERO_INVALID_TRANSITION",
            QueryError::AlreadyInFlight(_) => "AERO_ALREADY_IN_FLIGHT",
            QueryError::DispatcherClosed => "AERO_DISPATCHER_CLOSED",
            QueryError::NoRuntime(_) => "AERO_NO_RUNTIME",
            QueryError::WorkerPanicked(_) => "AERO_WORKER_PANICKED",
            QueryError::Config(_) => "AERO_CONFIG_ERROR",
        }
    }

    /// No error is retryable: retries are driven by version mismatches only.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Returns true if this is the retries-exhausted outcome
    pub fn is_unreachable_version(&self) -> bool {
        matches!(self, QueryError::UnreachableVersion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_their_code() {
        let err: QueryError = StoreError::InvalidPredicate("bad".into()).into();
        assert_eq!(err.code(), "AERO_INVALID_PREDICATE");
        assert_eq!(err.to_string(), "Invalid predicate: bad");
    }

    #[test]
    fn test_unreachable_version() {
        let err = QueryError::UnreachableVersion {
            attempts: 3,
            snapshot_version: VersionStamp::new(4),
            origin_version: VersionStamp::new(5),
        };
        assert!(err.is_unreachable_version());
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "AERO_UNREACHABLE_VERSION");
        assert!(err.to_string().contains("3 attempt(s)"));
    }
}
