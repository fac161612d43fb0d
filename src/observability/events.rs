//! Observable events
//!
//! Every log line the crate emits names one of these events. Each event has
//! a fixed severity so call sites never choose one ad hoc.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded and validated
    ConfigLoaded,

    // Store
    /// Write transaction committed
    StoreCommit,
    /// Snapshot opened
    StoreSnapshotOpened,
    /// Garbage collection pass finished
    StoreGarbageCollected,

    // Query lifecycle (origin context)
    /// Request accepted by an origin context
    QuerySubmitted,
    /// Attempt handed to a worker
    QueryAttemptDispatched,
    /// Worker result and snapshot version disagree with the origin
    QueryVersionMismatch,
    /// Mismatch resolved by importing rows into the origin version
    QueryRederived,
    /// Retry scheduled after a mismatch
    QueryRetrying,
    /// Result handed over and delivered
    QueryConverged,
    /// Terminal failure delivered
    QueryFailed,
    /// Cancellation observed; request dropped without callback
    QueryCancelled,
    /// Message for an unknown or finished request discarded
    QueryStaleMessageDropped,

    // Worker context
    /// Worker observed cancellation before evaluating
    WorkerAttemptSkipped,
    /// Worker finished an evaluation
    WorkerAttemptCompleted,
    /// Store call or background hook panicked on the worker
    WorkerPanicked,
    /// Origin context went away before the result could be posted
    WorkerOriginGone,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::StoreCommit => "STORE_COMMIT",
            Event::StoreSnapshotOpened => "STORE_SNAPSHOT_OPENED",
            Event::StoreGarbageCollected => "STORE_GC_COMPLETE",

            Event::QuerySubmitted => "QUERY_SUBMITTED",
            Event::QueryAttemptDispatched => "QUERY_ATTEMPT_DISPATCHED",
            Event::QueryVersionMismatch => "QUERY_VERSION_MISMATCH",
            Event::QueryRederived => "QUERY_REDERIVED",
            Event::QueryRetrying => "QUERY_RETRYING",
            Event::QueryConverged => "QUERY_CONVERGED",
            Event::QueryFailed => "QUERY_FAILED",
            Event::QueryCancelled => "QUERY_CANCELLED",
            Event::QueryStaleMessageDropped => "QUERY_STALE_MESSAGE_DROPPED",

            Event::WorkerAttemptSkipped => "WORKER_ATTEMPT_SKIPPED",
            Event::WorkerAttemptCompleted => "WORKER_ATTEMPT_COMPLETED",
            Event::WorkerPanicked => "WORKER_PANICKED",
            Event::WorkerOriginGone => "WORKER_ORIGIN_GONE",
        }
    }

    /// Severity every occurrence of this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::StoreSnapshotOpened
            | Event::QueryAttemptDispatched
            | Event::WorkerAttemptSkipped
            | Event::WorkerAttemptCompleted
            | Event::QueryStaleMessageDropped => Severity::Trace,
            Event::QueryVersionMismatch | Event::WorkerOriginGone => Severity::Warn,
            Event::QueryFailed | Event::WorkerPanicked => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_strings() {
        assert_eq!(Event::QueryConverged.as_str(), "QUERY_CONVERGED");
        assert_eq!(Event::StoreCommit.to_string(), "STORE_COMMIT");
    }

    #[test]
    fn test_event_severities() {
        assert_eq!(Event::QueryAttemptDispatched.severity(), Severity::Trace);
        assert_eq!(Event::QueryVersionMismatch.severity(), Severity::Warn);
        assert_eq!(Event::QueryFailed.severity(), Severity::Error);
        assert_eq!(Event::QuerySubmitted.severity(), Severity::Info);
    }
}
