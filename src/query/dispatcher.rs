//! # Attempt Dispatcher
//!
//! Runs query attempts on tokio's blocking pool and posts each outcome back
//! to the attempt's origin context.
//!
//! Guarantees:
//! - At most one attempt per request executes at any time
//! - At most `max_workers` attempts execute concurrently
//! - Exactly one message is posted per attempt, unless the request was
//!   cancelled, in which case none is
//! - A panic in the store or the background hook is reported, not propagated

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};

use super::cancellation::CancellationToken;
use super::config::AsyncQueryConfig;
use super::context::{Completion, ContextId, OriginMessage};
use super::errors::{QueryError, QueryResult};
use super::request::{BackgroundCompletion, BackgroundHook, RequestId};
use crate::observability::{log_event_with_fields, Event, QueryMetrics};
use crate::store::{Predicate, RowIdSet, Snapshot, VersionedStore};

/// One attempt handed to a worker. Owns everything the worker touches.
pub(crate) struct WorkItem {
    pub(crate) request_id: RequestId,
    pub(crate) origin: ContextId,
    pub(crate) attempt: u32,
    pub(crate) predicate: Arc<Predicate>,
    pub(crate) token: CancellationToken,
    pub(crate) hook: Option<BackgroundHook>,
    pub(crate) store: Arc<dyn VersionedStore>,
    pub(crate) reply: mpsc::UnboundedSender<OriginMessage>,
}

/// Worker pool front-end shared by origin contexts.
#[derive(Debug)]
pub struct Dispatcher {
    runtime: Handle,
    permits: Arc<Semaphore>,
    max_workers: usize,
    in_flight: Arc<Mutex<HashSet<RequestId>>>,
    metrics: Arc<QueryMetrics>,
}

impl Dispatcher {
    /// Create a dispatcher that runs workers on `runtime`.
    pub fn new(config: &AsyncQueryConfig, runtime: Handle) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            metrics: Arc::new(QueryMetrics::new()),
        }
    }

    /// Create a dispatcher on the runtime of the calling task.
    pub fn from_current(config: &AsyncQueryConfig) -> QueryResult<Self> {
        let runtime = Handle::try_current().map_err(|e| QueryError::NoRuntime(e.to_string()))?;
        Ok(Self::new(config, runtime))
    }

    /// Share a metrics registry with other components.
    pub fn with_metrics(mut self, metrics: Arc<QueryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<QueryMetrics> {
        &self.metrics
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Stop accepting attempts. Queued attempts fail with `DispatcherClosed`.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Attempts accepted and not yet finished
    pub fn in_flight(&self) -> usize {
        lock_in_flight(&self.in_flight).len()
    }

    pub fn is_in_flight(&self, request_id: RequestId) -> bool {
        lock_in_flight(&self.in_flight).contains(&request_id)
    }

    /// Queue one attempt. Never blocks the caller.
    pub(crate) fn dispatch(&self, item: WorkItem) -> QueryResult<()> {
        if self.is_closed() {
            return Err(QueryError::DispatcherClosed);
        }
        if !lock_in_flight(&self.in_flight).insert(item.request_id) {
            return Err(QueryError::AlreadyInFlight(item.request_id));
        }
        self.metrics.increment_attempts();

        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);
        self.runtime.spawn(async move {
            let permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    release(&in_flight, item.request_id);
                    if !item.token.is_cancelled() {
                        post(&item, Err(QueryError::DispatcherClosed), None);
                    }
                    return;
                }
            };

            let request_id = item.request_id;
            let worker_in_flight = Arc::clone(&in_flight);
            let joined = tokio::task::spawn_blocking(move || {
                run_attempt(item, &worker_in_flight);
            })
            .await;
            drop(permit);

            if let Err(e) = joined {
                // run_attempt catches store and hook panics; this is a
                // runtime shutdown or a panic in posting itself.
                release(&in_flight, request_id);
                log_event_with_fields(
                    Event::WorkerPanicked,
                    &[
                        ("error", e.to_string().as_str()),
                        ("request_id", request_id.to_string().as_str()),
                    ],
                );
            }
        });
        Ok(())
    }
}

fn lock_in_flight(in_flight: &Mutex<HashSet<RequestId>>) -> MutexGuard<'_, HashSet<RequestId>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release(in_flight: &Mutex<HashSet<RequestId>>, request_id: RequestId) {
    lock_in_flight(in_flight).remove(&request_id);
}

/// Body of one attempt on the worker context.
fn run_attempt(item: WorkItem, in_flight: &Mutex<HashSet<RequestId>>) {
    if item.token.is_cancelled() {
        release(in_flight, item.request_id);
        log_skipped(&item, "before_evaluation");
        return;
    }

    let evaluation = panic::catch_unwind(AssertUnwindSafe(|| evaluate(&item)));
    let (outcome, snapshot) = match evaluation {
        Ok(Ok((snapshot, rows))) => (Ok(rows), Some(snapshot)),
        Ok(Err(e)) => (Err(e), None),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log_event_with_fields(
                Event::WorkerPanicked,
                &[
                    ("attempt", item.attempt.to_string().as_str()),
                    ("error", message.as_str()),
                    ("request_id", item.request_id.to_string().as_str()),
                ],
            );
            (Err(QueryError::WorkerPanicked(message)), None)
        }
    };

    // Leave the in-flight set before posting so the origin can redispatch
    // as soon as it sees the result.
    release(in_flight, item.request_id);

    if item.token.is_cancelled() {
        log_skipped(&item, "after_evaluation");
        return;
    }

    match &outcome {
        Ok(rows) => log_event_with_fields(
            Event::WorkerAttemptCompleted,
            &[
                ("attempt", item.attempt.to_string().as_str()),
                ("request_id", item.request_id.to_string().as_str()),
                ("rows", rows.len().to_string().as_str()),
                ("version", rows.version().to_string().as_str()),
            ],
        ),
        Err(e) => log_event_with_fields(
            Event::WorkerAttemptCompleted,
            &[
                ("attempt", item.attempt.to_string().as_str()),
                ("error_code", e.code()),
                ("request_id", item.request_id.to_string().as_str()),
            ],
        ),
    }
    post(&item, outcome, snapshot);
}

/// Snapshot, evaluate, then run the background hook.
fn evaluate(item: &WorkItem) -> QueryResult<(Snapshot, RowIdSet)> {
    let snapshot = item.store.open_snapshot(None)?;
    let rows = item.store.evaluate(&snapshot, &item.predicate)?;

    if let Some(hook) = &item.hook {
        hook(&BackgroundCompletion {
            request_id: item.request_id,
            attempt: item.attempt,
            snapshot_version: rows.version(),
        });
    }
    Ok((snapshot, rows))
}

fn post(item: &WorkItem, outcome: QueryResult<RowIdSet>, snapshot: Option<Snapshot>) {
    let completion = Completion {
        request_id: item.request_id,
        origin: item.origin,
        attempt: item.attempt,
        outcome,
        snapshot,
    };
    if item.reply.send(OriginMessage::Completed(completion)).is_err() {
        log_event_with_fields(
            Event::WorkerOriginGone,
            &[
                ("origin", item.origin.to_string().as_str()),
                ("request_id", item.request_id.to_string().as_str()),
            ],
        );
    }
}

fn log_skipped(item: &WorkItem, phase: &str) {
    log_event_with_fields(
        Event::WorkerAttemptSkipped,
        &[
            ("attempt", item.attempt.to_string().as_str()),
            ("phase", phase),
            ("request_id", item.request_id.to_string().as_str()),
        ],
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
