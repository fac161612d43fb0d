//! # Origin Context
//!
//! The single-threaded owner of submitted requests. Every callback, state
//! transition and reconciliation of a request runs on the thread that drives
//! its origin context through `poll` or `run_until_idle`.
//!
//! Workers talk to the origin only through its mailbox: one `Completed`
//! message per attempt. Handles wake it with `CancelRequested`.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::config::AsyncQueryConfig;
use super::dispatcher::{Dispatcher, WorkItem};
use super::errors::{QueryError, QueryResult};
use super::handover::ResultView;
use super::reconciler::{Reconciliation, VersionReconciler};
use super::request::{
    BackgroundCompletion, BackgroundHook, QueryCallbacks, QueryRequest, RequestHandle, RequestId,
    RequestState,
};
use super::retry::RetryPolicy;
use crate::observability::{log_event_with_fields, Event, QueryMetrics};
use crate::store::{Predicate, RowIdSet, Snapshot, VersionedStore};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an origin context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Result of one attempt, moved from the worker to the origin.
#[derive(Debug)]
pub struct Completion {
    pub request_id: RequestId,
    pub origin: ContextId,
    pub attempt: u32,
    /// Rows tagged with the version they were computed at, or the error
    pub outcome: QueryResult<RowIdSet>,
    /// Keeps the attempt's version retained until reconciliation ends
    pub(crate) snapshot: Option<Snapshot>,
}

/// Messages accepted by an origin context
#[derive(Debug)]
pub enum OriginMessage {
    Completed(Completion),
    CancelRequested(RequestId),
}

/// Owner of requests and their callbacks. Not `Send`.
pub struct OriginContext {
    id: ContextId,
    store: Arc<dyn VersionedStore>,
    dispatcher: Arc<Dispatcher>,
    reconciler: VersionReconciler,
    config: AsyncQueryConfig,
    metrics: Arc<QueryMetrics>,
    sender: mpsc::UnboundedSender<OriginMessage>,
    receiver: mpsc::UnboundedReceiver<OriginMessage>,
    requests: HashMap<RequestId, QueryRequest>,
    _not_send: PhantomData<Rc<()>>,
}

impl OriginContext {
    pub fn new(
        store: Arc<dyn VersionedStore>,
        dispatcher: Arc<Dispatcher>,
        config: AsyncQueryConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            id: ContextId::next(),
            reconciler: VersionReconciler::new(Arc::clone(&store), config.reconcile_mode),
            metrics: Arc::clone(dispatcher.metrics()),
            store,
            dispatcher,
            config,
            sender,
            receiver,
            requests: HashMap::new(),
            _not_send: PhantomData,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    pub fn config(&self) -> &AsyncQueryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<QueryMetrics> {
        &self.metrics
    }

    /// Requests not yet converged, failed or cancelled
    pub fn live_requests(&self) -> usize {
        self.requests.len()
    }

    /// State of a live request; `None` once it reached a terminal state
    pub fn request_state(&self, request_id: RequestId) -> Option<RequestState> {
        self.requests.get(&request_id).map(QueryRequest::state)
    }

    /// Submit a query. Returns immediately; results arrive through
    /// `callbacks` while the context is driven.
    pub fn submit_query(
        &mut self,
        predicate: Predicate,
        retry_policy: RetryPolicy,
        callbacks: QueryCallbacks,
    ) -> RequestHandle {
        let mut request = QueryRequest::new(self.id, predicate, retry_policy, callbacks);
        let handle = request.handle(self.sender.clone());
        let request_id = request.id();

        self.metrics.increment_submitted();
        log_event_with_fields(
            Event::QuerySubmitted,
            &[
                ("origin", self.id.to_string().as_str()),
                ("request_id", request_id.to_string().as_str()),
                ("retry_policy", retry_policy.name()),
            ],
        );

        self.launch_attempt(&mut request);
        if !request.state().is_terminal() {
            self.requests.insert(request_id, request);
        }
        handle
    }

    /// Start building a query with the configured default retry policy.
    pub fn query(&mut self, predicate: Predicate) -> QueryBuilder<'_> {
        let retry_policy = self.config.default_retry_policy;
        QueryBuilder {
            context: self,
            predicate,
            retry_policy,
            hook: None,
        }
    }

    /// Process every queued message without waiting. Returns the count.
    pub fn poll(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.handle_message(message);
            processed += 1;
        }
        processed
    }

    /// Process messages until no request is live.
    pub async fn run_until_idle(&mut self) {
        while !self.requests.is_empty() {
            match self.receiver.recv().await {
                Some(message) => self.handle_message(message),
                None => break,
            }
        }
    }

    fn handle_message(&mut self, message: OriginMessage) {
        match message {
            OriginMessage::Completed(completion) => self.handle_completion(completion),
            OriginMessage::CancelRequested(request_id) => match self.requests.remove(&request_id) {
                Some(request) => self.finish_cancelled(request),
                None => self.drop_stale(request_id, "cancel_after_finish"),
            },
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        if completion.origin != self.id {
            let err = QueryError::ContextMismatch {
                expected: completion.origin,
                actual: self.id,
            };
            self.metrics.increment_dropped_messages();
            log_event_with_fields(
                Event::QueryStaleMessageDropped,
                &[
                    ("error_code", err.code()),
                    ("origin", self.id.to_string().as_str()),
                    ("request_id", completion.request_id.to_string().as_str()),
                ],
            );
            return;
        }

        let request_id = completion.request_id;
        let Some(mut request) = self.requests.remove(&request_id) else {
            self.drop_stale(request_id, "unknown_request");
            return;
        };

        if request.is_cancelled() {
            self.finish_cancelled(request);
            return;
        }

        if completion.attempt != request.attempt_count()
            || request.state() != RequestState::Running
        {
            self.requests.insert(request_id, request);
            self.drop_stale(request_id, "superseded_attempt");
            return;
        }

        self.reconcile(&mut request, completion);
        if request.state().is_terminal() {
            return;
        }
        self.requests.insert(request_id, request);
    }

    fn reconcile(&self, request: &mut QueryRequest, completion: Completion) {
        // Held until the end of this step.
        let _retained = completion.snapshot;

        let rows = match completion.outcome {
            Ok(rows) => rows,
            Err(e) => {
                self.deliver_error(request, e);
                return;
            }
        };
        if let Err(e) = request.await_reconciliation() {
            self.deliver_error(request, e);
            return;
        }

        let outcome = self.reconciler.reconcile(
            rows,
            request.retry_policy(),
            request.attempt_count(),
            request.is_cancelled(),
        );

        // A cancel racing this step wins over any delivery.
        if request.is_cancelled() {
            let _ = request.cancel();
            self.record_cancelled(request);
            return;
        }

        match outcome {
            Reconciliation::Converged(view) => self.deliver_success(request, view),
            Reconciliation::Rederived(view) => {
                self.metrics.increment_version_mismatches();
                self.metrics.increment_rederived();
                log_event_with_fields(
                    Event::QueryRederived,
                    &[
                        ("attempt", request.attempt_count().to_string().as_str()),
                        ("request_id", request.id().to_string().as_str()),
                        ("version", view.version().to_string().as_str()),
                    ],
                );
                self.deliver_success(request, view);
            }
            Reconciliation::Retry {
                snapshot_version,
                origin_version,
            } => {
                self.metrics.increment_version_mismatches();
                self.metrics.increment_retries();
                log_event_with_fields(
                    Event::QueryVersionMismatch,
                    &[
                        ("attempt", request.attempt_count().to_string().as_str()),
                        ("origin_version", origin_version.to_string().as_str()),
                        ("request_id", request.id().to_string().as_str()),
                        ("snapshot_version", snapshot_version.to_string().as_str()),
                    ],
                );
                if let Err(e) = request.schedule_retry() {
                    self.deliver_error(request, e);
                    return;
                }
                log_event_with_fields(
                    Event::QueryRetrying,
                    &[
                        ("next_attempt", (request.attempt_count() + 1).to_string().as_str()),
                        ("request_id", request.id().to_string().as_str()),
                    ],
                );
                self.launch_attempt(request);
            }
            Reconciliation::GiveUp(e) => {
                if let QueryError::UnreachableVersion {
                    snapshot_version,
                    origin_version,
                    ..
                } = &e
                {
                    self.metrics.increment_version_mismatches();
                    log_event_with_fields(
                        Event::QueryVersionMismatch,
                        &[
                            ("attempt", request.attempt_count().to_string().as_str()),
                            ("origin_version", origin_version.to_string().as_str()),
                            ("request_id", request.id().to_string().as_str()),
                            ("snapshot_version", snapshot_version.to_string().as_str()),
                        ],
                    );
                }
                self.deliver_error(request, e);
            }
        }
    }

    /// Start the next attempt of `request` on a worker.
    ///
    /// A refused dispatch is reported through the mailbox, so the error is
    /// delivered like any other attempt outcome.
    fn launch_attempt(&self, request: &mut QueryRequest) {
        let attempt = match request.start_attempt() {
            Ok(attempt) => attempt,
            Err(e) => {
                self.deliver_error(request, e);
                return;
            }
        };
        let hook = request.arm_background_hook(self.config.simulation.max_background_hook_runs);

        log_event_with_fields(
            Event::QueryAttemptDispatched,
            &[
                ("attempt", attempt.to_string().as_str()),
                ("background_hook", if hook.is_some() { "true" } else { "false" }),
                ("request_id", request.id().to_string().as_str()),
            ],
        );

        let item = WorkItem {
            request_id: request.id(),
            origin: self.id,
            attempt,
            predicate: Arc::clone(request.predicate()),
            token: request.token().clone(),
            hook,
            store: Arc::clone(&self.store),
            reply: self.sender.clone(),
        };
        if let Err(e) = self.dispatcher.dispatch(item) {
            let _ = self.sender.send(OriginMessage::Completed(Completion {
                request_id: request.id(),
                origin: self.id,
                attempt,
                outcome: Err(e),
                snapshot: None,
            }));
        }
    }

    fn deliver_success(&self, request: &mut QueryRequest, view: ResultView) {
        let version = view.version();
        let rows = view.len();
        if let Err(e) = request.converge(view) {
            self.deliver_error(request, e);
            return;
        }
        self.metrics.increment_converged();
        log_event_with_fields(
            Event::QueryConverged,
            &[
                ("attempts", request.attempt_count().to_string().as_str()),
                ("request_id", request.id().to_string().as_str()),
                ("rows", rows.to_string().as_str()),
                ("version", version.to_string().as_str()),
            ],
        );
    }

    fn deliver_error(&self, request: &mut QueryRequest, error: QueryError) {
        let code = error.code();
        let message = error.to_string();
        if request.fail(error).is_err() {
            // Already terminal; nothing left to deliver.
            return;
        }
        self.metrics.increment_failed();
        log_event_with_fields(
            Event::QueryFailed,
            &[
                ("attempts", request.attempt_count().to_string().as_str()),
                ("error", message.as_str()),
                ("error_code", code),
                ("request_id", request.id().to_string().as_str()),
            ],
        );
    }

    fn finish_cancelled(&self, mut request: QueryRequest) {
        if request.cancel().is_ok() {
            self.record_cancelled(&request);
        }
    }

    fn record_cancelled(&self, request: &QueryRequest) {
        self.metrics.increment_cancelled();
        log_event_with_fields(
            Event::QueryCancelled,
            &[
                ("attempts", request.attempt_count().to_string().as_str()),
                ("request_id", request.id().to_string().as_str()),
            ],
        );
    }

    fn drop_stale(&self, request_id: RequestId, reason: &str) {
        self.metrics.increment_dropped_messages();
        log_event_with_fields(
            Event::QueryStaleMessageDropped,
            &[
                ("origin", self.id.to_string().as_str()),
                ("reason", reason),
                ("request_id", request_id.to_string().as_str()),
            ],
        );
    }
}

impl fmt::Debug for OriginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginContext")
            .field("id", &self.id)
            .field("live_requests", &self.requests.len())
            .field("reconcile_mode", &self.reconciler.mode())
            .finish()
    }
}

/// Fluent query submission bound to an origin context.
pub struct QueryBuilder<'a> {
    context: &'a mut OriginContext,
    predicate: Predicate,
    retry_policy: RetryPolicy,
    hook: Option<BackgroundHook>,
}

impl<'a> QueryBuilder<'a> {
    /// Override the context's default retry policy.
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Run `hook` on the worker after each evaluation.
    pub fn on_background_completed<H>(mut self, hook: H) -> Self
    where
        H: Fn(&BackgroundCompletion) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Submit and return the handle.
    pub fn find_all<S, E>(self, on_success: S, on_error: E) -> RequestHandle
    where
        S: FnOnce(ResultView) + 'static,
        E: FnOnce(QueryError) + 'static,
    {
        let mut callbacks = QueryCallbacks::new(on_success, on_error);
        if let Some(hook) = self.hook {
            callbacks = callbacks.with_background_hook(move |done: &BackgroundCompletion| hook(done));
        }
        self.context
            .submit_query(self.predicate, self.retry_policy, callbacks)
    }
}
