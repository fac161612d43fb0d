//! Query Request State Machine
//!
//! - States are explicit and enumerable
//! - Transitions are driven by the origin context only
//! - Forbidden transitions return an error and leave the state untouched
//! - Callbacks are taken out of the request when fired, so each fires at
//!   most once
//!
//! ```text
//! Pending -> Running -> AwaitingReconciliation -> Converged
//!               ^                |
//!               |                +-> Retrying -> Running
//!               |                +-> Failed
//!               +-> Failed (evaluation error)
//! any non-terminal state -> Cancelled
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::cancellation::CancellationToken;
use super::context::{ContextId, OriginMessage};
use super::errors::{QueryError, QueryResult};
use super::handover::ResultView;
use super::retry::RetryPolicy;
use crate::mvcc::VersionStamp;
use crate::store::Predicate;

/// Unique identifier of a submitted query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new random request id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a `QueryRequest`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Created, not yet handed to a worker
    Pending,
    /// An attempt is executing on a worker
    Running,
    /// Worker result arrived; version comparison pending
    AwaitingReconciliation,
    /// Result handed over and delivered. Terminal.
    Converged,
    /// Mismatch accepted by the retry policy; next attempt not started yet
    Retrying,
    /// Terminal failure delivered. Terminal.
    Failed,
    /// Cancellation observed. Terminal.
    Cancelled,
}

impl RequestState {
    /// Get the state name for observability
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::AwaitingReconciliation => "AwaitingReconciliation",
            Self::Converged => "Converged",
            Self::Retrying => "Retrying",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Failed | Self::Cancelled)
    }

    /// Whether work for the request may be executing off the origin context
    pub fn is_off_origin(&self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

/// Passed to the background hook after a worker finished evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundCompletion {
    pub request_id: RequestId,
    /// 1-based attempt number
    pub attempt: u32,
    /// Version the attempt's result was computed against
    pub snapshot_version: VersionStamp,
}

/// Runs on the worker context after evaluation, before the result is posted.
pub type BackgroundHook = Arc<dyn Fn(&BackgroundCompletion) + Send + Sync>;

/// Delivered on convergence
pub type SuccessCallback = Box<dyn FnOnce(ResultView)>;

/// Delivered on terminal failure
pub type ErrorCallback = Box<dyn FnOnce(QueryError)>;

/// Caller-supplied callbacks of one query.
///
/// `on_success` and `on_error` always run on the origin context; they need
/// not be `Send`. The background hook runs on a worker.
pub struct QueryCallbacks {
    on_success: SuccessCallback,
    on_error: ErrorCallback,
    on_background_completed: Option<BackgroundHook>,
}

impl QueryCallbacks {
    pub fn new<S, E>(on_success: S, on_error: E) -> Self
    where
        S: FnOnce(ResultView) + 'static,
        E: FnOnce(QueryError) + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
            on_background_completed: None,
        }
    }

    /// Attach a hook that runs on the worker after each evaluation.
    pub fn with_background_hook<H>(mut self, hook: H) -> Self
    where
        H: Fn(&BackgroundCompletion) + Send + Sync + 'static,
    {
        self.on_background_completed = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for QueryCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCallbacks")
            .field("has_background_hook", &self.on_background_completed.is_some())
            .finish()
    }
}

/// A query owned by its origin context.
pub struct QueryRequest {
    id: RequestId,
    origin: ContextId,
    predicate: Arc<Predicate>,
    retry_policy: RetryPolicy,
    state: RequestState,
    attempt_count: u32,
    hook_runs: u32,
    token: CancellationToken,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    on_background_completed: Option<BackgroundHook>,
}

impl QueryRequest {
    /// Create a request in `Pending`
    pub fn new(
        origin: ContextId,
        predicate: Predicate,
        retry_policy: RetryPolicy,
        callbacks: QueryCallbacks,
    ) -> Self {
        Self {
            id: RequestId::new(),
            origin,
            predicate: Arc::new(predicate),
            retry_policy,
            state: RequestState::Pending,
            attempt_count: 0,
            hook_runs: 0,
            token: CancellationToken::new(),
            on_success: Some(callbacks.on_success),
            on_error: Some(callbacks.on_error),
            on_background_completed: callbacks.on_background_completed,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn origin(&self) -> ContextId {
        self.origin
    }

    pub fn predicate(&self) -> &Arc<Predicate> {
        &self.predicate
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Attempts started so far, including the current one
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Retries consumed so far
    pub fn retries_spent(&self) -> u32 {
        self.attempt_count.saturating_sub(1)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Build a handle that cancels this request and wakes `origin_tx`.
    pub fn handle(&self, origin_tx: mpsc::UnboundedSender<OriginMessage>) -> RequestHandle {
        RequestHandle {
            id: self.id,
            token: self.token.clone(),
            origin_tx,
        }
    }

    /// Hook to attach to the next attempt, if any.
    ///
    /// With a `limit`, the hook is attached to at most that many attempts.
    pub fn arm_background_hook(&mut self, limit: Option<u32>) -> Option<BackgroundHook> {
        let hook = self.on_background_completed.as_ref()?;
        if limit.map_or(false, |limit| self.hook_runs >= limit) {
            return None;
        }
        self.hook_runs += 1;
        Some(Arc::clone(hook))
    }

    /// Attempts that carried the background hook
    pub fn hook_runs(&self) -> u32 {
        self.hook_runs
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Pending | Retrying → Running. Starts a new attempt.
    pub fn start_attempt(&mut self) -> QueryResult<u32> {
        match self.state {
            RequestState::Pending | RequestState::Retrying => {
                self.state = RequestState::Running;
                self.attempt_count += 1;
                Ok(self.attempt_count)
            }
            from => Err(self.forbidden(from, RequestState::Running)),
        }
    }

    /// Running → AwaitingReconciliation
    pub fn await_reconciliation(&mut self) -> QueryResult<()> {
        self.transition(
            &[RequestState::Running],
            RequestState::AwaitingReconciliation,
        )
    }

    /// AwaitingReconciliation → Retrying
    pub fn schedule_retry(&mut self) -> QueryResult<()> {
        self.transition(
            &[RequestState::AwaitingReconciliation],
            RequestState::Retrying,
        )
    }

    /// AwaitingReconciliation → Converged, then fire `on_success`.
    pub fn converge(&mut self, view: ResultView) -> QueryResult<()> {
        self.transition(
            &[RequestState::AwaitingReconciliation],
            RequestState::Converged,
        )?;
        if let Some(on_success) = self.on_success.take() {
            self.on_error = None;
            on_success(view);
        }
        Ok(())
    }

    /// Any non-terminal state → Failed, then fire `on_error`.
    pub fn fail(&mut self, error: QueryError) -> QueryResult<()> {
        self.transition(
            &[
                RequestState::Pending,
                RequestState::Running,
                RequestState::AwaitingReconciliation,
                RequestState::Retrying,
            ],
            RequestState::Failed,
        )?;
        if let Some(on_error) = self.on_error.take() {
            self.on_success = None;
            on_error(error);
        }
        Ok(())
    }

    /// Any non-terminal state → Cancelled. Drops both callbacks unfired.
    pub fn cancel(&mut self) -> QueryResult<()> {
        if self.state.is_terminal() {
            return Err(self.forbidden(self.state, RequestState::Cancelled));
        }
        self.token.cancel();
        self.state = RequestState::Cancelled;
        self.on_success = None;
        self.on_error = None;
        self.on_background_completed = None;
        Ok(())
    }

    fn transition(&mut self, allowed: &[RequestState], to: RequestState) -> QueryResult<()> {
        if !allowed.contains(&self.state) {
            return Err(self.forbidden(self.state, to));
        }
        self.state = to;
        Ok(())
    }

    fn forbidden(&self, from: RequestState, to: RequestState) -> QueryError {
        QueryError::InvalidTransition {
            request_id: self.id,
            from,
            to,
        }
    }
}

impl fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("predicate", &self.predicate)
            .field("retry_policy", &self.retry_policy)
            .field("state", &self.state)
            .field("attempt_count", &self.attempt_count)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Caller-side handle of a submitted query.
///
/// Can be sent to and cancelled from any thread.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    id: RequestId,
    token: CancellationToken,
    origin_tx: mpsc::UnboundedSender<OriginMessage>,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Request cancellation.
    ///
    /// Returns true if this call set the flag. The origin context is woken
    /// so the request reaches `Cancelled` even if no worker result follows.
    pub fn cancel(&self) -> bool {
        if !self.token.cancel() {
            return false;
        }
        // Origin gone means the request is already gone with it.
        let _ = self.origin_tx.send(OriginMessage::CancelRequested(self.id));
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
