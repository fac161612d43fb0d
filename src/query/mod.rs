//! Asynchronous queries over a versioned store
//!
//! A query is submitted on an origin context, evaluated on a worker against
//! a snapshot, and reconciled back on the origin:
//!
//! 1. `OriginContext::submit_query` creates a `QueryRequest` and hands an
//!    attempt to the `Dispatcher`
//! 2. A worker opens a snapshot, evaluates the predicate, runs the optional
//!    background hook and posts the tagged `RowIdSet` back
//! 3. The origin's `VersionReconciler` compares versions: equal versions are
//!    handed over through `ResultHandover`, a mismatch goes to the
//!    `RetryPolicy`
//! 4. `on_success` or `on_error` fires exactly once, on the origin, unless
//!    the request was cancelled first
//!
//! ```ignore
//! let mut origin = OriginContext::new(store, dispatcher, config);
//! let handle = origin
//!     .query(Predicate::all().between("column_long", json!(0), json!(9)))
//!     .retry_policy(RetryPolicy::MaxRetry(3))
//!     .find_all(|view| println!("{} rows", view.len()), |err| eprintln!("{}", err));
//! origin.run_until_idle().await;
//! ```

mod cancellation;
mod config;
mod context;
mod dispatcher;
mod errors;
mod handover;
mod reconciler;
mod request;
mod retry;

pub use cancellation::CancellationToken;
pub use config::{AsyncQueryConfig, SimulationConfig};
pub use context::{Completion, ContextId, OriginContext, OriginMessage, QueryBuilder};
pub use dispatcher::Dispatcher;
pub use errors::{QueryError, QueryResult};
pub use handover::{ResultHandover, ResultView};
pub use reconciler::{ReconcileMode, Reconciliation, VersionReconciler};
pub use request::{
    BackgroundCompletion, BackgroundHook, ErrorCallback, QueryCallbacks, QueryRequest,
    RequestHandle, RequestId, RequestState, SuccessCallback,
};
pub use retry::{RetryDecision, RetryPolicy};
