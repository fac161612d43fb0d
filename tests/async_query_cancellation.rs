//! Async Query Cancellation Tests
//!
//! Once cancellation is observed, no callback fires for the request:
//! - Cancelling from inside the background hook stops a retry loop
//! - Cancelling before the origin is driven drops the queued result
//! - Cancelling a finished request is a no-op for its callbacks

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::json;

use aeroquery::query::{
    AsyncQueryConfig, BackgroundCompletion, Dispatcher, OriginContext, QueryCallbacks,
    RequestHandle, RequestState, RetryPolicy,
};
use aeroquery::store::{FieldType, MemoryStore, Predicate, TableSchema};

// =============================================================================
// Helper Functions
// =============================================================================

fn store_with(rows: i64) -> Arc<MemoryStore> {
    let schema = TableSchema::new("all_types").field("column_long", FieldType::Int);
    let store = Arc::new(MemoryStore::new(schema));
    rewrite(&store, rows);
    store
}

fn rewrite(store: &MemoryStore, rows: i64) {
    store
        .write(|txn| {
            txn.clear();
            for i in 0..rows {
                txn.insert(json!({ "column_long": i }))?;
            }
            Ok(())
        })
        .unwrap();
}

fn origin(store: Arc<MemoryStore>, config: AsyncQueryConfig) -> OriginContext {
    let dispatcher = Arc::new(Dispatcher::from_current(&config).unwrap());
    OriginContext::new(store, dispatcher, config)
}

/// Callbacks that count how often either fired
fn counting() -> (QueryCallbacks, Rc<Cell<u32>>) {
    let fired = Rc::new(Cell::new(0));
    let on_success = Rc::clone(&fired);
    let on_error = Rc::clone(&fired);
    let callbacks = QueryCallbacks::new(
        move |_| on_success.set(on_success.get() + 1),
        move |_| on_error.set(on_error.get() + 1),
    );
    (callbacks, fired)
}

async fn drive(origin: &mut OriginContext) {
    tokio::time::timeout(Duration::from_secs(30), origin.run_until_idle())
        .await
        .expect("origin context did not go idle");
}

// =============================================================================
// Cancellation from the worker side
// =============================================================================

/// Cancelling after the second hook run stops an indefinite retry loop
/// with no callback for any attempt.
#[tokio::test]
async fn test_cancel_inside_hook_stops_retry_loop() {
    let store = store_with(10);
    let config = AsyncQueryConfig::default().with_background_hook_runs(10);
    let mut origin = origin(store.clone(), config);
    let (callbacks, fired) = counting();

    let handle_slot: Arc<OnceLock<RequestHandle>> = Arc::new(OnceLock::new());
    let hook_slot = Arc::clone(&handle_slot);
    let hook_runs = Arc::new(AtomicU32::new(0));
    let hook_counter = Arc::clone(&hook_runs);
    let writer = Arc::clone(&store);
    let callbacks = callbacks.with_background_hook(move |_: &BackgroundCompletion| {
        rewrite(&writer, 3);
        if hook_counter.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
            if let Some(handle) = hook_slot.get() {
                handle.cancel();
            }
        }
    });

    let handle = origin.submit_query(Predicate::all(), RetryPolicy::Indefinite, callbacks);
    handle_slot.set(handle.clone()).unwrap();
    drive(&mut origin).await;

    assert_eq!(fired.get(), 0);
    assert!(handle.is_cancelled());
    assert_eq!(hook_runs.load(Ordering::SeqCst), 2);
    assert_eq!(origin.request_state(handle.id()), None);
    let metrics = origin.metrics().snapshot();
    assert_eq!(metrics.cancelled, 1);
    assert_eq!(metrics.converged, 0);
    assert_eq!(metrics.failed, 0);
}

/// Cancelling from another thread while an attempt runs suppresses it.
#[tokio::test]
async fn test_cancel_from_other_thread() {
    let store = store_with(10);
    let mut origin = origin(store, AsyncQueryConfig::default());
    let (callbacks, fired) = counting();

    let handle = origin.submit_query(Predicate::all(), RetryPolicy::Indefinite, callbacks);
    let remote = handle.clone();
    std::thread::spawn(move || remote.cancel()).join().unwrap();
    drive(&mut origin).await;

    assert_eq!(fired.get(), 0);
    assert!(handle.is_cancelled());
}

// =============================================================================
// Cancellation on the origin side
// =============================================================================

/// A result already queued when `cancel` is called is dropped.
#[tokio::test]
async fn test_queued_result_dropped_after_cancel() {
    let store = store_with(10);
    let config = AsyncQueryConfig::default();
    let dispatcher = Arc::new(Dispatcher::from_current(&config).unwrap());
    let mut origin = OriginContext::new(store, Arc::clone(&dispatcher), config);
    let (callbacks, fired) = counting();

    let handle = origin.submit_query(Predicate::all(), RetryPolicy::NoRetry, callbacks);

    // Let the worker finish and post its result without processing it.
    tokio::time::timeout(Duration::from_secs(10), async {
        while dispatcher.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    })
    .await
    .unwrap();

    assert_eq!(origin.request_state(handle.id()), Some(RequestState::Running));
    assert!(handle.cancel());
    drive(&mut origin).await;

    assert_eq!(fired.get(), 0);
    assert_eq!(origin.metrics().snapshot().cancelled, 1);
}

#[tokio::test]
async fn test_cancel_before_driving() {
    let store = store_with(10);
    let mut origin = origin(store, AsyncQueryConfig::default());
    let (callbacks, fired) = counting();

    let handle = origin.submit_query(Predicate::all(), RetryPolicy::Indefinite, callbacks);
    assert!(!handle.is_cancelled());
    assert!(handle.cancel());
    assert!(handle.is_cancelled());
    assert!(!handle.cancel());

    drive(&mut origin).await;
    assert_eq!(fired.get(), 0);
    assert_eq!(origin.live_requests(), 0);
}

#[tokio::test]
async fn test_cancel_after_delivery_changes_nothing() {
    let store = store_with(10);
    let mut origin = origin(store, AsyncQueryConfig::default());
    let (callbacks, fired) = counting();

    let handle = origin.submit_query(Predicate::all(), RetryPolicy::NoRetry, callbacks);
    drive(&mut origin).await;
    assert_eq!(fired.get(), 1);

    assert!(handle.cancel());
    assert_eq!(origin.poll(), 1);
    assert_eq!(fired.get(), 1);
    let metrics = origin.metrics().snapshot();
    assert_eq!(metrics.cancelled, 0);
    assert_eq!(metrics.dropped_messages, 1);
}

#[tokio::test]
async fn test_cancelling_one_request_leaves_others() {
    let store = store_with(10);
    let mut origin = origin(store, AsyncQueryConfig::default());
    let (first_callbacks, first_fired) = counting();
    let (second_callbacks, second_fired) = counting();

    let first = origin.submit_query(Predicate::all(), RetryPolicy::NoRetry, first_callbacks);
    origin.submit_query(Predicate::all(), RetryPolicy::NoRetry, second_callbacks);
    first.cancel();
    drive(&mut origin).await;

    assert_eq!(first_fired.get(), 0);
    assert_eq!(second_fired.get(), 1);
}
