//! Common test utilities for integration tests
//!
//! Provides query functions whose responses the test controls, plus
//! counting and failing sources used across the integration test files.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use storefront::domain::QueryError;
use storefront::services::{query_fn, QueryFn};

type Reply<T> = oneshot::Sender<Result<Vec<T>, QueryError>>;

/// Query function whose calls stay pending until the test resolves them.
///
/// Each invocation parks a reply channel; `resolve(n, ..)` answers the n-th
/// call (zero-based), in any order.
pub struct ControlledFetcher<T> {
    pending: Arc<Mutex<Vec<Option<Reply<T>>>>>,
}

impl<T: Send + 'static> ControlledFetcher<T> {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn query_fn(&self) -> QueryFn<T> {
        let pending = Arc::clone(&self.pending);
        query_fn(move || {
            let (tx, rx) = oneshot::channel();
            pending.lock().unwrap().push(Some(tx));
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(QueryError::Network("reply dropped".to_string())))
            }
        })
    }

    /// Number of times the query function has been invoked.
    pub fn calls(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn resolve(&self, call: usize, result: Result<Vec<T>, QueryError>) {
        let reply = self.pending.lock().unwrap()[call]
            .take()
            .expect("call already resolved");
        let _ = reply.send(result);
    }

    /// Yield until the query function has been invoked `calls` times.
    pub async fn wait_for_calls(&self, calls: usize) {
        let reached = wait_for(|| self.calls() >= calls, 1_000).await;
        assert!(reached, "expected {calls} fetch call(s), saw {}", self.calls());
    }
}

/// Query function that counts its calls and answers from a script.
///
/// Call `n` gets `script[n]`; calls past the end repeat the last entry.
pub fn scripted_fn<T>(
    calls: &Arc<AtomicUsize>,
    script: Vec<Result<Vec<T>, QueryError>>,
) -> QueryFn<T>
where
    T: Clone + Send + Sync + 'static,
{
    let calls = Arc::clone(calls);
    let script = Arc::new(script);
    query_fn(move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let reply = script[n.min(script.len() - 1)].clone();
        async move { reply }
    })
}

pub fn network_error() -> QueryError {
    QueryError::Network("connection refused".to_string())
}

/// Poll `predicate`, yielding to the scheduler between checks.
///
/// Returns false if it is still false after `max_yields` yields.
pub async fn wait_for<F>(mut predicate: F, max_yields: usize) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..max_yields {
        if predicate() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    predicate()
}

/// Let spawned fetch tasks run to completion.
pub async fn settle_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
