//! One mounted use of a query.
//!
//! An observer owns a cancellation scope. Dropping it (or calling
//! [`QueryObserver::unmount`]) cancels the scope, which lets the client drop
//! a response nobody is waiting for anymore.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::query_client::{Ensure, QueryEntry, QueryFn};
use crate::domain::errors::QueryError;
use crate::domain::models::{QueryKey, QueryOptions, QueryResult, QueryState};

/// Reactive read handle returned by [`QueryClient::observe`](super::QueryClient::observe).
pub struct QueryObserver<T: Send + Sync + 'static> {
    entry: Arc<QueryEntry<T>>,
    fetch_fn: QueryFn<T>,
    options: QueryOptions,
    scope: CancellationToken,
    receiver: watch::Receiver<QueryState<T>>,
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
    pub(crate) fn new(
        entry: Arc<QueryEntry<T>>,
        fetch_fn: QueryFn<T>,
        options: QueryOptions,
        scope: CancellationToken,
    ) -> Self {
        let receiver = entry.subscribe();
        Self {
            entry,
            fetch_fn,
            options,
            scope,
            receiver,
        }
    }

    pub fn key(&self) -> &QueryKey {
        self.entry.key()
    }

    /// Current result, read synchronously from the cache.
    pub fn result(&self) -> QueryResult<T> {
        QueryResult::from_state(&self.receiver.borrow(), self.options.stale_time, Instant::now())
    }

    /// Wait for the next published state change and return it.
    pub async fn changed(&mut self) -> QueryResult<T> {
        // The sender lives in the entry this observer holds, so it cannot close.
        let _ = self.receiver.changed().await;
        self.result()
    }

    /// Wait until no fetch is in flight for this key.
    pub async fn settled(&mut self) -> QueryResult<T> {
        let _ = self.receiver.wait_for(|state| !state.is_fetching).await;
        self.result()
    }

    /// Fetch again if the cached value has gone stale; joins a fetch already
    /// in flight. Returns true if a fetch is now running.
    pub fn refresh_if_stale(&self) -> bool {
        matches!(
            self.entry.ensure(&self.fetch_fn, &self.options, &self.scope),
            Ensure::Fetching(_)
        )
    }

    /// Force a new fetch that supersedes any fetch in flight.
    pub async fn refetch(&self) -> Result<Arc<Vec<T>>, QueryError> {
        self.entry
            .force_fetch(&self.fetch_fn, &self.options, &self.scope)
            .await
    }

    pub fn is_mounted(&self) -> bool {
        !self.scope.is_cancelled()
    }

    /// Tear down this scope. Equivalent to dropping the observer.
    pub fn unmount(self) {}
}

impl<T: Send + Sync + 'static> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for QueryObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", self.entry.key())
            .field("status", &self.receiver.borrow().status)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
