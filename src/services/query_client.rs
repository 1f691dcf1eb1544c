//! Keyed query cache with staleness windows and request de-duplication.
//!
//! One process-wide map from [`QueryKey`] to a typed cache entry. Each entry
//! holds the last successful value, its fetch timestamp, the fetch status and
//! at most one in-flight fetch. State changes are published through a
//! `tokio::sync::watch` channel per key; the client is the only writer.
//!
//! ## Fetch rules
//!
//! - A fresh entry (younger than `stale_time`) is served without fetching.
//! - A request that finds a fetch in flight joins it instead of issuing another.
//! - Every fetch gets an id; only the last issued id may write to the entry,
//!   so a slow superseded response never overwrites a newer one.
//! - A fetch remembers the cancellation token of every scope that asked for
//!   it; if all of them are cancelled when it resolves, the result is dropped.
//! - A panicking query function settles the entry as an error.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::query_observer::QueryObserver;
use super::retry::RetryPolicy;
use crate::domain::errors::QueryError;
use crate::domain::models::{QueryKey, QueryOptions, QueryState, QueryStatus};

/// Boxed future produced by a query function.
pub type QueryFuture<T> = BoxFuture<'static, Result<Vec<T>, QueryError>>;

/// Zero-argument fetch function for one query.
pub type QueryFn<T> = Arc<dyn Fn() -> QueryFuture<T> + Send + Sync>;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<Vec<T>>, QueryError>>>;

/// Wrap an async closure as a [`QueryFn`].
///
/// # Example
/// ```
/// use storefront::services::query_fn;
///
/// let fetch = query_fn(|| async { Ok(vec![1, 2, 3]) });
/// ```
pub fn query_fn<T, F, Fut>(f: F) -> QueryFn<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, QueryError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

struct InFlight<T> {
    id: u64,
    /// Tokens of every scope that started or joined this fetch
    scopes: Vec<CancellationToken>,
    future: SharedFetch<T>,
    /// Status to restore if the result is dropped
    previous_status: QueryStatus,
}

struct FetchSlot<T> {
    last_issued: u64,
    in_flight: Option<InFlight<T>>,
}

/// Outcome of asking an entry for its value.
pub(crate) enum Ensure<T> {
    Fresh(Arc<Vec<T>>),
    Fetching(SharedFetch<T>),
}

/// Cache entry for one key.
pub(crate) struct QueryEntry<T> {
    key: QueryKey,
    state: watch::Sender<QueryState<T>>,
    slot: Mutex<FetchSlot<T>>,
}

impl<T: Send + Sync + 'static> QueryEntry<T> {
    fn new(key: QueryKey) -> Self {
        Self {
            key,
            state: watch::Sender::new(QueryState::default()),
            slot: Mutex::new(FetchSlot {
                last_issued: 0,
                in_flight: None,
            }),
        }
    }

    pub(crate) fn key(&self) -> &QueryKey {
        &self.key
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.subscribe()
    }

    pub(crate) fn snapshot(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    /// Serve the cached value if fresh, join the in-flight fetch, or start one.
    pub(crate) fn ensure(
        self: &Arc<Self>,
        fetch_fn: &QueryFn<T>,
        options: &QueryOptions,
        scope: &CancellationToken,
    ) -> Ensure<T> {
        let mut slot = lock(&self.slot);

        if let Some(in_flight) = slot.in_flight.as_mut() {
            debug!(key = %self.key, fetch_id = in_flight.id, "joining in-flight fetch");
            in_flight.scopes.push(scope.clone());
            return Ensure::Fetching(in_flight.future.clone());
        }

        {
            let state = self.state.borrow();
            if !state.is_stale(options.stale_time, Instant::now()) {
                if let Some(data) = &state.data {
                    debug!(key = %self.key, "serving fresh cached data");
                    return Ensure::Fresh(Arc::clone(data));
                }
            }
        }

        Ensure::Fetching(self.start_fetch(&mut slot, fetch_fn, options, scope))
    }

    /// Issue a new fetch, superseding any fetch in flight.
    pub(crate) fn force_fetch(
        self: &Arc<Self>,
        fetch_fn: &QueryFn<T>,
        options: &QueryOptions,
        scope: &CancellationToken,
    ) -> SharedFetch<T> {
        let mut slot = lock(&self.slot);
        self.start_fetch(&mut slot, fetch_fn, options, scope)
    }

    fn start_fetch(
        self: &Arc<Self>,
        slot: &mut FetchSlot<T>,
        fetch_fn: &QueryFn<T>,
        options: &QueryOptions,
        scope: &CancellationToken,
    ) -> SharedFetch<T> {
        slot.last_issued += 1;
        let id = slot.last_issued;

        // A superseded fetch hands its scopes to the new one so observers
        // that were waiting on it still get the newer result.
        let (mut scopes, previous_status) = match slot.in_flight.take() {
            Some(superseded) => {
                debug!(key = %self.key, superseded = superseded.id, fetch_id = id, "superseding in-flight fetch");
                (superseded.scopes, superseded.previous_status)
            }
            None => (Vec::new(), self.state.borrow().status),
        };
        scopes.push(scope.clone());

        self.state.send_modify(|state| {
            state.status = QueryStatus::Loading;
            state.is_fetching = true;
        });
        info!(key = %self.key, fetch_id = id, "fetching query");

        let entry = Arc::clone(self);
        let fetch_fn = Arc::clone(fetch_fn);
        let policy = RetryPolicy::from(&options.retry);
        let future = async move {
            let attempt = policy.execute(|| fetch_fn(), || entry.has_live_scope(id));
            let result = match AssertUnwindSafe(attempt).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    error!(key = %entry.key, fetch_id = id, "query function panicked");
                    Err(QueryError::Panicked(panic_message(payload.as_ref())))
                }
            };
            entry.settle(id, result)
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            id,
            scopes,
            future: future.clone(),
            previous_status,
        });
        tokio::spawn(future.clone());

        future
    }

    fn has_live_scope(&self, id: u64) -> bool {
        lock(&self.slot)
            .in_flight
            .as_ref()
            .is_some_and(|f| f.id == id && f.scopes.iter().any(|t| !t.is_cancelled()))
    }

    /// Apply the outcome of fetch `id`, unless it was superseded or abandoned.
    fn settle(
        &self,
        id: u64,
        result: Result<Vec<T>, QueryError>,
    ) -> Result<Arc<Vec<T>>, QueryError> {
        let mut slot = lock(&self.slot);

        let in_flight = match slot.in_flight.take_if(|f| f.id == id) {
            Some(in_flight) => in_flight,
            None => {
                trace!(key = %self.key, fetch_id = id, latest = slot.last_issued, "discarding superseded response");
                return result.map(Arc::new);
            }
        };

        if in_flight.scopes.iter().all(CancellationToken::is_cancelled) {
            trace!(key = %self.key, fetch_id = id, "all requesting scopes torn down, dropping response");
            self.state.send_modify(|state| {
                state.status = in_flight.previous_status;
                state.is_fetching = false;
            });
            return Err(QueryError::Cancelled(self.key.clone()));
        }

        match result {
            Ok(records) => {
                let data = Arc::new(records);
                info!(key = %self.key, fetch_id = id, records = data.len(), "query succeeded");
                self.state.send_modify(|state| {
                    state.data = Some(Arc::clone(&data));
                    state.status = QueryStatus::Success;
                    state.error = None;
                    state.data_updated_at = Some(Utc::now());
                    state.fetched_at = Some(Instant::now());
                    state.is_fetching = false;
                    state.is_invalidated = false;
                });
                Ok(data)
            }
            Err(err) => {
                warn!(
                    key = %self.key,
                    fetch_id = id,
                    error = %err,
                    has_cached_data = self.state.borrow().data.is_some(),
                    "query failed"
                );
                self.state.send_modify(|state| {
                    state.status = QueryStatus::Error;
                    state.error = Some(err.clone());
                    state.is_fetching = false;
                });
                Err(err)
            }
        }
    }
}

/// Operations the client needs without knowing an entry's record type.
trait ErasedEntry: Send + Sync {
    fn invalidate(&self);
    fn reset(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> ErasedEntry for QueryEntry<T> {
    fn invalidate(&self) {
        self.state.send_if_modified(|state| {
            let changed = !state.is_invalidated;
            state.is_invalidated = true;
            changed
        });
    }

    fn reset(&self) {
        let mut slot = lock(&self.slot);
        // Orphan any fetch in flight so its response cannot repopulate the entry.
        slot.in_flight = None;
        slot.last_issued += 1;
        self.state.send_replace(QueryState::default());
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

struct ClientInner {
    entries: Mutex<HashMap<QueryKey, Arc<dyn ErasedEntry>>>,
    default_options: QueryOptions,
}

/// Shared handle to the query cache.
///
/// Cloning is cheap; all clones see the same entries.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl QueryClient {
    pub fn new(default_options: QueryOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                entries: Mutex::new(HashMap::new()),
                default_options,
            }),
        }
    }

    /// Options used by queries that do not override them.
    pub fn default_options(&self) -> &QueryOptions {
        &self.inner.default_options
    }

    pub(crate) fn entry<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
    ) -> Result<Arc<QueryEntry<T>>, QueryError> {
        let mut entries = lock(&self.inner.entries);
        let erased = entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(QueryEntry::<T>::new(key.clone())) as Arc<dyn ErasedEntry>);

        Arc::clone(erased)
            .into_any()
            .downcast::<QueryEntry<T>>()
            .map_err(|_| QueryError::TypeMismatch(key.clone()))
    }

    fn existing_entry<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<QueryEntry<T>>> {
        let erased = lock(&self.inner.entries).get(key).map(Arc::clone)?;
        erased.into_any().downcast::<QueryEntry<T>>().ok()
    }

    /// Mount a query: start (or join) a fetch if the entry is stale and
    /// return an observer bound to a new cancellation scope.
    ///
    /// # Panics
    /// Starting a fetch spawns a task, so this panics when called outside a
    /// tokio runtime and the entry is not fresh.
    pub fn observe<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
        fetch_fn: QueryFn<T>,
        options: QueryOptions,
    ) -> Result<QueryObserver<T>, QueryError> {
        let entry = self.entry::<T>(key)?;
        let scope = CancellationToken::new();
        // Observers read the entry through their receiver; the fetch handle
        // keeps running on its own task.
        let _ = entry.ensure(&fetch_fn, &options, &scope);
        Ok(QueryObserver::new(entry, fetch_fn, options, scope))
    }

    /// Read a query imperatively.
    ///
    /// Returns the cached value when fresh, otherwise the outcome of the
    /// fetch this call started or joined.
    pub async fn fetch_query<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
        fetch_fn: QueryFn<T>,
        options: &QueryOptions,
    ) -> Result<Arc<Vec<T>>, QueryError> {
        let entry = self.entry::<T>(key)?;
        match entry.ensure(&fetch_fn, options, &CancellationToken::new()) {
            Ensure::Fresh(data) => Ok(data),
            Ensure::Fetching(fetch) => fetch.await,
        }
    }

    /// Warm the cache; failures are recorded in the entry only.
    pub async fn prefetch_query<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
        fetch_fn: QueryFn<T>,
        options: &QueryOptions,
    ) {
        if let Err(err) = self.fetch_query(key, fetch_fn, options).await {
            debug!(key = %key, error = %err, "prefetch failed");
        }
    }

    /// Issue a new fetch even if the entry is fresh, superseding any fetch
    /// in flight.
    pub async fn refetch<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
        fetch_fn: QueryFn<T>,
        options: &QueryOptions,
    ) -> Result<Arc<Vec<T>>, QueryError> {
        let entry = self.entry::<T>(key)?;
        entry
            .force_fetch(&fetch_fn, options, &CancellationToken::new())
            .await
    }

    /// Last successful value for `key`, if any.
    pub fn get_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<Vec<T>>> {
        self.existing_entry::<T>(key)?.state.borrow().data.clone()
    }

    pub fn get_query_state<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<QueryState<T>> {
        self.existing_entry::<T>(key).map(|entry| entry.snapshot())
    }

    /// Subscribe to state changes of `key`, creating an idle entry if needed.
    pub fn subscribe<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
    ) -> Result<watch::Receiver<QueryState<T>>, QueryError> {
        Ok(self.entry::<T>(key)?.subscribe())
    }

    /// Mark every entry whose key starts with `prefix` as stale.
    ///
    /// Cached data stays readable; the next access fetches. Returns the
    /// number of entries marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let matching = self.matching(prefix);
        for entry in &matching {
            entry.invalidate();
        }
        debug!(prefix = %prefix, count = matching.len(), "invalidated queries");
        matching.len()
    }

    /// Discard data and error of `key` and return it to `idle`.
    pub fn reset(&self, key: &QueryKey) -> bool {
        let entry = lock(&self.inner.entries).get(key).map(Arc::clone);
        match entry {
            Some(entry) => {
                entry.reset();
                true
            }
            None => false,
        }
    }

    /// Drop `key` from the cache. Mounted observers keep their detached entry.
    pub fn remove(&self, key: &QueryKey) -> bool {
        lock(&self.inner.entries).remove(key).is_some()
    }

    pub fn clear(&self) {
        lock(&self.inner.entries).clear();
    }

    /// Cached keys in sorted order.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = lock(&self.inner.entries).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.entries).is_empty()
    }

    fn matching(&self, prefix: &QueryKey) -> Vec<Arc<dyn ErasedEntry>> {
        lock(&self.inner.entries)
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(_, entry)| Arc::clone(entry))
            .collect()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(QueryOptions::default())
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("keys", &self.keys())
            .field("default_options", &self.inner.default_options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fn(calls: &Arc<AtomicUsize>) -> QueryFn<u32> {
        let calls = Arc::clone(calls);
        query_fn(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_query_caches_result() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::from("numbers");
        let options = QueryOptions::default().without_retry();

        let first = client.fetch_query(&key, counting_fn(&calls), &options).await.unwrap();
        let second = client.fetch_query(&key, counting_fn(&calls), &options).await.unwrap();

        assert_eq!(*first, vec![1, 2, 3]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_rejected() {
        let client = QueryClient::default();
        let key = QueryKey::from("numbers");
        let options = QueryOptions::default().without_retry();

        client
            .fetch_query(&key, query_fn(|| async { Ok(vec![1_u32]) }), &options)
            .await
            .unwrap();

        let result = client
            .fetch_query(&key, query_fn(|| async { Ok(vec!["one".to_string()]) }), &options)
            .await;
        assert_eq!(result, Err(QueryError::TypeMismatch(key.clone())));
        assert!(client.get_query_data::<String>(&key).is_none());
    }

    #[tokio::test]
    async fn test_invalidate_by_prefix() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let options = QueryOptions::default().without_retry();
        let venue_a = QueryKey::new(["events", "a"]);
        let venue_b = QueryKey::new(["events", "b"]);
        let techniques = QueryKey::from("techniques");

        for key in [&venue_a, &venue_b, &techniques] {
            client.fetch_query(key, counting_fn(&calls), &options).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert_eq!(client.invalidate(&QueryKey::from("events")), 2);
        assert!(client.get_query_state::<u32>(&venue_a).unwrap().is_invalidated);
        assert!(!client.get_query_state::<u32>(&techniques).unwrap().is_invalidated);

        // Invalidated data stays readable until refetched
        assert!(client.get_query_data::<u32>(&venue_a).is_some());

        client.fetch_query(&venue_a, counting_fn(&calls), &options).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(!client.get_query_state::<u32>(&venue_a).unwrap().is_invalidated);
    }

    #[tokio::test]
    async fn test_reset_returns_entry_to_idle() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::from("numbers");
        let options = QueryOptions::default().without_retry();

        client.fetch_query(&key, counting_fn(&calls), &options).await.unwrap();
        assert!(client.reset(&key));

        let state = client.get_query_state::<u32>(&key).unwrap();
        assert_eq!(state.status, QueryStatus::Idle);
        assert!(state.data.is_none());
        assert!(!client.reset(&QueryKey::from("missing")));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let options = QueryOptions::default().without_retry();

        client.fetch_query(&QueryKey::from("b"), counting_fn(&calls), &options).await.unwrap();
        client.fetch_query(&QueryKey::from("a"), counting_fn(&calls), &options).await.unwrap();
        assert_eq!(client.keys(), vec![QueryKey::from("a"), QueryKey::from("b")]);

        assert!(client.remove(&QueryKey::from("a")));
        assert!(!client.remove(&QueryKey::from("a")));
        assert_eq!(client.len(), 1);

        client.clear();
        assert!(client.is_empty());
    }
}
