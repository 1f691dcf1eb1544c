//! The two named catalog queries: active events and techniques.

use async_trait::async_trait;
use std::sync::Arc;

use super::query_client::{query_fn, QueryClient, QueryFn};
use super::query_observer::QueryObserver;
use crate::domain::errors::QueryError;
use crate::domain::models::{
    CatalogLabels, EventFilter, EventRecord, QueryKey, QueryOptions, TechniqueRecord,
};
use crate::domain::ports::{EventSource, TechniqueSource};

/// Cache key of the active events list.
pub const EVENTS_KEY: &str = "events";

/// Cache key of the techniques list.
pub const TECHNIQUES_KEY: &str = "techniques";

/// A named cached query over one record list.
///
/// Implementors provide the key and fetch function; mounting, reading and
/// refetching go through the shared [`QueryClient`].
#[async_trait]
pub trait CatalogQuery: Send + Sync {
    type Record: Send + Sync + 'static;

    fn client(&self) -> &QueryClient;

    fn options(&self) -> &QueryOptions;

    fn key(&self) -> QueryKey;

    /// Copy used when rendering an empty or failed result.
    fn labels(&self) -> CatalogLabels;

    fn query_fn(&self) -> QueryFn<Self::Record>;

    /// Mount the query for one UI scope.
    fn observe(&self) -> Result<QueryObserver<Self::Record>, QueryError> {
        self.client()
            .observe(&self.key(), self.query_fn(), self.options().clone())
    }

    async fn fetch(&self) -> Result<Arc<Vec<Self::Record>>, QueryError> {
        self.client()
            .fetch_query(&self.key(), self.query_fn(), self.options())
            .await
    }

    async fn refetch(&self) -> Result<Arc<Vec<Self::Record>>, QueryError> {
        self.client()
            .refetch(&self.key(), self.query_fn(), self.options())
            .await
    }

    fn invalidate(&self) -> usize {
        self.client().invalidate(&self.key())
    }
}

/// Active events, cached under `events`.
///
/// The source is asked for active events and the response is filtered
/// again, so only `active` records ever reach the cache.
pub struct EventCatalogQuery {
    client: QueryClient,
    source: Arc<dyn EventSource>,
    options: QueryOptions,
}

impl EventCatalogQuery {
    pub fn new(client: QueryClient, source: Arc<dyn EventSource>) -> Self {
        let options = client.default_options().clone();
        Self {
            client,
            source,
            options,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl CatalogQuery for EventCatalogQuery {
    type Record = EventRecord;

    fn client(&self) -> &QueryClient {
        &self.client
    }

    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn key(&self) -> QueryKey {
        QueryKey::from(EVENTS_KEY)
    }

    fn labels(&self) -> CatalogLabels {
        CatalogLabels::EVENTS
    }

    fn query_fn(&self) -> QueryFn<EventRecord> {
        let source = Arc::clone(&self.source);
        query_fn(move || {
            let source = Arc::clone(&source);
            async move {
                let filter = EventFilter::active();
                let mut events = source.list_events(&filter).await?;
                events.retain(|event| filter.matches(event));
                Ok(events)
            }
        })
    }
}

/// Every offered technique, cached under `techniques`.
pub struct TechniqueCatalogQuery {
    client: QueryClient,
    source: Arc<dyn TechniqueSource>,
    options: QueryOptions,
}

impl TechniqueCatalogQuery {
    pub fn new(client: QueryClient, source: Arc<dyn TechniqueSource>) -> Self {
        let options = client.default_options().clone();
        Self {
            client,
            source,
            options,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl CatalogQuery for TechniqueCatalogQuery {
    type Record = TechniqueRecord;

    fn client(&self) -> &QueryClient {
        &self.client
    }

    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn key(&self) -> QueryKey {
        QueryKey::from(TECHNIQUES_KEY)
    }

    fn labels(&self) -> CatalogLabels {
        CatalogLabels::TECHNIQUES
    }

    fn query_fn(&self) -> QueryFn<TechniqueRecord> {
        let source = Arc::clone(&self.source);
        query_fn(move || {
            let source = Arc::clone(&source);
            async move { source.list_techniques().await }
        })
    }
}
