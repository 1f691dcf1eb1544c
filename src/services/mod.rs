//! Service layer: the query cache engine and the catalog queries built on it.

pub mod catalog_queries;
pub mod query_client;
pub mod query_observer;
pub mod retry;

pub use catalog_queries::{
    CatalogQuery, EventCatalogQuery, TechniqueCatalogQuery, EVENTS_KEY, TECHNIQUES_KEY,
};
pub use query_client::{query_fn, QueryClient, QueryFn, QueryFuture};
pub use query_observer::QueryObserver;
pub use retry::RetryPolicy;
