//! Storefront - catalog client with a keyed query cache
//!
//! Storefront lists the active events and available techniques of a
//! storefront catalog API. Every read goes through a process-wide query
//! cache that de-duplicates concurrent fetches, serves fresh data without
//! refetching, keeps stale data visible while a refetch is in flight or
//! after it fails, and drops responses that a newer fetch superseded.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): records, query state, errors and ports
//! - **Service Layer** (`services`): the query cache engine and catalog queries
//! - **Adapters** (`adapters`): HTTP and in-memory catalog sources
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use storefront::adapters::StaticCatalogSource;
//! use storefront::services::{CatalogQuery, EventCatalogQuery, QueryClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = QueryClient::default();
//!     let query = EventCatalogQuery::new(client, Arc::new(StaticCatalogSource::new()));
//!     let events = query.fetch().await?;
//!     println!("{} active events", events.len());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    CatalogView, Config, EmptyState, EventRecord, EventStatus, QueryKey, QueryOptions,
    QueryResult, QueryStatus, TechniqueRecord,
};
pub use domain::QueryError;
pub use services::{
    CatalogQuery, EventCatalogQuery, QueryClient, QueryObserver, TechniqueCatalogQuery,
};
