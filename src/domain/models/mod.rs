pub mod config;
pub mod empty_state;
pub mod event;
pub mod query;
pub mod technique;

pub use config::{ApiConfig, Config, LoggingConfig, QueryConfig, RetryConfig, SiteConfig};
pub use empty_state::{CatalogLabels, CatalogView, EmptyState, GENERIC_ERROR_TITLE};
pub use event::{EventFilter, EventRecord, EventStatus};
pub use query::{
    QueryKey, QueryOptions, QueryResult, QueryState, QueryStatus, DEFAULT_STALE_TIME,
};
pub use technique::TechniqueRecord;
