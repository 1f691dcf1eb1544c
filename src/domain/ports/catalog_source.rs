//! Catalog data access ports.

use async_trait::async_trait;

use crate::domain::errors::QueryError;
use crate::domain::models::{EventFilter, EventRecord, TechniqueRecord};

/// Data access interface for events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// List events matching `filter`.
    ///
    /// Implementations may filter server-side; callers still must not
    /// assume they did.
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, QueryError>;
}

/// Data access interface for techniques.
#[async_trait]
pub trait TechniqueSource: Send + Sync {
    /// List every technique currently offered.
    async fn list_techniques(&self) -> Result<Vec<TechniqueRecord>, QueryError>;
}
