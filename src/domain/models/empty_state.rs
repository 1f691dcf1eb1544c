//! What a catalog page shows for a given query result.

use serde::Serialize;
use std::sync::Arc;

use super::query::{QueryResult, QueryStatus};

/// Generic title used when a query failed and nothing was ever cached.
pub const GENERIC_ERROR_TITLE: &str = "Something went wrong";

/// Placeholder shown instead of a list: a title and an optional description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmptyState {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EmptyState {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Copy shown by one catalog page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLabels {
    /// Title when the query succeeded with zero records
    pub empty_title: &'static str,
    pub empty_description: Option<&'static str>,
    /// Description under the generic error title
    pub error_description: Option<&'static str>,
}

impl CatalogLabels {
    pub const EVENTS: Self = Self {
        empty_title: "No active events",
        empty_description: Some("Check back soon for upcoming events."),
        error_description: Some("We couldn't load events. Please try again later."),
    };

    pub const TECHNIQUES: Self = Self {
        empty_title: "No techniques available",
        empty_description: None,
        error_description: Some("We couldn't load techniques. Please try again later."),
    };

    fn empty_state(&self) -> EmptyState {
        let state = EmptyState::new(self.empty_title);
        match self.empty_description {
            Some(description) => state.with_description(description),
            None => state,
        }
    }

    fn error_state(&self) -> EmptyState {
        let state = EmptyState::new(GENERIC_ERROR_TITLE);
        match self.error_description {
            Some(description) => state.with_description(description),
            None => state,
        }
    }
}

/// Rendering decision derived from a query result.
#[derive(Debug, PartialEq, Eq)]
pub enum CatalogView<T> {
    /// No data yet and no failure to report
    Loading,
    /// Records to list; may be stale if the last refetch failed
    List(Arc<Vec<T>>),
    /// Confirmed empty, or failed with nothing cached
    Empty(EmptyState),
}

impl<T> CatalogView<T> {
    /// Decide what to render.
    ///
    /// "No data yet" and "confirmed empty" are told apart by `data` being
    /// present; an empty list is a success, never an error.
    pub fn from_result(result: &QueryResult<T>, labels: &CatalogLabels) -> Self {
        match (&result.data, result.status) {
            (Some(data), _) if data.is_empty() => Self::Empty(labels.empty_state()),
            (Some(data), _) => Self::List(Arc::clone(data)),
            (None, QueryStatus::Error) => Self::Empty(labels.error_state()),
            (None, _) => Self::Loading,
        }
    }
}
