//! Query cache models: keys, statuses and the state published to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::config::{QueryConfig, RetryConfig};
use crate::domain::errors::QueryError;

/// Staleness window used by both catalog queries (five minutes).
pub const DEFAULT_STALE_TIME: Duration = Duration::from_millis(300_000);

/// Stable identity of one cacheable query, e.g. `["events"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Build a key from its segments.
    ///
    /// # Example
    /// ```
    /// use storefront::domain::models::QueryKey;
    ///
    /// let key = QueryKey::new(["events"]);
    /// assert_eq!(key.to_string(), "events");
    /// ```
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns true if `prefix` matches the leading segments of this key.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl From<&str> for QueryKey {
    fn from(segment: &str) -> Self {
        Self::new([segment])
    }
}

/// Fetch status of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// Nothing has been requested yet
    #[default]
    Idle,
    Loading,
    Error,
    Success,
}

impl QueryStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-query options: staleness window and retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Age after which cached data is eligible for refetch
    pub stale_time: Duration,

    /// Retry policy for transient fetch failures
    pub retry: RetryConfig,
}

impl QueryOptions {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Disable retrying so a single failed attempt settles the query.
    pub fn without_retry(mut self) -> Self {
        self.retry.max_retries = 0;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            retry: RetryConfig::default(),
        }
    }
}

impl From<&QueryConfig> for QueryOptions {
    fn from(config: &QueryConfig) -> Self {
        Self {
            stale_time: Duration::from_millis(config.stale_time_ms),
            retry: config.retry.clone(),
        }
    }
}

/// State of one cache entry, as published to subscribers.
///
/// `data` survives failed refetches: when `status` is `Error` the last
/// successful value is still present.
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<Vec<T>>>,
    pub status: QueryStatus,
    pub error: Option<QueryError>,
    /// Wall-clock time of the last successful fetch
    pub data_updated_at: Option<DateTime<Utc>>,
    /// Monotonic time of the last successful fetch, used for staleness
    pub fetched_at: Option<Instant>,
    /// True while a fetch for this key is in flight
    pub is_fetching: bool,
    /// Set by invalidation; forces the next access to refetch
    pub is_invalidated: bool,
}

impl<T> QueryState<T> {
    /// Returns true if the data is missing, invalidated or older than `stale_time`.
    pub fn is_stale(&self, stale_time: Duration, now: Instant) -> bool {
        if self.is_invalidated {
            return true;
        }
        match self.fetched_at {
            Some(fetched_at) => now.saturating_duration_since(fetched_at) >= stale_time,
            None => true,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            data_updated_at: None,
            fetched_at: None,
            is_fetching: false,
            is_invalidated: false,
        }
    }
}

// Manual impl: cloning shares the data Arc, so `T: Clone` is not required.
impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            data_updated_at: self.data_updated_at,
            fetched_at: self.fetched_at,
            is_fetching: self.is_fetching,
            is_invalidated: self.is_invalidated,
        }
    }
}

/// Read-only view of a query handed to UI collaborators.
#[derive(Debug)]
pub struct QueryResult<T> {
    pub data: Option<Arc<Vec<T>>>,
    pub status: QueryStatus,
    pub error: Option<QueryError>,
    pub data_updated_at: Option<DateTime<Utc>>,
    pub is_fetching: bool,
    pub is_stale: bool,
}

impl<T> QueryResult<T> {
    pub fn from_state(state: &QueryState<T>, stale_time: Duration, now: Instant) -> Self {
        Self {
            data: state.data.clone(),
            status: state.status,
            error: state.error.clone(),
            data_updated_at: state.data_updated_at,
            is_fetching: state.is_fetching,
            is_stale: state.is_stale(stale_time, now),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Borrow the records, if any have been fetched.
    pub fn records(&self) -> Option<&[T]> {
        self.data.as_deref().map(Vec::as_slice)
    }
}

impl<T> Clone for QueryResult<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            data_updated_at: self.data_updated_at,
            is_fetching: self.is_fetching,
            is_stale: self.is_stale,
        }
    }
}
