//! Domain errors for the storefront catalog queries.

use thiserror::Error;

use super::models::QueryKey;

/// Errors a query can surface to its observers.
///
/// Errors are stored inside cache entries and handed to every waiter of a
/// shared fetch, so the type is `Clone` and carries messages rather than
/// the underlying transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The request never produced a response (connection refused, timeout, DNS).
    #[error("Network error: {0}")]
    Network(String),

    /// The data access layer answered with a non-success status.
    #[error("Request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body could not be decoded into records.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// A key was reused with a different record type.
    #[error("Query key '{0}' is already cached with a different record type")]
    TypeMismatch(QueryKey),

    /// Every scope that requested the fetch was torn down before it resolved.
    #[error("Fetch for '{0}' was cancelled")]
    Cancelled(QueryKey),

    /// The query function panicked; the payload message is kept.
    #[error("Query function panicked: {0}")]
    Panicked(String),
}

impl QueryError {
    /// Returns true for the NetworkError kind: transport failures and
    /// non-success responses.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http { .. })
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Decode(_) | Self::TypeMismatch(_) | Self::Cancelled(_) | Self::Panicked(_) => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
