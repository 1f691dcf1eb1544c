use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Publication status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Draft,
    Closed,
    Cancelled,
    /// Any status the data access layer reports that this client does not know
    #[serde(other)]
    Unknown,
}

impl EventStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Draft => "draft",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "draft" => Ok(Self::Draft),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            "unknown" => Ok(Self::Unknown),
            _ => Err(anyhow::anyhow!("Invalid event status: {s}")),
        }
    }
}

/// An event (expo, fair, showcase) as returned by the data access layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Publication status
    pub status: EventStatus,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Venue hosting the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Create an event record with only the identifying fields set
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: EventStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            description: None,
            venue_id: None,
            starts_at: None,
            ends_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }
}

/// Filter passed to [`EventSource::list_events`](crate::domain::ports::EventSource::list_events)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    pub status: EventStatus,
}

impl EventFilter {
    pub const fn active() -> Self {
        Self {
            status: EventStatus::Active,
        }
    }

    pub fn matches(&self, event: &EventRecord) -> bool {
        event.status == self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_through_str() {
        for status in [
            EventStatus::Active,
            EventStatus::Draft,
            EventStatus::Closed,
            EventStatus::Cancelled,
            EventStatus::Unknown,
        ] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
            assert_eq!(status.to_string().parse::<EventStatus>().unwrap(), status);
        }
        assert!("archived".parse::<EventStatus>().is_err());
    }

    #[test]
    fn test_unknown_status_is_preserved_as_unknown() {
        let json = r#"{"id":"9","name":"Expo Z","status":"archived"}"#;
        let event: EventRecord = serde_json::from_str(json).unwrap();
        assert_eq!(event.status, EventStatus::Unknown);
        assert!(!event.is_active());
    }

    #[test]
    fn test_minimal_record_deserializes() {
        let json = r#"{"id":"1","name":"Expo A","status":"active"}"#;
        let event: EventRecord = serde_json::from_str(json).unwrap();
        assert_eq!(event, EventRecord::new("1", "Expo A", EventStatus::Active));
    }

    #[test]
    fn test_active_filter() {
        let filter = EventFilter::active();
        assert!(filter.matches(&EventRecord::new("1", "A", EventStatus::Active)));
        assert!(!filter.matches(&EventRecord::new("2", "B", EventStatus::Draft)));
    }
}
