//! In-memory catalog source.
//!
//! Serves a fixed set of records, either built in code or loaded from a
//! JSON fixture file of the form `{"events": [...], "techniques": [...]}`.
//! Used for offline runs of the CLI and in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::domain::errors::QueryError;
use crate::domain::models::{EventFilter, EventRecord, TechniqueRecord};
use crate::domain::ports::{EventSource, TechniqueSource};

#[derive(Debug, Default, Deserialize)]
struct CatalogFixture {
    #[serde(default)]
    events: Vec<EventRecord>,
    #[serde(default)]
    techniques: Vec<TechniqueRecord>,
}

/// A catalog source backed by vectors held in memory.
#[derive(Debug, Clone)]
pub struct StaticCatalogSource {
    events: Vec<EventRecord>,
    techniques: Vec<TechniqueRecord>,
    filter_events: bool,
}

impl StaticCatalogSource {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            techniques: Vec::new(),
            filter_events: true,
        }
    }

    /// Load records from a JSON fixture file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog fixture {}", path.display()))?;
        let fixture: CatalogFixture = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse catalog fixture {}", path.display()))?;

        Ok(Self::new()
            .with_events(fixture.events)
            .with_techniques(fixture.techniques))
    }

    #[must_use]
    pub fn with_events(mut self, events: Vec<EventRecord>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_techniques(mut self, techniques: Vec<TechniqueRecord>) -> Self {
        self.techniques = techniques;
        self
    }

    /// Ignore the status filter and return every event, like a backend
    /// that does no server-side filtering.
    #[must_use]
    pub fn unfiltered(mut self) -> Self {
        self.filter_events = false;
        self
    }
}

impl Default for StaticCatalogSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for StaticCatalogSource {
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, QueryError> {
        Ok(self
            .events
            .iter()
            .filter(|event| !self.filter_events || filter.matches(event))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TechniqueSource for StaticCatalogSource {
    async fn list_techniques(&self) -> Result<Vec<TechniqueRecord>, QueryError> {
        Ok(self.techniques.clone())
    }
}
