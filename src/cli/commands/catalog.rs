//! Catalog listing commands: mount a catalog query, wait for it to settle,
//! then render the records or an empty state.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::adapters::{HttpCatalogConfig, HttpCatalogSource, StaticCatalogSource};
use crate::cli::output::{list_table, output, truncate, CommandOutput};
use crate::cli::types::CatalogArgs;
use crate::domain::models::{
    CatalogView, Config, EmptyState, EventRecord, QueryOptions, QueryResult, QueryStatus,
    TechniqueRecord,
};
use crate::domain::ports::{EventSource, TechniqueSource};
use crate::services::{CatalogQuery, EventCatalogQuery, QueryClient, TechniqueCatalogQuery};

const NAME_WIDTH: usize = 40;

/// Table layout for one record type.
pub trait CatalogRow: Clone + Serialize {
    const ENTITY: &'static str;

    fn headers() -> &'static [&'static str];

    fn row(&self) -> Vec<String>;
}

impl CatalogRow for EventRecord {
    const ENTITY: &'static str = "event";

    fn headers() -> &'static [&'static str] {
        &["id", "name", "starts", "venue"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            truncate(&self.name, NAME_WIDTH),
            self.starts_at
                .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d").to_string()),
            self.venue_id.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

impl CatalogRow for TechniqueRecord {
    const ENTITY: &'static str = "technique";

    fn headers() -> &'static [&'static str] {
        &["id", "name", "category"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            truncate(&self.name, NAME_WIDTH),
            self.category.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

/// Rendered result of a catalog command
#[derive(Debug, Serialize)]
pub struct CatalogOutput<T: CatalogRow> {
    pub key: String,
    pub status: QueryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<T>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_state: Option<EmptyState>,
}

impl<T: CatalogRow> CatalogOutput<T> {
    pub fn new(key: String, result: &QueryResult<T>, view: CatalogView<T>) -> Self {
        let (records, empty_state) = match view {
            CatalogView::List(records) => (Some(records.as_ref().clone()), None),
            CatalogView::Empty(state) => (None, Some(state)),
            CatalogView::Loading => (None, None),
        };

        Self {
            key,
            status: result.status,
            error: result.error.as_ref().map(ToString::to_string),
            stale: result.is_stale,
            records,
            empty_state,
        }
    }
}

impl<T: CatalogRow> CommandOutput for CatalogOutput<T> {
    fn to_human(&self) -> String {
        if let Some(state) = &self.empty_state {
            let mut lines = vec![state.title.clone()];
            if let Some(description) = &state.description {
                lines.push(description.clone());
            }
            if let Some(error) = &self.error {
                lines.push(format!("({error})"));
            }
            return lines.join("\n");
        }

        let Some(records) = &self.records else {
            return "Loading...".to_string();
        };

        let mut table = list_table(T::headers());
        for record in records {
            table.add_row(record.row());
        }

        let noun = if records.len() == 1 {
            T::ENTITY.to_string()
        } else {
            format!("{}s", T::ENTITY)
        };
        let mut rendered = format!("{} {}:\n{}", records.len(), noun, table);
        if let Some(error) = &self.error {
            rendered.push_str(&format!("\nShowing cached data; refresh failed: {error}"));
        }
        rendered
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Mount `query` as one UI scope, wait for it to settle and build the output.
pub async fn render<Q>(query: &Q) -> Result<CatalogOutput<Q::Record>>
where
    Q: CatalogQuery,
    Q::Record: CatalogRow,
{
    let mut observer = query
        .observe()
        .with_context(|| format!("Failed to mount query '{}'", query.key()))?;
    let result = observer.settled().await;
    let view = CatalogView::from_result(&result, &query.labels());

    Ok(CatalogOutput::new(query.key().to_string(), &result, view))
}

fn client_for(config: &Config) -> QueryClient {
    QueryClient::new(QueryOptions::from(&config.query))
}

fn http_source(config: &Config) -> Result<HttpCatalogSource> {
    HttpCatalogSource::new(HttpCatalogConfig::from(&config.api))
}

pub async fn execute_events(args: CatalogArgs, config: &Config, json: bool) -> Result<()> {
    let source: Arc<dyn EventSource> = match args.offline {
        Some(path) => Arc::new(StaticCatalogSource::from_json_file(path)?),
        None => Arc::new(http_source(config)?),
    };
    let query = EventCatalogQuery::new(client_for(config), source);

    output(&render(&query).await?, json);
    Ok(())
}

pub async fn execute_techniques(args: CatalogArgs, config: &Config, json: bool) -> Result<()> {
    let source: Arc<dyn TechniqueSource> = match args.offline {
        Some(path) => Arc::new(StaticCatalogSource::from_json_file(path)?),
        None => Arc::new(http_source(config)?),
    };
    let query = TechniqueCatalogQuery::new(client_for(config), source);

    output(&render(&query).await?, json);
    Ok(())
}
