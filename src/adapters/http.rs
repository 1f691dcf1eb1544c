//! HTTP catalog adapter.
//!
//! Talks to the storefront catalog API:
//! - `GET {base_url}/events?status=<status>`
//! - `GET {base_url}/techniques`
//!
//! Both endpoints answer a JSON array of records.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::errors::QueryError;
use crate::domain::models::{ApiConfig, EventFilter, EventRecord, TechniqueRecord};
use crate::domain::ports::{EventSource, TechniqueSource};

/// Maximum number of body bytes kept in an error message
const ERROR_BODY_LIMIT: usize = 512;

/// Configuration for the HTTP catalog client
#[derive(Debug, Clone)]
pub struct HttpCatalogConfig {
    /// Base URL of the catalog API, without trailing slash
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Bearer token, if the API requires one
    pub auth_token: Option<String>,
}

impl Default for HttpCatalogConfig {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for HttpCatalogConfig {
    fn from(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            auth_token: config.auth_token.clone(),
        }
    }
}

/// Catalog data access over HTTP, implementing both catalog ports.
pub struct HttpCatalogSource {
    http_client: ReqwestClient,
    config: HttpCatalogConfig,
}

impl HttpCatalogSource {
    pub fn new(config: HttpCatalogConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, QueryError> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self.http_client.get(&url).query(query);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "catalog API responded");

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(QueryError::Http {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_BODY_LIMIT {
        return trimmed.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[async_trait]
impl EventSource for HttpCatalogSource {
    #[instrument(skip(self), fields(status = %filter.status))]
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, QueryError> {
        self.get_json("/events", &[("status", filter.status.as_str())])
            .await
    }
}

#[async_trait]
impl TechniqueSource for HttpCatalogSource {
    #[instrument(skip(self))]
    async fn list_techniques(&self) -> Result<Vec<TechniqueRecord>, QueryError> {
        self.get_json("/techniques", &[]).await
    }
}
