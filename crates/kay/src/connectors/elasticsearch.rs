//! Elasticsearch sink.
//!
//! Items are written with the bulk API into a versioned index
//! (`<alias>_<YYYYMMDDHHMMSS>`) which is published under a stable alias, so
//! readers keep querying the alias while a fresh index can be created at any
//! time. The index is created with the mapping of the configured item kind
//! unless it already exists.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::connectors::batch::{BatchWriter, BULK_SIZE};
use crate::connectors::common::{
    build_http_client, handle_http_error, join_url, send, send_checked, validate_url,
};
use crate::connectors::mapping;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::retry::{with_retry, RetryConfig};

const SERVICE: &str = "Elasticsearch";

/// Configuration for the Elasticsearch sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Elasticsearch URL (e.g., http://localhost:9200). May embed credentials.
    pub url: String,
    /// Kind of the items written (perceval, graal, galahad).
    pub items_type: String,
    /// Target index (default: `<alias>_<UTC timestamp>`).
    #[serde(default)]
    pub index: Option<String>,
    /// Alias bound to the index (default: derived from `items_type`).
    #[serde(default)]
    pub index_alias: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Retries for failed connections.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Whether timed out requests are retried.
    #[serde(default = "default_true")]
    pub retry_on_timeout: bool,
    /// Verify TLS certificates.
    #[serde(default)]
    pub verify_certs: bool,
    /// Records per bulk request.
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    /// Optional username for Basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for Basic auth.
    #[serde(default)]
    pub password: Option<String>,
    /// Optional API key for authentication.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Target a cluster that still uses mapping types.
    #[serde(default)]
    pub legacy_types: bool,
}

fn default_timeout() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_bulk_size() -> usize {
    BULK_SIZE
}

impl ElasticsearchConfig {
    /// Creates a configuration with default connection settings.
    pub fn new(url: impl Into<String>, items_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            items_type: items_type.into(),
            index: None,
            index_alias: None,
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_on_timeout: true,
            verify_certs: false,
            bulk_size: BULK_SIZE,
            username: None,
            password: None,
            api_key: None,
            legacy_types: false,
        }
    }
}

/// Generic acknowledgement returned by index administration APIs.
#[derive(Debug, Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

/// Bulk API response.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl BulkItem {
    fn failed(&self) -> bool {
        self.error.is_some() || !(200..300).contains(&self.status)
    }
}

impl BulkResponse {
    /// Failing items, in submission order.
    fn failures(&self) -> Vec<&BulkItem> {
        self.items
            .iter()
            .flat_map(HashMap::values)
            .filter(|item| item.failed())
            .collect()
    }
}

/// Writes batches of records into an aliased Elasticsearch index.
pub struct ElasticsearchIndexer {
    config: ElasticsearchConfig,
    client: Client,
    retry: RetryConfig,
    index: String,
    alias: String,
}

impl ElasticsearchIndexer {
    /// Resolves the index and alias names and builds the HTTP client.
    ///
    /// No request is sent; see [`ElasticsearchIndexer::open`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the URL is invalid.
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        validate_url(&config.url)?;

        let client = build_http_client(Duration::from_secs(config.timeout), config.verify_certs)?;
        let retry = RetryConfig::new(config.max_retries, config.retry_on_timeout);
        let index = non_empty(config.index.as_deref())
            .map_or_else(|| mapping::index_name(&config.items_type), str::to_string);
        let alias = non_empty(config.index_alias.as_deref())
            .unwrap_or_else(|| mapping::alias_for(&config.items_type))
            .to_string();

        Ok(Self {
            config,
            client,
            retry,
            index,
            alias,
        })
    }

    /// Resolves names, creates the index if needed and binds the alias.
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexLifecycle` if the index or the alias cannot be
    /// created. An index created before the alias failed is left in place.
    pub async fn open(config: ElasticsearchConfig) -> Result<Self> {
        let indexer = Self::new(config)?;

        if !mapping::is_supported(&indexer.config.items_type) {
            warn!(
                "Items type {} has no dedicated mapping",
                indexer.config.items_type
            );
        }

        indexer.create_index().await?;
        indexer.create_alias().await?;

        info!(
            "Writing {} items to index {} (alias {})",
            indexer.config.items_type, indexer.index, indexer.alias
        );

        Ok(indexer)
    }

    /// Replaces the connection retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Target index name.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Alias bound to the index.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Makes an authenticated request.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = join_url(&self.config.url, path);
        let mut req = self.client.request(method, url);

        // Apply authentication
        if let Some(api_key) = &self.config.api_key {
            req = req.header("Authorization", format!("ApiKey {}", api_key));
        } else if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            req = req.basic_auth(user, Some(pass));
        }

        req
    }

    /// Checks whether the target index exists.
    pub async fn index_exists(&self) -> Result<bool> {
        with_retry(&self.retry, "index exists", || async move {
            let response = send(self.request(Method::HEAD, &self.index), SERVICE).await?;
            match response.status().as_u16() {
                200 => Ok(true),
                404 => Ok(false),
                status => Err(handle_http_error(status, "", SERVICE)),
            }
        })
        .await
    }

    /// Creates the index with the kind's mapping unless it exists.
    ///
    /// Returns whether the index was created by this call.
    pub async fn create_index(&self) -> Result<bool> {
        let exists = self.index_exists().await.map_err(|e| {
            Error::IndexLifecycle(format!("Cannot check index {}: {}", self.index, e))
        })?;

        if exists {
            warn!("Index {} already exists!", self.index);
            return Ok(false);
        }

        let body = mapping::index_body(&self.config.items_type, self.config.legacy_types);
        let body = &body;
        let created = with_retry(&self.retry, "create index", || async move {
            let response = send_checked(
                self.request(Method::PUT, &self.index).json(body),
                SERVICE,
            )
            .await?;
            response
                .json::<Acknowledged>()
                .await
                .map_err(|e| Error::Connection(format!("Invalid create index response: {}", e)))
        })
        .await;

        match created {
            Ok(ack) if ack.acknowledged => {
                info!("Index {} created", self.index);
                Ok(true)
            }
            Ok(_) => Err(Error::IndexLifecycle(format!(
                "Index {} not created",
                self.index
            ))),
            Err(Error::Status { status: 400, body, .. })
                if body.contains("resource_already_exists_exception") =>
            {
                warn!("Index {} already exists!", self.index);
                Ok(false)
            }
            Err(e) => Err(Error::IndexLifecycle(format!(
                "Index {} not created: {}",
                self.index, e
            ))),
        }
    }

    /// Binds the alias to the index.
    pub async fn create_alias(&self) -> Result<()> {
        let body = serde_json::json!({
            "actions": [
                { "add": { "index": self.index, "alias": self.alias } }
            ]
        });
        let body = &body;

        let ack = with_retry(&self.retry, "create alias", || async move {
            let response =
                send_checked(self.request(Method::POST, "_aliases").json(body), SERVICE).await?;
            response
                .json::<Acknowledged>()
                .await
                .map_err(|e| Error::Connection(format!("Invalid alias response: {}", e)))
        })
        .await
        .map_err(|e| {
            Error::IndexLifecycle(format!(
                "Alias {} not created for {}: {}",
                self.alias, self.index, e
            ))
        })?;

        if !ack.acknowledged {
            return Err(Error::IndexLifecycle(format!(
                "Alias {} not created for {}",
                self.alias, self.index
            )));
        }

        debug!("Alias {} bound to {}", self.alias, self.index);
        Ok(())
    }

    /// Builds the NDJSON body of a bulk request.
    fn build_bulk_body(&self, batch: &[Record]) -> Result<String> {
        let mut body = String::new();

        for record in batch {
            let mut action = serde_json::json!({
                "_index": self.index,
                "_id": record.id(),
            });
            if self.config.legacy_types {
                action["_type"] = serde_json::json!(self.config.items_type);
            }

            body.push_str(&serde_json::to_string(&serde_json::json!({ "index": action }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(record)?);
            body.push('\n');
        }

        Ok(body)
    }

    async fn bulk(&self, body: String) -> Result<BulkResponse> {
        let body = &body;
        with_retry(&self.retry, "bulk", || async move {
            let response = send_checked(
                self.request(Method::POST, "_bulk")
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone()),
                SERVICE,
            )
            .await?;
            response
                .json::<BulkResponse>()
                .await
                .map_err(|e| Error::Connection(format!("Invalid bulk response: {}", e)))
        })
        .await
    }

    async fn refresh(&self) -> Result<()> {
        let path = format!("{}/_refresh", self.index);
        let path = &path;
        with_retry(&self.retry, "refresh", || async move {
            send_checked(self.request(Method::POST, path), SERVICE).await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl BatchWriter for ElasticsearchIndexer {
    fn writer_type(&self) -> &'static str {
        "elasticsearch"
    }

    async fn write_batch(&mut self, batch: &[Record]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let body = self.build_bulk_body(batch)?;
        let response = self.bulk(body).await.map_err(|e| {
            Error::SinkCommit(format!(
                "Bulk request to {} failed: {}",
                self.config.url, e
            ))
        })?;

        self.refresh().await.map_err(|e| {
            Error::SinkCommit(format!("Refresh of {} failed: {}", self.index, e))
        })?;

        let failures = response.failures();
        if response.errors || !failures.is_empty() {
            let detail = failures.first().map_or_else(
                || "no item detail".to_string(),
                |item| {
                    format!(
                        "item {} (status {}): {}",
                        item.id.as_deref().unwrap_or("?"),
                        item.status,
                        item.error
                            .as_ref()
                            .map_or_else(String::new, ToString::to_string)
                    )
                },
            );
            return Err(Error::SinkCommit(format!(
                "Lost items from kay to ES ({}). {} of {} items failed, first error on {}",
                self.config.url,
                failures.len(),
                batch.len(),
                detail
            )));
        }

        debug!("{} items written to {}", batch.len(), self.index);
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "elasticsearch_tests.rs"]
mod tests;
