//! Redis list source.
//!
//! Items are read from a Redis list through a Redis REST endpoint (the
//! command is posted to `<url>/<COMMAND>` with its arguments and the reply
//! comes back as `{"result": ...}`). Each pass reads the whole list, enqueues
//! it, then trims exactly the entries that reached the relay, so items pushed
//! meanwhile, or left behind by an interrupt, stay queued for the next pass.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::connectors::common::{build_http_client, send_checked, validate_url};
use crate::connectors::Source;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::relay::RelayWriter;

/// Configuration for the Redis source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379 or rediss://... for TLS).
    pub url: String,
    /// Redis password (optional).
    #[serde(default)]
    pub password: Option<String>,
    /// List holding the queued items.
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_queue() -> String {
    "items".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl RedisConfig {
    /// Creates a configuration reading the default queue.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: None,
            queue: default_queue(),
            timeout: default_timeout(),
        }
    }
}

/// Redis REST API reply.
#[derive(Debug, Deserialize)]
struct CommandResponse<T> {
    result: T,
}

/// Drains a Redis list.
pub struct RedisSource {
    config: RedisConfig,
    client: Client,
    api_url: String,
}

impl RedisSource {
    /// Creates a new Redis source with configured HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the URL is invalid.
    pub fn new(config: RedisConfig) -> Result<Self> {
        validate_url(&config.url)?;
        let client = build_http_client(Duration::from_secs(config.timeout), true)?;
        let api_url = Self::build_api_url(&config.url);

        Ok(Self {
            config,
            client,
            api_url,
        })
    }

    /// Builds the REST API URL from Redis URL.
    fn build_api_url(redis_url: &str) -> String {
        // Convert redis:// to http:// for REST API
        let url = redis_url
            .replace("rediss://", "https://")
            .replace("redis://", "http://");
        url.trim_end_matches('/').to_string()
    }

    /// Executes a Redis command via REST API.
    async fn execute_command<T: for<'de> Deserialize<'de>>(
        &self,
        command: &str,
        args: &[&str],
    ) -> Result<T> {
        let url = format!("{}/{}", self.api_url, command);

        let mut request = self.client.post(&url);

        if let Some(password) = &self.config.password {
            request = request.header("Authorization", format!("Bearer {}", password));
        }

        let body = serde_json::json!({ "args": args });
        let response = send_checked(request.json(&body), "Redis").await?;

        response
            .json::<CommandResponse<T>>()
            .await
            .map(|reply| reply.result)
            .map_err(|e| Error::SourceRead(format!("Failed to parse Redis response: {}", e)))
    }

    /// Reads every entry of the queue.
    async fn read_all(&self) -> Result<Vec<serde_json::Value>> {
        self.execute_command("LRANGE", &[self.config.queue.as_str(), "0", "-1"])
            .await
    }

    /// Removes the first `count` entries of the queue.
    async fn trim(&self, count: usize) -> Result<()> {
        let start = count.to_string();
        let _: serde_json::Value = self
            .execute_command("LTRIM", &[self.config.queue.as_str(), start.as_str(), "-1"])
            .await?;
        Ok(())
    }
}

/// Decodes one list entry: a JSON document, either as text or already parsed.
fn decode_entry(entry: serde_json::Value) -> Result<Record> {
    match entry {
        serde_json::Value::String(text) => Record::from_json(&text),
        other => Record::from_value(other),
    }
}

#[async_trait]
impl Source for RedisSource {
    fn source_type(&self) -> &'static str {
        "redis"
    }

    async fn fill(&mut self, relay: RelayWriter) -> Result<u64> {
        let entries = self.read_all().await.map_err(into_source_error)?;

        // Decode before enqueueing so a malformed entry leaves the list untouched.
        let records = entries
            .into_iter()
            .map(decode_entry)
            .collect::<Result<Vec<_>>>()?;
        let read = records.len();

        let mut enqueued = 0;
        let mut stopped = None;
        for record in records {
            if let Err(e) = relay.put_record(record).await {
                stopped = Some(e);
                break;
            }
            enqueued += 1;
        }

        // Only entries that reached the relay leave the list.
        if enqueued > 0 {
            self.trim(enqueued).await.map_err(into_source_error)?;
        }
        debug!(
            "{} of {} items moved from Redis queue {}",
            enqueued, read, self.config.queue
        );

        if let Some(e) = stopped {
            return Err(e);
        }
        relay.close_stream().await?;

        Ok(enqueued as u64)
    }
}

fn into_source_error(error: Error) -> Error {
    match error {
        Error::SourceRead(_) => error,
        other => Error::SourceRead(other.to_string()),
    }
}

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;
