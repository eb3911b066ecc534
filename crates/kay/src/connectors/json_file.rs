//! JSON file source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::debug;

use crate::connectors::common::MAX_FILE_SIZE;
use crate::connectors::Source;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::relay::RelayWriter;

/// Configuration for the JSON file source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFileConfig {
    /// Path to the JSON file.
    pub path: PathBuf,
    /// JSON path to the array of items (e.g., "data.items" or "" for root array).
    #[serde(default)]
    pub array_path: String,
}

/// Reads every item of a JSON array stored in a file.
pub struct JsonFileSource {
    config: JsonFileConfig,
}

impl JsonFileSource {
    /// Creates a new JSON file source.
    #[must_use]
    pub fn new(config: JsonFileConfig) -> Self {
        Self { config }
    }

    /// Loads and parses the file.
    fn load(&self) -> Result<serde_json::Value> {
        let path = &self.config.path;
        let file = File::open(path).map_err(|e| {
            Error::SourceRead(format!(
                "Failed to open JSON file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let size = file.metadata()?.len();
        if size > MAX_FILE_SIZE {
            return Err(Error::SourceRead(format!(
                "JSON file '{}' is too large ({} bytes, max {})",
                path.display(),
                size,
                MAX_FILE_SIZE
            )));
        }

        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::SourceRead(format!("Failed to parse JSON: {}", e)))
    }

    /// Extracts the items array from JSON using the configured path.
    fn extract_array(&self, root: serde_json::Value) -> Result<Vec<serde_json::Value>> {
        if self.config.array_path.is_empty() {
            match root {
                serde_json::Value::Array(arr) => Ok(arr),
                _ => Err(Error::SourceRead(
                    "Root JSON is not an array. Specify array_path.".to_string(),
                )),
            }
        } else {
            let mut current = root;
            for part in self.config.array_path.split('.') {
                current = current
                    .get_mut(part)
                    .map(serde_json::Value::take)
                    .ok_or_else(|| Error::SourceRead(format!("Path '{}' not found", part)))?;
            }
            match current {
                serde_json::Value::Array(arr) => Ok(arr),
                _ => Err(Error::SourceRead(format!(
                    "Path '{}' is not an array",
                    self.config.array_path
                ))),
            }
        }
    }
}

#[async_trait]
impl Source for JsonFileSource {
    fn source_type(&self) -> &'static str {
        "json_file"
    }

    async fn fill(&mut self, relay: RelayWriter) -> Result<u64> {
        let items = self.extract_array(self.load()?)?;
        debug!(
            "{} items found in {}",
            items.len(),
            self.config.path.display()
        );

        let mut count = 0;
        for item in items {
            relay.put_record(Record::from_value(item)?).await?;
            count += 1;
        }
        relay.close_stream().await?;

        Ok(count)
    }
}

#[cfg(test)]
#[path = "json_file_tests.rs"]
mod tests;
