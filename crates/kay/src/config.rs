//! Configuration types for kay.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::relay::DEFAULT_RELAY_CAPACITY;

/// Main transfer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Registered backend naming the source and sink types (e.g. `redis2es`).
    #[serde(default)]
    pub backend: Option<String>,
    /// Source storage configuration.
    #[serde(default)]
    pub source: EndpointConfig,
    /// Sink storage configuration.
    #[serde(default)]
    pub sink: EndpointConfig,
    /// Transfer options.
    #[serde(default)]
    pub options: TransferOptions,
}

/// One end of a transfer: its registered type plus the parameters handed to
/// the type's factory.
///
/// Parameters are kept untyped here; each factory deserializes the keys it
/// declares and ignores the others.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Registered source/sink name. May be filled from the backend.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Connector parameters.
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

impl EndpointConfig {
    /// Creates an endpoint of the given type with no parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Returns the registered type, failing if none was configured.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the type is missing.
    pub fn kind(&self) -> Result<&str> {
        self.kind
            .as_deref()
            .ok_or_else(|| Error::Config("endpoint type is not set".to_string()))
    }

    /// Parameters as a YAML mapping, ready to be deserialized by a factory.
    #[must_use]
    pub fn params_value(&self) -> serde_yaml::Value {
        let mapping = self
            .params
            .iter()
            .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
            .collect::<serde_yaml::Mapping>();
        serde_yaml::Value::Mapping(mapping)
    }
}

/// Transfer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Start a new cycle after each one completes.
    #[serde(default = "default_true")]
    pub keep_alive: bool,
    /// Seconds to rest between two cycles.
    #[serde(default)]
    pub rest: u64,
    /// Items the relay holds before the source waits for the sink.
    #[serde(default = "default_relay_capacity")]
    pub relay_capacity: usize,
    /// Keep running after a failed cycle (keep-alive only).
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            keep_alive: true,
            rest: 0,
            relay_capacity: default_relay_capacity(),
            continue_on_error: false,
        }
    }
}

impl TransferOptions {
    /// Rest interval between cycles.
    #[must_use]
    pub fn rest_duration(&self) -> Duration {
        Duration::from_secs(self.rest)
    }

    /// Validates the option combination.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a rest interval is set without keep-alive,
    /// or if the relay capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.keep_alive && self.rest > 0 {
            return Err(Error::Config(
                "rest cannot be set when keep_alive is disabled".to_string(),
            ));
        }
        if self.relay_capacity == 0 {
            return Err(Error::Config(
                "relay_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_relay_capacity() -> usize {
    DEFAULT_RELAY_CAPACITY
}

impl TransferConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Fills missing endpoint types from the backend.
    ///
    /// Types set explicitly on an endpoint take precedence.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownBackend` if the backend is not registered.
    pub fn resolve(&mut self, registry: &Registry) -> Result<()> {
        if let Some(name) = &self.backend {
            let backend = registry.backend(name)?;
            if self.source.kind.is_none() {
                self.source.kind = Some(backend.source.to_string());
            }
            if self.sink.kind.is_none() {
                self.sink.kind = Some(backend.sink.to_string());
            }
        }
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Call after [`TransferConfig::resolve`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        self.options.validate()?;

        let source = self.source.kind().map_err(|_| {
            Error::Config("source type is not set and no backend was given".to_string())
        })?;
        let sink = self.sink.kind().map_err(|_| {
            Error::Config("sink type is not set and no backend was given".to_string())
        })?;

        if !registry.has_source(source) {
            return Err(Error::UnknownBackend(format!("source '{}'", source)));
        }
        if !registry.has_sink(sink) {
            return Err(Error::UnknownBackend(format!("sink '{}'", sink)));
        }
        Ok(())
    }
}
