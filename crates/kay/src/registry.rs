//! Registration table of sources, sinks and backends.
//!
//! A backend is a named (source, sink) pair such as `redis2es`. Each source
//! and sink is built by a factory receiving the endpoint parameters; the
//! factory deserializes its own typed configuration, so parameters meant for
//! another connector are ignored.

use futures::future::BoxFuture;
use std::collections::BTreeMap;

use crate::config::EndpointConfig;
use crate::connectors::elasticsearch::{ElasticsearchConfig, ElasticsearchIndexer};
use crate::connectors::json_file::{JsonFileConfig, JsonFileSource};
use crate::connectors::none::NoneSink;
use crate::connectors::redis::{RedisConfig, RedisSource};
use crate::connectors::{BatchedSink, Sink, Source};
use crate::error::{Error, Result};

/// Builds a source from its parameters.
pub type SourceFactory = fn(serde_yaml::Value) -> BoxFuture<'static, Result<Box<dyn Source>>>;

/// Builds a sink from its parameters.
pub type SinkFactory = fn(serde_yaml::Value) -> BoxFuture<'static, Result<Box<dyn Sink>>>;

/// A named source/sink pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Backend name.
    pub name: &'static str,
    /// Registered source name.
    pub source: &'static str,
    /// Registered sink name.
    pub sink: &'static str,
}

/// Name-indexed factories.
#[derive(Default)]
pub struct Registry {
    sources: BTreeMap<&'static str, SourceFactory>,
    sinks: BTreeMap<&'static str, SinkFactory>,
    backends: BTreeMap<&'static str, Backend>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in connectors and backends.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_source("json_file", json_file_source);
        registry.register_source("redis", redis_source);

        registry.register_sink("elasticsearch", elasticsearch_sink);
        registry.register_sink("none", none_sink);

        registry.register_backend("redis2es", "redis", "elasticsearch");
        registry.register_backend("json2es", "json_file", "elasticsearch");
        registry.register_backend("redis2none", "redis", "none");

        registry
    }

    /// Registers a source factory, replacing any previous one.
    pub fn register_source(&mut self, name: &'static str, factory: SourceFactory) {
        self.sources.insert(name, factory);
    }

    /// Registers a sink factory, replacing any previous one.
    pub fn register_sink(&mut self, name: &'static str, factory: SinkFactory) {
        self.sinks.insert(name, factory);
    }

    /// Registers a backend as a pair of registered names.
    pub fn register_backend(
        &mut self,
        name: &'static str,
        source: &'static str,
        sink: &'static str,
    ) {
        self.backends.insert(name, Backend { name, source, sink });
    }

    /// Whether a source is registered under this name.
    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Whether a sink is registered under this name.
    pub fn has_sink(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    /// Looks up a backend.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownBackend` if no backend has this name.
    pub fn backend(&self, name: &str) -> Result<&Backend> {
        self.backends
            .get(name)
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    /// Registered backends, by name.
    pub fn backends(&self) -> impl Iterator<Item = &Backend> {
        self.backends.values()
    }

    /// Builds the source described by an endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownBackend` for an unregistered type, or the
    /// factory's error.
    pub async fn create_source(&self, endpoint: &EndpointConfig) -> Result<Box<dyn Source>> {
        let kind = endpoint.kind()?;
        let factory = self
            .sources
            .get(kind)
            .ok_or_else(|| Error::UnknownBackend(format!("source '{}'", kind)))?;
        factory(endpoint.params_value()).await
    }

    /// Builds the sink described by an endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownBackend` for an unregistered type, or the
    /// factory's error.
    pub async fn create_sink(&self, endpoint: &EndpointConfig) -> Result<Box<dyn Sink>> {
        let kind = endpoint.kind()?;
        let factory = self
            .sinks
            .get(kind)
            .ok_or_else(|| Error::UnknownBackend(format!("sink '{}'", kind)))?;
        factory(endpoint.params_value()).await
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(kind: &str, params: serde_yaml::Value) -> Result<T> {
    serde_yaml::from_value(params)
        .map_err(|e| Error::Config(format!("Invalid {} configuration: {}", kind, e)))
}

fn json_file_source(params: serde_yaml::Value) -> BoxFuture<'static, Result<Box<dyn Source>>> {
    Box::pin(async move {
        let config: JsonFileConfig = parse_params("json_file", params)?;
        Ok(Box::new(JsonFileSource::new(config)) as Box<dyn Source>)
    })
}

fn redis_source(params: serde_yaml::Value) -> BoxFuture<'static, Result<Box<dyn Source>>> {
    Box::pin(async move {
        let config: RedisConfig = parse_params("redis", params)?;
        Ok(Box::new(RedisSource::new(config)?) as Box<dyn Source>)
    })
}

fn elasticsearch_sink(params: serde_yaml::Value) -> BoxFuture<'static, Result<Box<dyn Sink>>> {
    Box::pin(async move {
        let config: ElasticsearchConfig = parse_params("elasticsearch", params)?;
        let bulk_size = config.bulk_size;
        let indexer = ElasticsearchIndexer::open(config).await?;
        Ok(Box::new(BatchedSink::with_bulk_size(indexer, bulk_size)) as Box<dyn Sink>)
    })
}

fn none_sink(_params: serde_yaml::Value) -> BoxFuture<'static, Result<Box<dyn Sink>>> {
    Box::pin(async { Ok(Box::new(NoneSink::new()) as Box<dyn Sink>) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backends() {
        let registry = Registry::with_defaults();
        let names: Vec<&str> = registry.backends().map(|b| b.name).collect();
        assert_eq!(names, vec!["json2es", "redis2es", "redis2none"]);

        let backend = registry.backend("redis2es").unwrap();
        assert_eq!(backend.source, "redis");
        assert_eq!(backend.sink, "elasticsearch");
    }

    #[test]
    fn test_backends_refer_to_registered_connectors() {
        let registry = Registry::with_defaults();
        for backend in registry.backends() {
            assert!(registry.has_source(backend.source), "{}", backend.name);
            assert!(registry.has_sink(backend.sink), "{}", backend.name);
        }
    }

    #[test]
    fn test_unknown_backend() {
        let registry = Registry::with_defaults();
        assert!(matches!(
            registry.backend("kafka2es"),
            Err(Error::UnknownBackend(_))
        ));
    }

    #[tokio::test]
    async fn test_create_unknown_source() {
        let registry = Registry::with_defaults();
        let result = registry.create_source(&EndpointConfig::new("kafka")).await;
        assert!(matches!(result, Err(Error::UnknownBackend(_))));
    }

    #[tokio::test]
    async fn test_create_source_ignores_foreign_keys() {
        let registry = Registry::with_defaults();
        let endpoint = EndpointConfig::new("redis")
            .with_param("url", "redis://localhost:6379")
            .with_param("es_url", "http://localhost:9200")
            .with_param("items_type", "perceval");

        let source = registry.create_source(&endpoint).await.unwrap();

        assert_eq!(source.source_type(), "redis");
    }

    #[tokio::test]
    async fn test_create_source_missing_required_key() {
        let registry = Registry::with_defaults();
        let result = registry.create_source(&EndpointConfig::new("json_file")).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_create_none_sink() {
        let registry = Registry::with_defaults();
        let sink = registry
            .create_sink(&EndpointConfig::new("none").with_param("url", "ignored"))
            .await
            .unwrap();
        assert_eq!(sink.sink_type(), "none");
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = Registry::new();
        registry.register_sink("discard", none_sink);
        registry.register_backend("json2discard", "json_file", "discard");

        assert!(registry.has_sink("discard"));
        assert!(!registry.has_source("json_file"));
        assert_eq!(registry.backend("json2discard").unwrap().sink, "discard");
    }
}
