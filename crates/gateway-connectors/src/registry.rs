//! Connector registry.

use crate::connector::Connector;
use crate::postgres::{PostgresConfig, PostgresConnector};
use gateway_core::{Registry, RegistryError};
use serde_json::Value;
use std::sync::Arc;

/// Resolves a connector tag and its connection block into a live connector.
pub struct ConnectorRegistry {
    inner: Registry<Arc<dyn Connector>>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            inner: Registry::new("connector"),
        }
    }

    /// A registry holding every built-in connector.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("postgres", PostgresConfig::DOC, |value| {
            let config = PostgresConfig::from_value(value)?;
            Ok(Arc::new(PostgresConnector::new(config)?) as Arc<dyn Connector>)
        });
        registry
    }

    /// Register a connector constructor under `tag`.
    pub fn register<F>(&mut self, tag: &str, doc: &str, constructor: F)
    where
        F: Fn(Value) -> anyhow::Result<Arc<dyn Connector>> + Send + Sync + 'static,
    {
        let owned_tag = tag.to_string();
        self.inner.register(tag, doc, move |value| {
            constructor(value).map_err(|source| RegistryError::Construct {
                tag: owned_tag.clone(),
                source,
            })
        });
    }

    /// Build a connector. A string block is parsed as YAML first, so both
    /// inline documents and bare connection strings are accepted.
    pub fn build(&self, tag: &str, config: Value) -> Result<Arc<dyn Connector>, RegistryError> {
        let config = match config {
            Value::String(raw) => serde_yaml::from_str::<Value>(&raw)
                .ok()
                .filter(|parsed| !parsed.is_null())
                .unwrap_or(Value::String(raw)),
            other => other,
        };

        let connector = self.inner.build(tag, config)?;
        tracing::info!(connector = %tag, "Connector constructed");
        Ok(connector)
    }

    pub fn tags(&self) -> Vec<&str> {
        self.inner.tags()
    }

    pub fn doc(&self, tag: &str) -> Option<&str> {
        self.inner.doc(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.inner.contains(tag)
    }
}
