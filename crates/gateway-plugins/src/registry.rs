//! Plugin registry.

use crate::builtin;
use crate::capability::PluginCapabilities;
use gateway_core::{Registry, RegistryError};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Resolves a plugin tag and its config block into capabilities.
pub struct PluginRegistry {
    inner: Registry<PluginCapabilities>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new("plugin"),
        }
    }

    /// A registry holding every built-in plugin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register a plugin whose constructor takes a typed config.
    pub fn register<C, F>(&mut self, tag: &str, doc: &str, constructor: F)
    where
        C: DeserializeOwned,
        F: Fn(C) -> anyhow::Result<PluginCapabilities> + Send + Sync + 'static,
    {
        self.inner.register_typed(tag, doc, constructor);
    }

    /// Build a plugin. A missing config block counts as an empty mapping.
    pub fn build(&self, tag: &str, config: Value) -> Result<PluginCapabilities, RegistryError> {
        let config = match config {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        self.inner.build(tag, config)
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
