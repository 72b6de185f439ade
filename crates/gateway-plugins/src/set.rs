//! Ordered plugin composition.

use crate::capability::PluginCapabilities;
use crate::chain::InterceptorChain;
use crate::error::PluginError;
use crate::registry::PluginRegistry;
use gateway_connectors::Connector;
use gateway_core::PluginEntry;
use serde_json::Value;
use std::sync::Arc;

/// One resolved plugin.
#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    pub tag: String,
    pub capabilities: PluginCapabilities,
}

/// The configured plugins, resolved once per process, in document order.
#[derive(Debug, Clone, Default)]
pub struct PluginSet {
    plugins: Vec<ResolvedPlugin>,
}

impl PluginSet {
    /// Resolve every entry through the registry. Any unknown tag or rejected
    /// config fails the whole set.
    pub fn resolve(registry: &PluginRegistry, entries: &[PluginEntry]) -> Result<Self, PluginError> {
        let mut plugins = Vec::with_capacity(entries.len());
        for entry in entries {
            let capabilities = registry.build(&entry.tag, entry.config.clone())?;
            if capabilities.is_empty() {
                return Err(PluginError::NoCapability(entry.tag.clone()));
            }
            tracing::info!(
                plugin = %entry.tag,
                capabilities = ?capabilities.kinds(),
                "Plugin resolved"
            );
            plugins.push(ResolvedPlugin {
                tag: entry.tag.clone(),
                capabilities,
            });
        }
        Ok(Self { plugins })
    }

    /// Build a set directly from already constructed plugins.
    pub fn from_plugins(plugins: Vec<ResolvedPlugin>) -> Self {
        Self { plugins }
    }

    pub fn tags(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.tag.as_str()).collect()
    }

    pub fn plugins(&self) -> &[ResolvedPlugin] {
        &self.plugins
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// The same plugins with their wrappers dropped. Used when a second
    /// transport shares a connector that is already wrapped.
    pub fn without_wrappers(&self) -> Self {
        let plugins = self
            .plugins
            .iter()
            .map(|p| ResolvedPlugin {
                tag: p.tag.clone(),
                capabilities: PluginCapabilities {
                    wrapper: None,
                    ..p.capabilities.clone()
                },
            })
            .collect();
        Self { plugins }
    }

    /// Fold every wrapper over `connector`. The first declared wrapper ends
    /// up innermost and the last declared one outermost.
    pub fn wrap(&self, connector: Arc<dyn Connector>) -> Result<Arc<dyn Connector>, PluginError> {
        let mut current = connector;
        for plugin in &self.plugins {
            if let Some(wrapper) = &plugin.capabilities.wrapper {
                current = wrapper.wrap(current).map_err(|source| PluginError::Wrap {
                    tag: plugin.tag.clone(),
                    source,
                })?;
                tracing::debug!(plugin = %plugin.tag, "Connector wrapped");
            }
        }
        Ok(current)
    }

    /// Interceptors in declared order.
    pub fn interceptors(&self) -> InterceptorChain {
        let mut chain = InterceptorChain::new();
        for plugin in &self.plugins {
            if let Some(interceptor) = &plugin.capabilities.interceptor {
                chain.push(plugin.tag.clone(), interceptor.clone());
            }
        }
        chain
    }

    /// Pass an OpenAPI document through every swaggerer in declared order.
    pub fn enrich(&self, doc: Value) -> Value {
        self.plugins
            .iter()
            .filter_map(|p| p.capabilities.swaggerer.as_ref())
            .fold(doc, |doc, swaggerer| swaggerer.enrich(doc))
    }

    /// Every plugin-provided route, merged.
    pub fn routes(&self) -> axum::Router {
        self.plugins
            .iter()
            .filter_map(|p| p.capabilities.http_server.as_ref())
            .fold(axum::Router::new(), |router, server| router.merge(server.routes()))
    }
}
