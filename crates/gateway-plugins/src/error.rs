//! Plugin error types.

use gateway_core::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    /// Unknown tag or a config block the plugin rejected.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A plugin constructor produced no capability at all.
    #[error("plugin {0} provides no capability")]
    NoCapability(String),

    /// A wrapper refused to wrap the connector.
    #[error("plugin {tag} failed to wrap connector: {source}")]
    Wrap {
        tag: String,
        #[source]
        source: anyhow::Error,
    },
}
