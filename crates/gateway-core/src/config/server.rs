//! HTTP listener settings shared by the REST and SSE transports.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Listen address.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Path prefix for every REST route (e.g. "/api").
    #[serde(default)]
    pub prefix: String,

    /// Upper bound for a single connector call made on behalf of a request.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Expose the raw discovery and query routes under `<prefix>/raw`.
    #[serde(default)]
    pub raw_api: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            prefix: String::new(),
            query_timeout_ms: default_query_timeout_ms(),
            raw_api: false,
        }
    }
}

impl ServerSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn default_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_query_timeout_ms() -> u64 {
    30_000
}
