//! MCP server settings.

use serde::{Deserialize, Serialize};

/// Settings for the agent-facing protocol server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpSettings {
    /// Server name reported in `initialize`.
    #[serde(default = "default_name")]
    pub name: String,

    /// Server version reported in `initialize`.
    #[serde(default = "default_version")]
    pub version: String,

    /// Free-form usage hints returned to the client in `initialize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Capacity of each session's notification queue.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Reject protocol methods issued before `initialize` completes.
    #[serde(default)]
    pub strict_handshake: bool,

    /// Expose the raw discovery and query tools next to the endpoint tools.
    #[serde(default)]
    pub raw_tools: bool,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            instructions: None,
            notification_capacity: default_notification_capacity(),
            strict_handshake: false,
            raw_tools: false,
        }
    }
}

fn default_name() -> String {
    "mcp-data-gateway".to_string()
}

fn default_version() -> String {
    "0.0.1".to_string()
}

fn default_notification_capacity() -> usize {
    100
}
