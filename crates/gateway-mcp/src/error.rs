//! Error types for the MCP crate.

use gateway_core::RegistryError;
use gateway_plugins::PluginError;
use thiserror::Error;

/// Errors that can occur in the MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// A registration needs a capability the server was built without.
    #[error("{0} capability is not enabled")]
    CapabilityDisabled(&'static str),

    /// No subscriber is registered for the session.
    #[error("no notification subscriber for session {0}")]
    NotSubscribed(String),

    /// The session's notification queue is at capacity.
    #[error("notification channel full or blocked for session {0}")]
    QueueFull(String),

    /// The session's notification receiver is gone.
    #[error("notification channel closed for session {0}")]
    SubscriptionClosed(String),

    /// A broadcast could not reach every subscriber.
    #[error("notification dropped for sessions: {}", .sessions.join(", "))]
    NotificationsDropped { sessions: Vec<String> },

    /// Transport error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Connector or plugin lookup failed while assembling the gateway.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Plugin resolution or wrapping failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl McpError {
    /// Notification delivery failures never invalidate the mutation that
    /// triggered them.
    pub fn is_notification_failure(&self) -> bool {
        matches!(
            self,
            McpError::NotSubscribed(_)
                | McpError::QueueFull(_)
                | McpError::SubscriptionClosed(_)
                | McpError::NotificationsDropped { .. }
        )
    }
}
