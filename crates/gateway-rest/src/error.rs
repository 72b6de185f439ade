//! Error types for the REST adapter.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_connectors::ConnectorError;
use gateway_core::RegistryError;
use gateway_plugins::PluginError;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the REST adapter.
#[derive(Debug, Error)]
pub enum RestError {
    /// Failed to start the server.
    #[error("failed to start REST server: {0}")]
    StartupFailed(String),

    /// Connector or plugin lookup failed while assembling the adapter.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// A connector call failed.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// A connector call exceeded the configured query timeout.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid request.
    #[error("{0}")]
    BadRequest(String),

    /// A single-row endpoint found nothing.
    #[error("not found")]
    NotFound,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::Connector(e) if e.is_not_authorized() => StatusCode::UNAUTHORIZED,
            RestError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RestError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self, "Request failed");
        }
        let body = match self {
            RestError::NotFound => json!({}),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RestError::from(ConnectorError::not_authorized("unknown token")).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RestError::from(ConnectorError::Unsupported("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RestError::Timeout(Duration::from_millis(5)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(RestError::NotFound.status(), StatusCode::NOT_FOUND);
    }
}
