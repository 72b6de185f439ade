//! Connector error types.

use thiserror::Error;

/// Errors returned by connector operations.
///
/// Wrapping connectors propagate the inner connector's errors unchanged, so
/// transports can still recognise the authorization kind after any number of
/// decorators.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The caller is not allowed to perform this call. REST maps it to 401.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// A parameter could not be coerced to its declared type.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },

    /// The connector does not support this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConnectorError {
    pub fn not_authorized(reason: impl Into<String>) -> Self {
        ConnectorError::NotAuthorized(reason.into())
    }

    pub fn is_not_authorized(&self) -> bool {
        matches!(self, ConnectorError::NotAuthorized(_))
    }
}
