//! # gateway-connectors
//!
//! The fixed contract every data source satisfies, plus the registry that
//! resolves a connector tag from configuration into a live connector.
//!
//! ## Concurrency
//!
//! A connector is constructed once per process and shared by every request
//! as an `Arc<dyn Connector>`. Implementations must therefore accept
//! concurrent calls through `&self`; any serialization they need is their own
//! responsibility.
//!
//! ## Cancellation
//!
//! A call is cancelled by dropping its future. Callers apply timeouts with
//! `tokio::time::timeout` and client disconnects drop the handler future, so
//! implementations must not spawn detached work that outlives the call.

pub mod connector;
pub mod error;
pub mod params;
pub mod postgres;
pub mod registry;

pub use connector::{Connector, ConnectorConfig};
pub use error::ConnectorError;
pub use params::{cast_params, guess_column_type, NamedQuery};
pub use registry::ConnectorRegistry;
