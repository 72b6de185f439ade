//! # gateway-core
//!
//! Shared building blocks for the data gateway:
//!
//! - **Configuration**: the declarative gateway document (`api`, `database`,
//!   `plugins`, `mcp`, `server`) with environment expansion and ordered plugins.
//! - **Data model**: endpoints, tables, column schemas and result rows.
//! - **Request context**: request-scoped headers, claims and session id that
//!   every transport hands to connectors and plugins.
//! - **Registry primitives**: tag-keyed factories that turn an untyped config
//!   block into a typed, capability-bearing instance.

pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod registry;

pub use config::{
    ApiConfig, DatabaseConfig, GatewayConfig, McpSettings, PluginEntry, PluginList,
    ServerSettings,
};
pub use context::RequestContext;
pub use error::ConfigError;
pub use model::{ColumnSchema, ColumnType, Endpoint, EndpointParam, Params, Row, Table};
pub use registry::{remap, Registry, RegistryError};
