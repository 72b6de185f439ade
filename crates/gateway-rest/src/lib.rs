//! # gateway-rest
//!
//! REST adapter for the data gateway. Every configured endpoint becomes an
//! HTTP route (`prefix + http_path`, `{name}` placeholders bind path
//! params). Requests flow through the plugin-wrapped connector and the
//! interceptor chain exactly as MCP tool calls do.
//!
//! Additional routes:
//!
//! - `GET /health`
//! - `GET {prefix}/swagger/open_api.json`: OpenAPI 3.1 document, enriched
//!   by swaggerer plugins
//! - `GET {prefix}/raw/{list_tables,discover_data,prepare_query,query}`
//!   when `server.raw_api` is set
//! - every route contributed by an HTTP-server plugin

pub mod error;
pub mod handlers;
pub mod openapi;
pub mod server;

pub use error::RestError;
pub use server::RestGateway;
