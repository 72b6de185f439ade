//! # gateway-plugins
//!
//! Cross-cutting behaviour for the gateway, expressed as four capabilities:
//!
//! - [`Wrapper`]: decorates a connector (authorization, caching, tracing)
//! - [`Interceptor`]: filters or rewrites each result row after a query
//! - [`Swaggerer`]: augments the generated OpenAPI document
//! - [`HttpServer`]: contributes extra HTTP routes
//!
//! A plugin constructor returns a [`PluginCapabilities`] record in which each
//! capability is either present or absent. [`PluginSet`] resolves the
//! configured plugins in document order and composes them.

pub mod builtin;
pub mod capability;
pub mod chain;
pub mod error;
pub mod registry;
pub mod set;

pub use capability::{HttpServer, Interceptor, PluginCapabilities, RowDecision, Swaggerer, Wrapper};
pub use chain::InterceptorChain;
pub use error::PluginError;
pub use registry::PluginRegistry;
pub use set::PluginSet;
