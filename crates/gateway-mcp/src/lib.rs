//! # gateway-mcp
//!
//! MCP (Model Context Protocol) server for the data gateway.
//!
//! The crate has two layers:
//!
//! - **Protocol server** ([`McpServer`]): a transport-agnostic JSON-RPC 2.0
//!   dispatcher with tool, resource and prompt registries, tool middleware,
//!   the `initialize` handshake and per-session notification queues.
//! - **Gateway** ([`GatewayMcp`]): turns each configured endpoint into a
//!   typed tool backed by the plugin-wrapped connector, and optionally adds
//!   raw exploration tools (`list_tables`, `discover_data`, `prepare_query`,
//!   `query`).
//!
//! ## Architecture
//!
//! ```text
//! AI Agent
//!       │
//!       │ JSON-RPC over stdio or SSE
//!       ▼
//! ┌──────────────────┐
//! │  McpServer       │
//! │  1. Validate     │
//! │  2. Dispatch     │
//! │  3. Middleware   │
//! └────────┬─────────┘
//!          │ tools/call
//!          ▼
//! ┌──────────────────┐
//! │  Endpoint tool   │
//! │  wrapped conn.   │  ← wrapper plugins
//! │  interceptors    │  ← interceptor plugins
//! └────────┬─────────┘
//!          ▼
//!     Data source
//! ```
//!
//! ## Example Usage
//!
//! ```ignore
//! use gateway_core::GatewayConfig;
//! use gateway_connectors::ConnectorRegistry;
//! use gateway_mcp::GatewayMcp;
//! use gateway_plugins::PluginRegistry;
//!
//! let config = GatewayConfig::from_file("gateway.yaml")?;
//! let gateway = GatewayMcp::new(
//!     &config,
//!     &ConnectorRegistry::with_builtins(),
//!     &PluginRegistry::with_builtins(),
//! )?;
//! gateway.stdio().run().await?;
//! ```

pub mod error;
pub mod gateway;
pub mod http_transport;
pub mod notifications;
pub mod prompt;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod stdio;
pub mod tools;

pub use error::McpError;
pub use gateway::GatewayMcp;
pub use http_transport::SseServer;
pub use notifications::{NotificationContext, ServerNotification, Subscription};
pub use protocol::{
    CallToolRequest, CallToolResult, Content, JsonRpcNotification, JsonRpcResponse, Prompt,
    Resource, ResourceContents, ResourceTemplate, Tool,
};
pub use resources::{prompt_handler, resource_handler, PromptHandler, ResourceHandler};
pub use server::McpServer;
pub use stdio::StdioServer;
pub use tools::{middleware_fn, tool_handler, ServerTool, ToolHandler, ToolMiddleware};
