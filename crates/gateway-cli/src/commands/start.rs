//! `gateway start` command implementation.

use super::load_config;
use anyhow::{bail, Context, Result};
use axum::Router;
use clap::{Args, Subcommand};
use gateway_connectors::{Connector, ConnectorRegistry};
use gateway_core::GatewayConfig;
use gateway_mcp::GatewayMcp;
use gateway_plugins::{PluginRegistry, PluginSet};
use gateway_rest::RestGateway;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Paths the MCP transport claims under the server prefix.
const MCP_PATHS: [&str; 3] = ["/sse", "/message", "/mcp"];

/// Transports the gateway can serve.
#[derive(Debug, Subcommand)]
pub enum StartCommand {
    /// Serve the configured endpoints as REST routes.
    Rest(ListenArgs),

    /// Serve the MCP protocol over HTTP with Server-Sent Events.
    Mcp(ListenArgs),

    /// Serve the MCP protocol over stdin/stdout.
    Stdio(StdioArgs),

    /// Serve REST, OpenAPI and MCP over SSE on a single listener.
    All(ListenArgs),
}

/// Arguments for the network transports.
#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Configuration file path.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.yaml")]
    pub config: PathBuf,

    /// Listen address. Overrides `server.addr`.
    #[arg(long)]
    pub addr: Option<String>,
}

#[derive(Debug, Args)]
pub struct StdioArgs {
    /// Configuration file path.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.yaml")]
    pub config: PathBuf,
}

pub async fn run(cmd: StartCommand) -> Result<()> {
    let connectors = ConnectorRegistry::with_builtins();
    let plugins = PluginRegistry::with_builtins();

    match cmd {
        StartCommand::Rest(args) => {
            let mut config = load_config(&args.config)?;
            if let Some(addr) = args.addr {
                config.server.addr = addr;
            }
            let addr = config.server.addr.clone();
            let gateway = RestGateway::new(config, &connectors, &plugins)
                .context("Failed to assemble REST gateway")?;
            gateway.serve(&addr).await?;
        }
        StartCommand::Mcp(args) => {
            let config = load_config(&args.config)?;
            let addr = args.addr.unwrap_or_else(|| config.server.addr.clone());
            let gateway = GatewayMcp::new(&config, &connectors, &plugins)
                .context("Failed to assemble MCP gateway")?;
            gateway.sse(addr, config.server.prefix.clone()).run().await?;
        }
        StartCommand::Stdio(args) => {
            let config = load_config(&args.config)?;
            let gateway = GatewayMcp::new(&config, &connectors, &plugins)
                .context("Failed to assemble MCP gateway")?;
            tracing::info!(tools = gateway.server().list_tools().len(), "Serving MCP over stdio");
            gateway.stdio().run().await?;
        }
        StartCommand::All(args) => {
            let mut config = load_config(&args.config)?;
            if let Some(addr) = args.addr {
                config.server.addr = addr;
            }
            let connector = connectors
                .build(&config.database.kind, config.database.connection.clone())
                .context("Failed to build connector")?;
            let plugin_set = PluginSet::resolve(&plugins, config.plugins.entries())
                .context("Failed to resolve plugins")?;
            let addr = config.server.addr.clone();
            let prefix = config.server.prefix.clone();
            let app = combined_router(config, connector, plugin_set).await?;
            serve(&addr, &prefix, app).await?;
        }
    }

    Ok(())
}

/// REST routes, the OpenAPI document and the MCP HTTP routes on one router.
/// Both faces share the wrapped connector, so wrapper state such as a
/// result cache is shared too.
pub async fn combined_router(
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    plugins: PluginSet,
) -> Result<Router> {
    let prefix = config.server.prefix.trim_end_matches('/').to_string();
    if let Some(endpoint) = config.database.endpoints.iter().find(|e| {
        MCP_PATHS
            .iter()
            .any(|p| e.http_path == *p || e.http_path.starts_with(&format!("{p}/")))
    }) {
        bail!(
            "endpoint path {}{} collides with the MCP transport",
            prefix,
            endpoint.http_path
        );
    }

    let mcp_plugins = plugins.without_wrappers();
    let rest = RestGateway::from_parts(config, connector, plugins)
        .context("Failed to assemble REST gateway")?;
    let mcp = GatewayMcp::from_config(rest.config(), rest.connector(), mcp_plugins)
        .context("Failed to assemble MCP gateway")?;
    tracing::info!(
        tools = mcp.server().list_tools().len(),
        plugins = ?rest.plugins().tags(),
        "Combined gateway ready"
    );

    Ok(rest.router().await.merge(mcp.routes(prefix)))
}

async fn serve(addr: &str, prefix: &str, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(addr = %addr, prefix = %prefix, "Gateway listening for REST and MCP");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;
    Ok(())
}
