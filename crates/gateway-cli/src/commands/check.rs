//! `gateway check` command implementation.
//!
//! Loads the configuration, builds the connector and every plugin exactly
//! as `start` would, then pings the data source.

use super::load_config;
use anyhow::{Context, Result};
use clap::Args;
use gateway_connectors::ConnectorRegistry;
use gateway_plugins::{PluginRegistry, PluginSet};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Configuration file path.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.yaml")]
    pub config: PathBuf,

    /// Skip the connectivity check.
    #[arg(long, default_value_t = false)]
    pub offline: bool,
}

pub async fn run(args: CheckArgs) -> Result<()> {
    let connectors = ConnectorRegistry::with_builtins();
    let plugins = PluginRegistry::with_builtins();
    let summary = check(&args, &connectors, &plugins).await?;

    println!("✓ {}", args.config.display());
    println!("  connector: {}", summary.connector);
    println!("  endpoints: {}", summary.endpoints);
    if summary.plugins.is_empty() {
        println!("  plugins:   (none)");
    } else {
        println!("  plugins:   {}", summary.plugins.join(", "));
    }
    if !args.offline {
        println!("  ping:      ok");
    }
    Ok(())
}

#[derive(Debug)]
pub struct CheckSummary {
    pub connector: String,
    pub endpoints: usize,
    pub plugins: Vec<String>,
}

pub async fn check(
    args: &CheckArgs,
    connectors: &ConnectorRegistry,
    plugins: &PluginRegistry,
) -> Result<CheckSummary> {
    let config = load_config(&args.config)?;

    let connector = connectors
        .build(&config.database.kind, config.database.connection.clone())
        .with_context(|| format!("Failed to build connector {}", config.database.kind))?;
    let plugin_set = PluginSet::resolve(plugins, config.plugins.entries())
        .context("Failed to resolve plugins")?;
    let connector = plugin_set
        .wrap(connector)
        .context("Failed to wrap connector")?;

    if !args.offline {
        connector
            .ping()
            .await
            .with_context(|| format!("Unable to reach {} data source", config.database.kind))?;
        tracing::info!(connector = %config.database.kind, "Ping succeeded");
    }

    Ok(CheckSummary {
        connector: config.database.kind.clone(),
        endpoints: config.database.endpoints.len(),
        plugins: plugin_set.tags().into_iter().map(str::to_string).collect(),
    })
}
