//! CLI command implementations.

pub mod check;
pub mod list;
pub mod start;

use anyhow::{Context, Result};
use gateway_core::GatewayConfig;
use std::path::Path;

pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    GatewayConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
