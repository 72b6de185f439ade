//! The connector contract.

use crate::error::ConnectorError;
use async_trait::async_trait;
use gateway_core::{ColumnSchema, Endpoint, Params, RequestContext, Row, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Static description of a connector implementation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Registry tag of the implementation (e.g. "postgres").
    pub type_name: String,

    /// Human readable description of the connection block.
    #[serde(default)]
    pub doc: String,

    /// Whether the data source only supports reads.
    #[serde(default)]
    pub readonly: bool,

    /// Shape of the connection block, for documentation.
    #[serde(default)]
    pub schema: Value,

    /// Dialect hints appended to query-writing prompts.
    #[serde(default)]
    pub extra_prompt: String,
}

/// A live handle to one data source.
///
/// Every transport and every wrapping plugin consumes data sources only
/// through this trait.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Check that the data source is reachable.
    async fn ping(&self) -> Result<(), ConnectorError>;

    /// Run an endpoint query with the given parameters.
    async fn query(
        &self,
        ctx: &RequestContext,
        endpoint: &Endpoint,
        params: &Params,
    ) -> Result<Vec<Row>, ConnectorError>;

    /// List tables with their columns. An empty filter means every table.
    async fn discovery(
        &self,
        ctx: &RequestContext,
        table_filter: &[String],
    ) -> Result<Vec<Table>, ConnectorError>;

    /// Fetch a handful of rows from a table.
    async fn sample(&self, ctx: &RequestContext, table: &Table)
        -> Result<Vec<Row>, ConnectorError>;

    /// Describe the result columns of a raw query without returning rows.
    async fn infer_query(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<Vec<ColumnSchema>, ConnectorError>;

    fn config(&self) -> ConnectorConfig;
}
