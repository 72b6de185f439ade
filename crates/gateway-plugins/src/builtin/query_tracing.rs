//! Per-query tracing spans.

use crate::capability::{PluginCapabilities, Wrapper};
use async_trait::async_trait;
use gateway_connectors::{Connector, ConnectorConfig, ConnectorError};
use gateway_core::{ColumnSchema, Endpoint, Params, RequestContext, Row, Table};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

pub const DOC: &str = r#"
Wraps every query in a tracing span carrying the tool name, http path,
row count and elapsed time. Slow queries are logged at warn level.

query_tracing:
  slow_query_ms: 1000
  log_params: false
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTracingConfig {
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,

    /// Record parameter values on the span.
    #[serde(default)]
    pub log_params: bool,
}

fn default_slow_query_ms() -> u64 {
    1000
}

pub fn build(config: QueryTracingConfig) -> anyhow::Result<PluginCapabilities> {
    Ok(PluginCapabilities::new(DOC).with_wrapper(Arc::new(QueryTracingPlugin { config })))
}

pub struct QueryTracingPlugin {
    config: QueryTracingConfig,
}

impl Wrapper for QueryTracingPlugin {
    fn wrap(&self, inner: Arc<dyn Connector>) -> anyhow::Result<Arc<dyn Connector>> {
        Ok(Arc::new(TracingConnector {
            inner,
            slow_query: Duration::from_millis(self.config.slow_query_ms),
            log_params: self.config.log_params,
        }))
    }
}

struct TracingConnector {
    inner: Arc<dyn Connector>,
    slow_query: Duration,
    log_params: bool,
}

#[async_trait]
impl Connector for TracingConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        self.inner.ping().await
    }

    async fn query(
        &self,
        ctx: &RequestContext,
        endpoint: &Endpoint,
        params: &Params,
    ) -> Result<Vec<Row>, ConnectorError> {
        let span = tracing::info_span!(
            "query",
            mcp_method = %endpoint.mcp_method,
            http_path = %endpoint.http_path,
            db_system = %self.inner.config().type_name,
            session = ctx.session_id().unwrap_or_default(),
            params = tracing::field::Empty,
            rows = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        );
        if self.log_params {
            span.record("params", tracing::field::display(serde_json::Value::Object(params.clone())));
        }

        let started = Instant::now();
        let result = self
            .inner
            .query(ctx, endpoint, params)
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed();
        span.record("elapsed_ms", elapsed.as_millis() as u64);

        let _entered = span.enter();
        match &result {
            Ok(rows) => {
                span.record("rows", rows.len());
                if elapsed >= self.slow_query {
                    tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, "Slow query");
                } else {
                    tracing::debug!("Query finished");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Query failed"),
        }
        result
    }

    async fn discovery(
        &self,
        ctx: &RequestContext,
        table_filter: &[String],
    ) -> Result<Vec<Table>, ConnectorError> {
        self.inner
            .discovery(ctx, table_filter)
            .instrument(tracing::info_span!("discovery", tables = table_filter.len()))
            .await
    }

    async fn sample(&self, ctx: &RequestContext, table: &Table) -> Result<Vec<Row>, ConnectorError> {
        self.inner
            .sample(ctx, table)
            .instrument(tracing::info_span!("sample", table = %table.name))
            .await
    }

    async fn infer_query(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<Vec<ColumnSchema>, ConnectorError> {
        self.inner
            .infer_query(ctx, query)
            .instrument(tracing::info_span!("infer_query"))
            .await
    }

    fn config(&self) -> ConnectorConfig {
        self.inner.config()
    }
}
