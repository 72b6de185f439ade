//! Plugin capability contracts.

use gateway_connectors::Connector;
use gateway_core::{RequestContext, Row};
use serde_json::Value;
use std::sync::Arc;

/// What an interceptor decided for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowDecision {
    /// Keep the (possibly rewritten) row and pass it to the next interceptor.
    Keep(Row),
    /// Drop the row. No later interceptor sees it.
    Skip,
}

/// Row-level post-query transform or filter.
pub trait Interceptor: Send + Sync {
    fn process(&self, row: Row, ctx: &RequestContext) -> RowDecision;
}

/// Connector decorator.
///
/// The returned connector embeds `inner` and must propagate its errors
/// unchanged, so the authorization kind survives any number of wrappers.
pub trait Wrapper: Send + Sync {
    fn wrap(&self, inner: Arc<dyn Connector>) -> anyhow::Result<Arc<dyn Connector>>;
}

/// Augments an OpenAPI document.
pub trait Swaggerer: Send + Sync {
    fn enrich(&self, doc: Value) -> Value;
}

/// Contributes routes to the HTTP transports.
pub trait HttpServer: Send + Sync {
    fn routes(&self) -> axum::Router;
}

/// The capabilities one configured plugin provides. A plugin may fill any
/// number of slots.
#[derive(Clone, Default)]
pub struct PluginCapabilities {
    pub doc: String,
    pub interceptor: Option<Arc<dyn Interceptor>>,
    pub wrapper: Option<Arc<dyn Wrapper>>,
    pub swaggerer: Option<Arc<dyn Swaggerer>>,
    pub http_server: Option<Arc<dyn HttpServer>>,
}

impl PluginCapabilities {
    pub fn new(doc: impl Into<String>) -> Self {
        Self {
            doc: doc.into(),
            ..Default::default()
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_wrapper(mut self, wrapper: Arc<dyn Wrapper>) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    pub fn with_swaggerer(mut self, swaggerer: Arc<dyn Swaggerer>) -> Self {
        self.swaggerer = Some(swaggerer);
        self
    }

    pub fn with_http_server(mut self, http_server: Arc<dyn HttpServer>) -> Self {
        self.http_server = Some(http_server);
        self
    }

    /// Names of the capabilities present, for listings.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        if self.interceptor.is_some() {
            kinds.push("interceptor");
        }
        if self.wrapper.is_some() {
            kinds.push("wrapper");
        }
        if self.swaggerer.is_some() {
            kinds.push("swaggerer");
        }
        if self.http_server.is_some() {
            kinds.push("http_server");
        }
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

impl std::fmt::Debug for PluginCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCapabilities")
            .field("kinds", &self.kinds())
            .finish()
    }
}
