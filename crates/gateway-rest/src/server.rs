//! REST server: endpoint routes, raw routes, OpenAPI and plugin routes.

use crate::error::RestError;
use crate::handlers::{self, RestState};
use crate::openapi::{self, DocumentSource};
use axum::extract::{Path, Query};
use axum::http::HeaderMap;
use axum::routing::{get, on, MethodFilter, MethodRouter};
use axum::{Json, Router};
use gateway_connectors::{Connector, ConnectorRegistry};
use gateway_core::{Endpoint, GatewayConfig};
use gateway_plugins::{PluginRegistry, PluginSet};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// HTTP face of the data gateway.
pub struct RestGateway {
    config: GatewayConfig,
    plugins: PluginSet,
    prefix: String,
    state: Arc<RestState>,
}

impl RestGateway {
    /// Build the connector, resolve plugins in declared order and wrap.
    pub fn new(
        config: GatewayConfig,
        connectors: &ConnectorRegistry,
        plugins: &PluginRegistry,
    ) -> Result<Self, RestError> {
        let connector =
            connectors.build(&config.database.kind, config.database.connection.clone())?;
        let plugin_set = PluginSet::resolve(plugins, config.plugins.entries())?;
        Self::from_parts(config, connector, plugin_set)
    }

    /// Assemble from already-built parts. Wrappers are applied here.
    pub fn from_parts(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        plugins: PluginSet,
    ) -> Result<Self, RestError> {
        let connector = plugins.wrap(connector)?;
        let state = Arc::new(RestState {
            connector,
            interceptors: plugins.interceptors(),
            query_timeout: config.server.query_timeout(),
        });
        Ok(Self {
            prefix: normalize_prefix(&config.server.prefix),
            config,
            plugins,
            state,
        })
    }

    /// The connector after every wrapper has been applied.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::clone(&self.state.connector)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Check the wrapped connector is reachable.
    pub async fn ping(&self) -> Result<(), RestError> {
        self.state.connector.ping().await?;
        Ok(())
    }

    /// OpenAPI document after every swaggerer plugin has enriched it.
    pub async fn openapi(&self) -> Value {
        let servers = vec![public_url(&self.config.server.addr)];
        let source = DocumentSource {
            api: &self.config.api,
            endpoints: &self.config.database.endpoints,
            prefix: &self.prefix,
            servers: &servers,
            raw_api: self.config.server.raw_api,
        };
        let doc = openapi::document(&source, self.state.connector.as_ref()).await;
        self.plugins.enrich(doc)
    }

    /// Build the full router.
    pub async fn router(&self) -> Router {
        let mut router = Router::new();
        for endpoint in &self.config.database.endpoints {
            if endpoint.http_path.is_empty() {
                continue;
            }
            let Some(filter) = method_filter(&endpoint.http_method) else {
                tracing::warn!(method = %endpoint.http_method, path = %endpoint.http_path, "Skipping endpoint with unsupported method");
                continue;
            };
            let path = format!("{}{}", self.prefix, endpoint.http_path);
            tracing::debug!(method = %endpoint.http_method, path = %path, "Registered endpoint route");
            router = router.route(
                &path,
                endpoint_route(Arc::clone(&self.state), Arc::new(endpoint.clone()), filter),
            );
        }

        let mut internal = Router::new().route("/health", get(handlers::health));
        if self.config.server.raw_api {
            let raw = format!("{}/raw", self.prefix);
            internal = internal
                .route(&format!("{raw}/list_tables"), get(handlers::list_tables))
                .route(&format!("{raw}/discover_data"), get(handlers::discover_data))
                .route(&format!("{raw}/prepare_query"), get(handlers::prepare_query))
                .route(&format!("{raw}/query"), get(handlers::raw_query));
        }

        let doc = Arc::new(self.openapi().await);
        let openapi_path = format!("{}/swagger/open_api.json", self.prefix);
        let openapi_route = Router::new().route(
            &openapi_path,
            get(move || {
                let doc = Arc::clone(&doc);
                async move { Json(doc.as_ref().clone()) }
            }),
        );

        router
            .merge(internal.with_state(Arc::clone(&self.state)))
            .merge(openapi_route)
            .merge(self.plugins.routes())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until Ctrl-C.
    pub async fn serve(self, addr: &str) -> Result<(), RestError> {
        let app = self.router().await;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RestError::StartupFailed(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!(
            addr = %addr,
            prefix = %self.prefix,
            endpoints = self.config.database.endpoints.len(),
            "REST gateway listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RestError::StartupFailed(e.to_string()))?;
        Ok(())
    }
}

fn endpoint_route(
    state: Arc<RestState>,
    endpoint: Arc<Endpoint>,
    filter: MethodFilter,
) -> MethodRouter {
    if endpoint.http_path.contains('{') {
        on(
            filter,
            move |Path(path): Path<HashMap<String, String>>,
                  Query(query): Query<Vec<(String, String)>>,
                  headers: HeaderMap| {
                handlers::serve_endpoint(Arc::clone(&state), Arc::clone(&endpoint), path, query, headers)
            },
        )
    } else {
        on(
            filter,
            move |Query(query): Query<Vec<(String, String)>>, headers: HeaderMap| {
                handlers::serve_endpoint(
                    Arc::clone(&state),
                    Arc::clone(&endpoint),
                    HashMap::new(),
                    query,
                    headers,
                )
            },
        )
    }
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "PATCH" => Some(MethodFilter::PATCH),
        "DELETE" => Some(MethodFilter::DELETE),
        _ => None,
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// URL advertised in the OpenAPI `servers` list for a bind address.
fn public_url(addr: &str) -> String {
    match addr.strip_prefix("0.0.0.0") {
        Some(port) => format!("http://localhost{port}"),
        None => format!("http://{addr}"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api/"), "/api");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_public_url() {
        assert_eq!(public_url("0.0.0.0:9090"), "http://localhost:9090");
        assert_eq!(public_url("10.0.0.5:80"), "http://10.0.0.5:80");
    }

    #[test]
    fn test_method_filter_is_case_insensitive() {
        assert!(method_filter("get").is_some());
        assert!(method_filter("OPTIONS").is_none());
    }
}
