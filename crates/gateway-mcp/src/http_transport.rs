//! HTTP transport for the MCP server.
//!
//! Two ways in:
//!
//! - **SSE**: `GET {prefix}/sse` opens an event stream whose first event
//!   (`endpoint`) names the URL to POST messages to. Responses and server
//!   notifications for that session arrive as `message` events.
//! - **Direct**: `POST {prefix}/mcp` answers a single JSON-RPC message in
//!   the HTTP response body.

use crate::error::McpError;
use crate::notifications::NotificationContext;
use crate::protocol::JsonRpcResponse;
use crate::server::McpServer;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use gateway_core::RequestContext;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-session buffer for responses waiting to be streamed.
const SESSION_BUFFER: usize = 100;

/// Shared transport state.
pub struct SseState {
    server: Arc<McpServer>,
    prefix: String,
    keep_alive: Duration,
    sessions: RwLock<HashMap<String, mpsc::Sender<JsonRpcResponse>>>,
}

impl SseState {
    pub fn new(server: Arc<McpServer>, prefix: impl Into<String>) -> Self {
        Self {
            server,
            prefix: normalize_prefix(&prefix.into()),
            keep_alive: Duration::from_secs(30),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn session(&self, id: &str) -> Option<mpsc::Sender<JsonRpcResponse>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn remove_session(&self, id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

/// Removes the session when its event stream is dropped.
struct SessionGuard {
    state: Arc<SseState>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.remove_session(&self.session_id);
        tracing::debug!(session = %self.session_id, "SSE session closed");
    }
}

/// Query parameters of the message endpoint.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Create the HTTP router for MCP.
pub fn create_router(state: Arc<SseState>) -> Router {
    mcp_routes(state).route("/health", get(handle_health))
}

/// The MCP routes alone, for mounting next to another service that
/// already answers `/health`.
pub fn mcp_routes(state: Arc<SseState>) -> Router {
    let prefix = state.prefix.clone();
    Router::new()
        .route(&format!("{prefix}/sse"), get(handle_sse))
        .route(&format!("{prefix}/message"), post(handle_message))
        .route(&format!("{prefix}/mcp"), post(handle_mcp_post))
        .with_state(state)
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext::new().with_headers(
        headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))),
    )
}

/// Handle GET {prefix}/sse.
async fn handle_sse(State(state): State<Arc<SseState>>, headers: HeaderMap) -> Response {
    let ctx = request_context(&headers);
    if !state.server.is_authorized(&ctx) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let (response_tx, mut response_rx) = mpsc::channel::<JsonRpcResponse>(SESSION_BUFFER);
    state
        .sessions
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(session_id.clone(), response_tx);

    let mut subscription = state.server.subscribe(NotificationContext {
        client_id: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        session_id: session_id.clone(),
    });
    let endpoint = format!("{}/message?sessionId={}", state.prefix, session_id);
    let guard = SessionGuard {
        state: Arc::clone(&state),
        session_id: session_id.clone(),
    };
    tracing::info!(session = %session_id, "SSE session opened");

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        loop {
            let data = tokio::select! {
                response = response_rx.recv() => match response {
                    Some(response) => serde_json::to_string(&response),
                    None => break,
                },
                notification = subscription.recv() => match notification {
                    Some(n) => serde_json::to_string(&n.notification),
                    None => break,
                },
            };
            match data {
                Ok(data) => yield Ok(Event::default().event("message").data(data)),
                Err(e) => tracing::warn!(error = %e, "Failed to encode SSE message"),
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.keep_alive).text("ping"))
        .into_response()
}

/// Handle POST {prefix}/message?sessionId=...
///
/// The response travels over the session's event stream; the POST itself
/// is acknowledged with 202.
async fn handle_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(session_id) = query.session_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Missing sessionId" })),
        )
            .into_response();
    };
    let Some(sender) = state.session(&session_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Invalid session ID" })),
        )
            .into_response();
    };

    let ctx = request_context(&headers).with_session(&session_id);
    if let Some(response) = state.server.handle_message(ctx, &body).await {
        if sender.send(response).await.is_err() {
            tracing::warn!(session = %session_id, "SSE session went away before response");
        }
    }
    StatusCode::ACCEPTED.into_response()
}

/// Handle POST {prefix}/mcp (JSON-RPC over plain HTTP).
async fn handle_mcp_post(
    State(state): State<Arc<SseState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    match state.server.handle_message(request_context(&headers), &body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Handle health check requests.
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gateway-mcp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// HTTP server for the MCP transport.
pub struct SseServer {
    addr: String,
    state: Arc<SseState>,
}

impl SseServer {
    pub fn new(server: Arc<McpServer>, addr: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            state: Arc::new(SseState::new(server, prefix)),
        }
    }

    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Number of open SSE sessions.
    pub fn session_count(&self) -> usize {
        self.state.session_count()
    }

    /// Run the HTTP server.
    pub async fn run(self) -> Result<(), McpError> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| McpError::StartupFailed(format!("Failed to bind to {}: {}", self.addr, e)))?;

        tracing::info!(addr = %self.addr, prefix = %self.state.prefix, "MCP SSE server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;

        Ok(())
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
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        let server = Arc::new(McpServer::new("gw", "1"));
        create_router(Arc::new(SseState::new(server, "/agents")))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_message_for_unknown_session() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/agents/message?sessionId=nope")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sse_rejected_by_authorizer() {
        let server = Arc::new(McpServer::new("gw", "1"));
        server.add_authorizer(|ctx| ctx.header("x-token") == Some("secret"));
        let app = create_router(Arc::new(SseState::new(server, "")));

        let response = app
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_mcp_routes_leave_health_to_the_host() {
        let server = Arc::new(McpServer::new("gw", "1"));
        let app = mcp_routes(Arc::new(SseState::new(server, "/agents")));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/agents/mcp")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("agents/"), "/agents");
    }
}
