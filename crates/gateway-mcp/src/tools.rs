//! Tool handlers and middleware.
//!
//! A [`ServerTool`] pairs a [`Tool`] definition with the handler that
//! answers `tools/call`. Middleware wraps a `ServerTool` into another one;
//! [`compose`] folds the registered middleware so the last one added runs
//! first.

use crate::protocol::{CallToolRequest, CallToolResult, Tool};
use async_trait::async_trait;
use futures::future::BoxFuture;
use gateway_core::RequestContext;
use std::future::Future;
use std::sync::Arc;

/// Async tool handler.
pub type ToolHandler = Arc<
    dyn Fn(RequestContext, CallToolRequest) -> BoxFuture<'static, anyhow::Result<CallToolResult>>
        + Send
        + Sync,
>;

/// Box an async closure as a [`ToolHandler`].
pub fn tool_handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(RequestContext, CallToolRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CallToolResult>> + Send + 'static,
{
    Arc::new(move |ctx, request| Box::pin(f(ctx, request)))
}

/// A tool definition with its handler.
#[derive(Clone)]
pub struct ServerTool {
    pub tool: Tool,
    pub handler: ToolHandler,
}

impl ServerTool {
    pub fn new(tool: Tool, handler: ToolHandler) -> Self {
        Self { tool, handler }
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }

    /// Invoke the handler.
    pub async fn call(
        &self,
        ctx: RequestContext,
        request: CallToolRequest,
    ) -> anyhow::Result<CallToolResult> {
        (self.handler)(ctx, request).await
    }
}

impl std::fmt::Debug for ServerTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerTool").field("tool", &self.tool).finish_non_exhaustive()
    }
}

/// Wraps every `tools/call`.
///
/// `next` is the rest of the chain; its `tool` field is the definition
/// being called.
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    async fn handle(
        &self,
        ctx: RequestContext,
        next: ServerTool,
        request: CallToolRequest,
    ) -> anyhow::Result<CallToolResult>;
}

/// Middleware backed by an async closure.
pub struct FnMiddleware<F> {
    f: F,
}

/// Build a [`ToolMiddleware`] from an async closure.
pub fn middleware_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(RequestContext, ServerTool, CallToolRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CallToolResult>> + Send + 'static,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F, Fut> ToolMiddleware for FnMiddleware<F>
where
    F: Fn(RequestContext, ServerTool, CallToolRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CallToolResult>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: RequestContext,
        next: ServerTool,
        request: CallToolRequest,
    ) -> anyhow::Result<CallToolResult> {
        (self.f)(ctx, next, request).await
    }
}

/// Fold middleware around a tool. The last element ends up outermost.
pub fn compose(tool: ServerTool, middlewares: &[Arc<dyn ToolMiddleware>]) -> ServerTool {
    middlewares.iter().fold(tool, |inner, middleware| {
        let definition = inner.tool.clone();
        let middleware = Arc::clone(middleware);
        let handler: ToolHandler = Arc::new(move |ctx, request| {
            let middleware = Arc::clone(&middleware);
            let next = inner.clone();
            Box::pin(async move { middleware.handle(ctx, next, request).await })
        });
        ServerTool::new(definition, handler)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(log: Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn ToolMiddleware> {
        Arc::new(middleware_fn(move |ctx, next: ServerTool, request| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{label}:{}", next.tool.name));
                next.call(ctx, request).await
            }
        }))
    }

    #[tokio::test]
    async fn test_compose_runs_last_registered_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_log = Arc::clone(&log);
        let tool = ServerTool::new(
            Tool::new("echo"),
            tool_handler(move |_ctx, _req| {
                let log = Arc::clone(&inner_log);
                async move {
                    log.lock().unwrap().push("handler".to_string());
                    Ok(CallToolResult::text("done"))
                }
            }),
        );

        let composed = compose(
            tool,
            &[recording(Arc::clone(&log), "a"), recording(Arc::clone(&log), "b")],
        );
        let result = composed
            .call(RequestContext::new(), CallToolRequest::default())
            .await
            .unwrap();

        assert_eq!(result.joined_text(), "done");
        assert_eq!(*log.lock().unwrap(), vec!["b:echo", "a:echo", "handler"]);
        assert_eq!(composed.name(), "echo");
    }

    #[tokio::test]
    async fn test_middleware_can_short_circuit() {
        let deny: Arc<dyn ToolMiddleware> = Arc::new(middleware_fn(|_ctx, next: ServerTool, _req| async move {
            Ok(CallToolResult::error(format!("{} is disabled", next.tool.name)))
        }));
        let tool = ServerTool::new(
            Tool::new("drop_everything"),
            tool_handler(|_ctx, _req| async { anyhow::bail!("handler must not run") }),
        );

        let result = compose(tool, &[deny])
            .call(RequestContext::new(), CallToolRequest::default())
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.joined_text(), "drop_everything is disabled");
    }
}
