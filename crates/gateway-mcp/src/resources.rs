//! Resource and prompt handlers, and URI template matching.

use crate::protocol::{
    GetPromptRequest, GetPromptResult, Prompt, ReadResourceRequest, Resource, ResourceContents,
    ResourceTemplate,
};
use futures::future::BoxFuture;
use gateway_core::RequestContext;
use regex::Regex;
use std::future::Future;
use std::sync::{Arc, LazyLock};

/// Async `resources/read` handler.
pub type ResourceHandler = Arc<
    dyn Fn(RequestContext, ReadResourceRequest) -> BoxFuture<'static, anyhow::Result<Vec<ResourceContents>>>
        + Send
        + Sync,
>;

/// Async `prompts/get` handler.
pub type PromptHandler = Arc<
    dyn Fn(RequestContext, GetPromptRequest) -> BoxFuture<'static, anyhow::Result<GetPromptResult>>
        + Send
        + Sync,
>;

pub fn resource_handler<F, Fut>(f: F) -> ResourceHandler
where
    F: Fn(RequestContext, ReadResourceRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<ResourceContents>>> + Send + 'static,
{
    Arc::new(move |ctx, request| Box::pin(f(ctx, request)))
}

pub fn prompt_handler<F, Fut>(f: F) -> PromptHandler
where
    F: Fn(RequestContext, GetPromptRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<GetPromptResult>> + Send + 'static,
{
    Arc::new(move |ctx, request| Box::pin(f(ctx, request)))
}

#[derive(Clone)]
pub(crate) struct ServerResource {
    pub resource: Resource,
    pub handler: ResourceHandler,
}

#[derive(Clone)]
pub(crate) struct ServerResourceTemplate {
    pub template: ResourceTemplate,
    pub pattern: Regex,
    pub handler: ResourceHandler,
}

#[derive(Clone)]
pub(crate) struct ServerPrompt {
    pub prompt: Prompt,
    pub handler: PromptHandler,
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\{[^}]+\\\}").expect("placeholder pattern is valid"));

/// Compile a URI template into an anchored regex. Every `{name}`
/// placeholder matches one non-empty path segment; the rest is literal.
pub fn template_pattern(uri_template: &str) -> Regex {
    let escaped = regex::escape(uri_template);
    let body = PLACEHOLDER.replace_all(&escaped, "([^/]+)");
    // Escaped literals plus fixed groups always form a valid pattern.
    Regex::new(&format!("^{body}$")).expect("escaped template is a valid pattern")
}

/// Whether `uri` is matched by `uri_template`.
pub fn matches_template(uri_template: &str, uri: &str) -> bool {
    template_pattern(uri_template).is_match(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_matches_one_segment() {
        assert!(matches_template("/widgets/{id}", "/widgets/42"));
        assert!(!matches_template("/widgets/{id}", "/widgets/42/parts"));
        assert!(!matches_template("/widgets/{id}", "/widgets/"));
    }

    #[test]
    fn test_literals_are_escaped() {
        assert!(matches_template("db://tables/{name}.json", "db://tables/users.json"));
        assert!(!matches_template("db://tables/{name}.json", "db://tables/usersxjson"));
    }

    #[test]
    fn test_multiple_placeholders() {
        let pattern = template_pattern("db://{schema}/{table}");
        let captures = pattern.captures("db://public/orders").unwrap();
        assert_eq!(&captures[1], "public");
        assert_eq!(&captures[2], "orders");
    }
}
