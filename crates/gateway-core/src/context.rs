//! Request-scoped context values.
//!
//! Every transport builds a [`RequestContext`] per inbound request (REST call,
//! MCP tool call, resource read) and passes it by reference down through the
//! wrapped connector and the interceptor chain. It is immutable once built.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Values attached to one inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Header name (lowercased) to values, in arrival order.
    headers: HashMap<String, Vec<String>>,
    /// Claims established by an authenticating wrapper or transport.
    claims: Map<String, Value>,
    /// MCP session this request belongs to, if any.
    session_id: Option<String>,
}

impl RequestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header value. Header names are case-insensitive.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Append many header values at once.
    pub fn with_headers<K, V, I>(mut self, headers: I) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (name, value) in headers {
            self = self.with_header(name, value);
        }
        self
    }

    /// Replace the claims.
    pub fn with_claims(mut self, claims: Map<String, Value>) -> Self {
        self.claims = claims;
        self
    }

    /// Add a single claim.
    pub fn with_claim(mut self, name: impl Into<String>, value: Value) -> Self {
        self.claims.insert(name.into(), value);
        self
    }

    /// Tag the context with the MCP session it belongs to.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All headers, keyed by lowercased name.
    pub fn headers(&self) -> &HashMap<String, Vec<String>> {
        &self.headers
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}
