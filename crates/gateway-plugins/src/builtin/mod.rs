//! Built-in plugins.

pub mod api_keys;
pub mod column_mask;
pub mod lru_cache;
pub mod query_tracing;
pub mod row_filter;

use crate::registry::PluginRegistry;

pub(crate) fn register_all(registry: &mut PluginRegistry) {
    registry.register("api_keys", api_keys::DOC, api_keys::build);
    registry.register("column_mask", column_mask::DOC, column_mask::build);
    registry.register("lru_cache", lru_cache::DOC, lru_cache::build);
    registry.register("query_tracing", query_tracing::DOC, query_tracing::build);
    registry.register("row_filter", row_filter::DOC, row_filter::build);
}
