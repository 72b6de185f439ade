//! Row interceptor chain.

use crate::capability::{Interceptor, RowDecision};
use gateway_core::{RequestContext, Row};
use std::sync::Arc;

/// Interceptors in declared order, applied to every result row.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<(String, Arc<dyn Interceptor>)>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor. It runs after every interceptor already present.
    pub fn push(&mut self, tag: impl Into<String>, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push((tag.into(), interceptor));
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run one row through the chain. `None` means some interceptor skipped it.
    pub fn process_row(&self, row: Row, ctx: &RequestContext) -> Option<Row> {
        let mut current = row;
        for (tag, interceptor) in &self.interceptors {
            match interceptor.process(current, ctx) {
                RowDecision::Keep(next) => current = next,
                RowDecision::Skip => {
                    tracing::trace!(interceptor = %tag, "Row skipped");
                    return None;
                }
            }
        }
        Some(current)
    }

    /// Run every row through the chain, keeping the survivors in order.
    pub fn apply(&self, rows: Vec<Row>, ctx: &RequestContext) -> Vec<Row> {
        if self.interceptors.is_empty() {
            return rows;
        }
        rows.into_iter()
            .filter_map(|row| self.process_row(row, ctx))
            .collect()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|(tag, _)| tag))
            .finish()
    }
}
