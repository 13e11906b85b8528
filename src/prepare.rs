//! End-to-end preparation from query AST to adapter-ready form.
//!
//! This module provides the high-level API chaining both phases:
//!
//! ```text
//! Query AST → Plan (params + cache key) → Normalize → Prepared
//! ```
//!
//! # Example
//!
//! ```ignore
//! use quarry::prepare::prepare;
//! use quarry::query::{Expr, Query, QueryOp};
//!
//! let query = Query::from_schema("Post", "posts")
//!     .where_(Expr::eq(Expr::field(0, "id"), Expr::pinned(42i64)));
//!
//! let prepared = prepare(query, QueryOp::All, &catalog, &types, &adapter)?;
//! adapter.execute(&prepared.query, &prepared.params);
//! ```

use crate::error::QueryResult;
use crate::normalize;
use crate::plan::{self, AdapterInfo, CacheKey};
use crate::query::{Query, QueryOp};
use crate::schema::SchemaProvider;
use crate::types::{TypeRegistry, Value};

// ============================================================================
// Result Types
// ============================================================================

/// Result of preparing a query for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    /// The normalized query, ready for adapter translation.
    pub query: Query,

    /// Ordered parameter values, cast and dumped into adapter
    /// representation.
    pub params: Vec<Value>,

    /// Structural cache key, or the no-cache sentinel.
    pub cache_key: CacheKey,
}

// ============================================================================
// Preparation
// ============================================================================

/// Prepare a query: plan then normalize.
///
/// # Arguments
///
/// * `query` - The raw query AST from the builder layer
/// * `op` - The operation to prepare for
/// * `schemas` - Read-only schema metadata
/// * `types` - Cast/dump registry
/// * `adapter` - Adapter capability descriptor
pub fn prepare(
    query: Query,
    op: QueryOp,
    schemas: &dyn SchemaProvider,
    types: &dyn TypeRegistry,
    adapter: &dyn AdapterInfo,
) -> QueryResult<Prepared> {
    // Step 1: plan — prefixes, association joins, parameters, cache key.
    let planned = plan::plan(query, op, types, schemas, adapter)?;

    // Step 2: normalize — validate clauses and flatten the projection.
    let normalized = normalize::normalize(planned, op, types, schemas)?;

    Ok(Prepared {
        query: normalized.query,
        params: normalized.params,
        cache_key: normalized.cache_key,
    })
}
