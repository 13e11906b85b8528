//! Phase 1: planning.
//!
//! Planning turns a raw query AST into a planned query plus an ordered
//! parameter list and a structural cache key:
//!
//! ```text
//! Query → resolve prefixes → expand association joins
//!       → extract & cast parameters → cache key → Planned
//! ```
//!
//! Pure and synchronous; the schema and type registries are read-only.

use crate::error::{QueryResult, StructuralError};
use crate::query::{Query, QueryOp};
use crate::schema::SchemaProvider;
use crate::types::{TypeRegistry, Value};

pub mod assoc;
pub mod cache_key;
pub mod params;

pub use cache_key::{CacheKey, KeyToken};

// =============================================================================
// Adapter capabilities
// =============================================================================

/// What the storage adapter's plan cache can do.
pub trait AdapterInfo {
    /// Whether the adapter caches parameterized plans at all.
    fn supports_cache(&self) -> bool;

    /// Whether the adapter keeps one cached plan per list length for
    /// variable-length parameter spans.
    fn supports_variable_length_cache_specialization(&self) -> bool {
        false
    }
}

/// Capability descriptor for the common adapter shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdapterCaps {
    pub cache: bool,
    pub length_specialization: bool,
}

impl AdapterInfo for AdapterCaps {
    fn supports_cache(&self) -> bool {
        self.cache
    }

    fn supports_variable_length_cache_specialization(&self) -> bool {
        self.length_specialization
    }
}

// =============================================================================
// Planned output
// =============================================================================

/// The output of planning.
#[derive(Debug, Clone, PartialEq)]
pub struct Planned {
    pub query: Query,
    /// Flat parameter list in canonical clause-major order, already cast
    /// and dumped into adapter representation.
    pub params: Vec<Value>,
    pub cache_key: CacheKey,
}

// =============================================================================
// plan
// =============================================================================

/// Plan a query: prefix resolution, association expansion, parameter
/// extraction and casting, cache key computation.
pub fn plan(
    query: Query,
    op: QueryOp,
    types: &dyn TypeRegistry,
    schemas: &dyn SchemaProvider,
    adapter: &dyn AdapterInfo,
) -> QueryResult<Planned> {
    if query.sources.is_empty() {
        return Err(StructuralError::MissingFrom.into());
    }

    // Step 1: resolve per-source prefixes (a source's own prefix wins over
    // the query-level override).
    let query = resolve_prefixes(query);

    // Step 2: expand symbolic association joins into concrete ones.
    let query = assoc::expand_joins(query, schemas)?;

    // Step 3: extract and cast parameters in canonical clause order.
    let (query, params) = params::ParamPlanner::new(types, schemas).plan(query)?;

    // Step 4: compute the structural cache key.
    let cache_key = cache_key::cache_key(&query, op, schemas, adapter);

    Ok(Planned {
        query,
        params,
        cache_key,
    })
}

fn resolve_prefixes(mut query: Query) -> Query {
    if let Some(prefix) = query.prefix.clone() {
        for source in &mut query.sources {
            if source.prefix().is_none() {
                source.set_prefix(Some(prefix.clone()));
            }
        }
        for join in &mut query.joins {
            if join.source.prefix().is_none() {
                join.source.set_prefix(Some(prefix.clone()));
            }
        }
    }
    let combinations = std::mem::take(&mut query.combinations);
    query.combinations = combinations
        .into_iter()
        .map(|(kind, sub)| (kind, resolve_prefixes(sub)))
        .collect();
    query
}
