//! # Quarry
//!
//! A relational query planner and normalizer for composable query ASTs.
//!
//! ## Architecture
//!
//! Quarry sits between a query-builder surface and a storage adapter:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Query AST (built by the DSL layer)            │
//! │   (sources, joins, filters, projections, updates)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [plan]
//! ┌─────────────────────────────────────────────────────────┐
//! │  Planned Query + ordered parameter list + cache key      │
//! │  (associations expanded, placeholders cast & extracted)  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [normalize]
//! ┌─────────────────────────────────────────────────────────┐
//! │       Normalized Query (validated, select expanded)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [storage adapter — external]
//! ```
//!
//! Both phases are pure, synchronous transformations over immutable query
//! values: no I/O, no shared mutable state, safe to run concurrently
//! against shared schema and type registries.

pub mod error;
pub mod normalize;
pub mod plan;
pub mod prepare;
pub mod query;
pub mod schema;
pub mod types;

pub use error::{QueryError, QueryResult, StructuralError, ValidationError};
pub use plan::{plan, AdapterCaps, AdapterInfo, CacheKey, Planned};
pub use prepare::{prepare, Prepared};
pub use query::{Expr, Query, QueryOp};
pub use types::{SemanticType, TypeRegistry, Value};
