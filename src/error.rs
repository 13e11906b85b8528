//! Error types for plan and normalize.
//!
//! Four kinds, all synchronous and unrecoverable: structural errors are
//! query-construction bugs, cast/dump errors are value problems found while
//! extracting parameters, validation errors are field- and literal-level
//! misuse. Every variant carries enough context to render a precise
//! diagnostic; the only valid caller response is to fix the query.

use crate::query::QueryOp;
use crate::types::{CastError, DumpError, SemanticType, Value};

// =============================================================================
// Structural errors
// =============================================================================

/// The query's clause structure is invalid for planning.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StructuralError {
    #[error("query has no from source")]
    MissingFrom,

    #[error("cannot join on association {name:?}: source {ix} has no schema")]
    SchemalessJoin { ix: usize, name: String },

    #[error("association {name:?} not found on schema {schema}")]
    UnknownAssociation { schema: String, name: String },

    #[error("schema {schema} is not known to the provider")]
    UnknownSchema { schema: String },

    #[error("association {name:?} on schema {schema} forms a through cycle")]
    AssociationCycle { schema: String, name: String },

    #[error("`{clause}` is not allowed in `{op}` queries")]
    InvalidClause { op: QueryOp, clause: &'static str },

    #[error("update_all requires at least one update entry")]
    NoUpdates,

    #[error("duplicate field {field:?} in update set")]
    DuplicateUpdateField { field: String },

    #[error("dynamic expression interpolated in {clause} where a value was expected: {expr}")]
    ExprInValuePosition { clause: &'static str, expr: String },

    #[error("list interpolated in {clause} where a single value was expected: {expr}")]
    ListInValuePosition { clause: &'static str, expr: String },

    #[error("preload binding {binding} is not part of the selected row")]
    BindingNotSelected { binding: usize },

    #[error("association {name:?} in select has no matching preload binding")]
    UnboundAssociationSelect { name: String },

    #[error("preload references binding {binding} but the query declares only {sources} sources")]
    TooManyBindings { binding: usize, sources: usize },

    #[error("window {name:?} is not defined")]
    UnknownWindow { name: String },
}

// =============================================================================
// Validation errors
// =============================================================================

/// A field- or literal-level misuse found during normalization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("field {field:?} does not exist on schema {schema}")]
    UnknownField { schema: String, field: String },

    #[error("field {field:?} on schema {schema} is virtual and cannot be used here")]
    VirtualField { schema: String, field: String },

    #[error("literal {value} in {clause} does not match type {ty} of field {field:?}")]
    LiteralTypeMismatch {
        clause: &'static str,
        value: Value,
        field: String,
        ty: SemanticType,
    },

    #[error("{name:?} on schema {schema} is not an association")]
    NotAnAssociation { schema: String, name: String },
}

// =============================================================================
// QueryError
// =============================================================================

/// Any error produced by plan or normalize.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("{source} in {clause}: {expr}")]
    Cast {
        source: CastError,
        clause: &'static str,
        expr: String,
    },

    #[error("{source} in {clause}: {expr}")]
    Dump {
        source: DumpError,
        clause: &'static str,
        expr: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl QueryError {
    pub(crate) fn cast(source: CastError, clause: &'static str, expr: impl ToString) -> Self {
        QueryError::Cast {
            source,
            clause,
            expr: expr.to_string(),
        }
    }

    pub(crate) fn dump(source: DumpError, clause: &'static str, expr: impl ToString) -> Self {
        QueryError::Dump {
            source,
            clause,
            expr: expr.to_string(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
