//! Semantic types and the pluggable type registry.
//!
//! The planner never hard-codes how a raw value becomes a typed one: casting
//! (raw → internal representation) and dumping (internal → adapter
//! representation) go through a [`TypeRegistry`]. [`PrimitiveTypes`] covers
//! the built-in scalar types; callers with domain types implement the trait
//! themselves and delegate the primitives.

use serde::{Deserialize, Serialize};

pub mod primitive;
pub mod value;

pub use primitive::{default_registry, PrimitiveTypes};
pub use value::Value;

// =============================================================================
// Semantic Types
// =============================================================================

/// A semantic type tag, as carried by schema field definitions and explicit
/// type-tag expression nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    Bool,
    Int,
    Float,
    Str,
    Binary,
    Uuid,
    Date,
    DateTime,
    /// An adapter- or application-defined type, handled by a custom registry.
    Custom(String),
}

impl SemanticType {
    /// Whether dumping a value of this type changes its representation.
    ///
    /// Types with an identity dump can embed literals directly; the rest
    /// need a dump pass before the adapter sees them.
    pub fn has_identity_dump(&self) -> bool {
        matches!(
            self,
            SemanticType::Bool
                | SemanticType::Int
                | SemanticType::Float
                | SemanticType::Str
                | SemanticType::Binary
        )
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticType::Bool => write!(f, "bool"),
            SemanticType::Int => write!(f, "int"),
            SemanticType::Float => write!(f, "float"),
            SemanticType::Str => write!(f, "string"),
            SemanticType::Binary => write!(f, "binary"),
            SemanticType::Uuid => write!(f, "uuid"),
            SemanticType::Date => write!(f, "date"),
            SemanticType::DateTime => write!(f, "datetime"),
            SemanticType::Custom(name) => write!(f, "{}", name),
        }
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// A value could not be cast to its target semantic type.
///
/// The planner wraps this with the clause name and rendered expression
/// before surfacing it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot cast {value} to type {target}")]
pub struct CastError {
    pub value: Value,
    pub target: SemanticType,
}

/// A value could not be dumped into the adapter representation.
///
/// Distinct from [`CastError`]: dump failures are about representation,
/// cast failures are about type compatibility.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot dump {value} as type {target}")]
pub struct DumpError {
    pub value: Value,
    pub target: SemanticType,
}

// =============================================================================
// TypeRegistry
// =============================================================================

/// Pluggable cast/dump capability consumed by plan and normalize.
///
/// Implementations must be pure: same inputs, same outputs, no side effects.
/// Both phases call into the registry from a single thread but share the
/// reference across concurrent plans.
pub trait TypeRegistry {
    /// Cast a raw value into the internal representation of `target`.
    ///
    /// Must be idempotent: a value already in internal representation
    /// casts to itself.
    fn cast(&self, value: &Value, target: &SemanticType) -> Result<Value, CastError>;

    /// Dump an internal value into the representation the storage adapter
    /// expects for `target`.
    fn dump(&self, value: &Value, target: &SemanticType) -> Result<Value, DumpError>;
}
