//! Internal value representation.
//!
//! A `Value` is the currency of the planner: raw placeholder payloads come
//! in as values, casting rewrites them into the internal representation for
//! their semantic type, and dumping rewrites them into whatever the storage
//! adapter expects. The planner itself never interprets values beyond this.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SemanticType;

// =============================================================================
// Value
// =============================================================================

/// A dynamically typed value flowing through plan and normalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    /// Create a string value.
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    /// Create a list value.
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::List(values.into_iter().collect())
    }

    /// The semantic type this value already inhabits, if it maps to one
    /// directly. `Null` and `List` have no intrinsic type.
    pub fn intrinsic_type(&self) -> Option<SemanticType> {
        match self {
            Value::Bool(_) => Some(SemanticType::Bool),
            Value::Int(_) => Some(SemanticType::Int),
            Value::Float(_) => Some(SemanticType::Float),
            Value::Str(_) => Some(SemanticType::Str),
            Value::Bytes(_) => Some(SemanticType::Binary),
            Value::Uuid(_) => Some(SemanticType::Uuid),
            Value::Date(_) => Some(SemanticType::Date),
            Value::DateTime(_) => Some(SemanticType::DateTime),
            Value::Null | Value::List(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Uuid(u) => write!(f, "'{}'", u),
            Value::Date(d) => write!(f, "'{}'", d),
            Value::DateTime(dt) => write!(f, "'{}'", dt.to_rfc3339()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}
