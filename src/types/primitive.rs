//! Built-in cast and dump rules for the primitive semantic types.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use uuid::Uuid;

use super::{CastError, DumpError, SemanticType, TypeRegistry, Value};

/// The default registry for the built-in scalar types.
///
/// `Custom` types are rejected here; registries that know about domain
/// types wrap this and handle their own tags first.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveTypes;

static DEFAULT: Lazy<PrimitiveTypes> = Lazy::new(PrimitiveTypes::default);

/// Shared instance of [`PrimitiveTypes`].
pub fn default_registry() -> &'static PrimitiveTypes {
    &DEFAULT
}

impl TypeRegistry for PrimitiveTypes {
    fn cast(&self, value: &Value, target: &SemanticType) -> Result<Value, CastError> {
        // Idempotence: already in internal representation.
        if value.intrinsic_type().as_ref() == Some(target) {
            return Ok(value.clone());
        }

        let cast_err = || CastError {
            value: value.clone(),
            target: target.clone(),
        };

        match (value, target) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Int(i), SemanticType::Float) => Ok(Value::Float(*i as f64)),
            (Value::Str(s), SemanticType::Uuid) => Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|_| cast_err()),
            (Value::Bytes(b), SemanticType::Uuid) => Uuid::from_slice(b)
                .map(Value::Uuid)
                .map_err(|_| cast_err()),
            (Value::Str(s), SemanticType::Date) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| cast_err()),
            (Value::Str(s), SemanticType::DateTime) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| cast_err()),
            _ => Err(cast_err()),
        }
    }

    fn dump(&self, value: &Value, target: &SemanticType) -> Result<Value, DumpError> {
        let dump_err = || DumpError {
            value: value.clone(),
            target: target.clone(),
        };

        match (value, target) {
            (Value::Null, _) => Ok(Value::Null),
            // Identity-dump types pass through verbatim.
            (v, t) if t.has_identity_dump() && v.intrinsic_type().as_ref() == Some(t) => {
                Ok(v.clone())
            }
            (Value::Uuid(u), SemanticType::Uuid) => Ok(Value::Bytes(u.as_bytes().to_vec())),
            // A value already in adapter representation dumps verbatim.
            (Value::Bytes(b), SemanticType::Uuid) if b.len() == 16 => Ok(Value::Bytes(b.clone())),
            (Value::Date(d), SemanticType::Date) => Ok(Value::Str(d.format("%Y-%m-%d").to_string())),
            (Value::DateTime(dt), SemanticType::DateTime) => Ok(Value::Str(dt.to_rfc3339())),
            _ => Err(dump_err()),
        }
    }
}
