//! Schema metadata consumed as a read-only capability.
//!
//! The planner introspects field lists, primary keys, virtual-field sets,
//! and association definitions through [`SchemaProvider`]. [`Catalog`] is
//! the in-memory implementation used in tests and by callers whose
//! metadata is static; adapters with live introspection implement the
//! trait themselves.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::query::Expr;
use crate::types::SemanticType;

// =============================================================================
// Fields
// =============================================================================

/// One field of a schema, in declared order.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: SemanticType,
    /// Virtual fields exist on the struct but not in storage; most read and
    /// write positions reject them.
    pub is_virtual: bool,
}

// =============================================================================
// Associations
// =============================================================================

/// Association cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A stored expression-builder thunk for association filter predicates.
///
/// Invoked with the source index assigned to the joined rows, so the
/// predicate binds to the join's actual position late.
#[derive(Clone)]
pub struct JoinFilter(Arc<dyn Fn(usize) -> Expr + Send + Sync>);

impl JoinFilter {
    pub fn new(build: impl Fn(usize) -> Expr + Send + Sync + 'static) -> Self {
        JoinFilter(Arc::new(build))
    }

    /// Build the predicate bound to source index `ix`.
    pub fn build(&self, ix: usize) -> Expr {
        (self.0)(ix)
    }
}

impl std::fmt::Debug for JoinFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JoinFilter(..)")
    }
}

/// A schema-declared relationship, resolvable into one or more joins.
///
/// Closed set: the expander matches exhaustively, there is no dispatch
/// beyond this enum.
#[derive(Debug, Clone)]
pub enum AssociationSpec {
    /// Direct relation keyed owner → related (`owner.owner_key ==
    /// related.related_key`).
    Has {
        target: String,
        cardinality: Cardinality,
        owner_key: String,
        related_key: String,
        filter: Option<JoinFilter>,
    },
    /// Direct relation keyed related → owner.
    BelongsTo {
        target: String,
        owner_key: String,
        related_key: String,
        filter: Option<JoinFilter>,
    },
    /// Relation through a join table: one hop onto the join table, one hop
    /// onto the target.
    ManyToMany {
        target: String,
        join_table: String,
        owner_key: String,
        join_owner_key: String,
        join_target_key: String,
        target_key: String,
        filter: Option<JoinFilter>,
        join_filter: Option<JoinFilter>,
    },
    /// Chain of other associations walked hop by hop.
    Through { chain: Vec<String> },
}

// =============================================================================
// SchemaMeta
// =============================================================================

/// Metadata for one schema: ordered fields, primary key, associations.
#[derive(Debug, Clone)]
pub struct SchemaMeta {
    pub name: String,
    pub source_table: String,
    pub prefix: Option<String>,
    pub primary_key: String,
    fields: Vec<FieldDef>,
    associations: BTreeMap<String, AssociationSpec>,
}

impl SchemaMeta {
    pub fn new(name: impl Into<String>, source_table: impl Into<String>) -> Self {
        SchemaMeta {
            name: name.into(),
            source_table: source_table.into(),
            prefix: None,
            primary_key: "id".to_string(),
            fields: Vec::new(),
            associations: BTreeMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_primary_key(mut self, pk: impl Into<String>) -> Self {
        self.primary_key = pk.into();
        self
    }

    /// Append a stored field (declared order is preserved).
    pub fn field(mut self, name: impl Into<String>, ty: SemanticType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            is_virtual: false,
        });
        self
    }

    /// Append a virtual field.
    pub fn virtual_field(mut self, name: impl Into<String>, ty: SemanticType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            is_virtual: true,
        });
        self
    }

    pub fn association(mut self, name: impl Into<String>, spec: AssociationSpec) -> Self {
        self.associations.insert(name.into(), spec);
        self
    }

    /// Ordered field list, virtuals included.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Names of stored (non-virtual) fields in declared order.
    pub fn stored_field_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|fd| !fd.is_virtual)
            .map(|fd| fd.name.as_str())
            .collect()
    }

    pub fn virtual_fields(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .filter(|fd| fd.is_virtual)
            .map(|fd| fd.name.as_str())
            .collect()
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|fd| fd.name == name)
    }

    pub fn association_spec(&self, name: &str) -> Option<&AssociationSpec> {
        self.associations.get(name)
    }

    pub fn associations(&self) -> &BTreeMap<String, AssociationSpec> {
        &self.associations
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Read-only schema lookup shared across concurrent plans.
pub trait SchemaProvider {
    fn schema(&self, name: &str) -> Option<&SchemaMeta>;
}

/// In-memory schema catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    schemas: BTreeMap<String, SchemaMeta>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn add(mut self, meta: SchemaMeta) -> Self {
        self.schemas.insert(meta.name.clone(), meta);
        self
    }
}

impl SchemaProvider for Catalog {
    fn schema(&self, name: &str) -> Option<&SchemaMeta> {
        self.schemas.get(name)
    }
}
