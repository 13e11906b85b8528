//! The composable query value.
//!
//! A [`Query`] is an immutable bag of declarative clauses built by an
//! external DSL/builder layer. Sources live in an append-only arena and are
//! referenced everywhere by index; index 0 is the `from` source. The
//! builder methods here return new values (fluent style), they never
//! mutate a query another clause already references.

use serde::{Deserialize, Serialize};

pub mod expr;

pub use expr::{BinaryOp, Expr, FragmentPart, Pin, UnaryOp};

// =============================================================================
// Operation
// =============================================================================

/// The operation a query is planned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOp {
    /// Read rows.
    All,
    /// Bulk update; permits only where/join/update clauses.
    UpdateAll,
    /// Bulk delete; permits only where/join clauses.
    DeleteAll,
}

impl std::fmt::Display for QueryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryOp::All => write!(f, "all"),
            QueryOp::UpdateAll => write!(f, "update_all"),
            QueryOp::DeleteAll => write!(f, "delete_all"),
        }
    }
}

// =============================================================================
// Sources
// =============================================================================

/// A resolved table binding in the source arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// A table backed by schema metadata (field types, associations).
    Schema {
        schema: String,
        table: String,
        prefix: Option<String>,
    },
    /// A bare table with no schema metadata.
    Table {
        table: String,
        prefix: Option<String>,
    },
}

impl Source {
    /// The schema name, if this source carries metadata.
    pub fn schema_name(&self) -> Option<&str> {
        match self {
            Source::Schema { schema, .. } => Some(schema),
            Source::Table { .. } => None,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Source::Schema { table, .. } | Source::Table { table, .. } => table,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        match self {
            Source::Schema { prefix, .. } | Source::Table { prefix, .. } => prefix.as_deref(),
        }
    }

    pub(crate) fn set_prefix(&mut self, value: Option<String>) {
        match self {
            Source::Schema { prefix, .. } | Source::Table { prefix, .. } => *prefix = value,
        }
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Join qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinQual {
    Inner,
    Left,
    Right,
    Full,
    InnerLateral,
    LeftLateral,
    Cross,
}

/// Transient marker naming the association a join expands; cleared once
/// expansion completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssocRef {
    /// Source index the association is declared on.
    pub source: usize,
    /// Association name in that source's schema.
    pub name: String,
}

/// One join clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinExpr {
    /// Source index assigned to this join's result.
    pub ix: usize,
    pub source: Source,
    pub on: Expr,
    pub qual: JoinQual,
    pub assoc: Option<AssocRef>,
}

// =============================================================================
// Ordering, windows, updates, combinations, preloads
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: SortDir,
}

/// A named window definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowDef {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByExpr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateOp {
    Set,
    Inc,
}

/// One entry of an update-set clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateExpr {
    pub op: UpdateOp,
    pub field: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombinationKind {
    Union,
    UnionAll,
    Except,
    Intersect,
}

/// A preload declaration: a path of association names, optionally bound to
/// a joined source that carries the preloaded rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preload {
    pub path: Vec<String>,
    pub binding: Option<usize>,
}

// =============================================================================
// Select shapes
// =============================================================================

/// A field entry inside a struct/map projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectField {
    Field(String),
    /// Nested association projection; must be satisfied by a preload
    /// binding over a joined source.
    Assoc {
        name: String,
        fields: Vec<SelectField>,
    },
}

/// One element of a tuple selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    Row(Select),
    Scalar(Expr),
}

/// The select clause shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Select {
    /// The whole row of one source binding.
    Source(usize),
    /// Explicit expression list.
    Fields(Vec<Expr>),
    /// Struct-shaped projection over one source.
    Struct {
        source: usize,
        fields: Vec<SelectField>,
    },
    /// Map-shaped projection over one source.
    Map {
        source: usize,
        fields: Vec<SelectField>,
    },
    /// Mixed row/scalar tuple.
    Tuple(Vec<SelectItem>),
}

// =============================================================================
// Query
// =============================================================================

/// An immutable query value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[must_use = "builders have no effect until used"]
pub struct Query {
    pub sources: Vec<Source>,
    pub joins: Vec<JoinExpr>,
    pub wheres: Vec<Expr>,
    pub group_bys: Vec<Expr>,
    pub havings: Vec<Expr>,
    pub order_bys: Vec<OrderByExpr>,
    pub windows: Vec<(String, WindowDef)>,
    pub select: Option<Select>,
    pub updates: Vec<UpdateExpr>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub combinations: Vec<(CombinationKind, Query)>,
    pub preloads: Vec<Preload>,
    /// Schema/table namespace override applied to sources without one.
    pub prefix: Option<String>,
    pub lock: Option<String>,
}

impl Query {
    /// Start a query from a schema-backed source.
    pub fn from_schema(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Query {
            sources: vec![Source::Schema {
                schema: schema.into(),
                table: table.into(),
                prefix: None,
            }],
            ..Query::default()
        }
    }

    /// Start a query from a bare table (no schema metadata).
    pub fn from_table(table: impl Into<String>) -> Self {
        Query {
            sources: vec![Source::Table {
                table: table.into(),
                prefix: None,
            }],
            ..Query::default()
        }
    }

    /// Join an association declared on `source`. The concrete join graph is
    /// produced during planning.
    pub fn join_assoc(mut self, qual: JoinQual, source: usize, name: impl Into<String>) -> Self {
        let ix = self.sources.len();
        let name = name.into();
        self.sources.push(Source::Table {
            // Placeholder; association expansion resolves the real source.
            table: name.clone(),
            prefix: None,
        });
        self.joins.push(JoinExpr {
            ix,
            source: Source::Table {
                table: name.clone(),
                prefix: None,
            },
            on: Expr::true_lit(),
            qual,
            assoc: Some(AssocRef { source, name }),
        });
        self
    }

    /// Join a concrete source with an explicit `on` condition.
    pub fn join_on(mut self, qual: JoinQual, source: Source, on: Expr) -> Self {
        let ix = self.sources.len();
        self.sources.push(source.clone());
        self.joins.push(JoinExpr {
            ix,
            source,
            on,
            qual,
            assoc: None,
        });
        self
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.wheres.push(expr);
        self
    }

    pub fn group_by(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.group_bys.extend(exprs);
        self
    }

    pub fn having(mut self, expr: Expr) -> Self {
        self.havings.push(expr);
        self
    }

    pub fn order_by(mut self, dir: SortDir, expr: Expr) -> Self {
        self.order_bys.push(OrderByExpr { expr, dir });
        self
    }

    pub fn window(mut self, name: impl Into<String>, def: WindowDef) -> Self {
        self.windows.push((name.into(), def));
        self
    }

    pub fn select(mut self, select: Select) -> Self {
        self.select = Some(select);
        self
    }

    pub fn update(mut self, op: UpdateOp, field: impl Into<String>, value: Expr) -> Self {
        self.updates.push(UpdateExpr {
            op,
            field: field.into(),
            value,
        });
        self
    }

    pub fn limit(mut self, expr: Expr) -> Self {
        self.limit = Some(expr);
        self
    }

    pub fn offset(mut self, expr: Expr) -> Self {
        self.offset = Some(expr);
        self
    }

    pub fn combine(mut self, kind: CombinationKind, other: Query) -> Self {
        self.combinations.push((kind, other));
        self
    }

    pub fn preload(mut self, path: impl IntoIterator<Item = String>, binding: Option<usize>) -> Self {
        self.preloads.push(Preload {
            path: path.into_iter().collect(),
            binding,
        });
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_lock(mut self, lock: impl Into<String>) -> Self {
        self.lock = Some(lock.into());
        self
    }

    /// The `from` source, if the query has one.
    pub fn from_source(&self) -> Option<&Source> {
        self.sources.first()
    }
}
