//! Structural cache keys for planned queries.
//!
//! Two queries with the same key are plan-equivalent modulo parameter
//! values: literal (non-parameter) sub-values are embedded verbatim, so a
//! differing literal, join qualifier, or clause set changes the key.
//! Adapters that cannot cache parameterized plans get the no-cache
//! sentinel, as does any query with a variable-length parameter span
//! (unless the adapter specializes per length, in which case the span's
//! count is part of the key).

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::query::{
    CombinationKind, Expr, FragmentPart, Pin, Query, QueryOp, JoinQual, Select, SelectItem,
    SortDir, UpdateExpr, WindowDef,
};
use crate::schema::SchemaProvider;

use super::AdapterInfo;

// =============================================================================
// Hashing
// =============================================================================

/// SHA256 of a serializable value, as lowercase hex.
///
/// The value is serialized to JSON first, which keeps the output
/// deterministic for a given structure.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// =============================================================================
// Key tokens
// =============================================================================

/// One structural token of a cache key, in clause evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum KeyToken {
    Op(QueryOp),
    SourceCount(usize),
    Lock(String),
    Prefix(String),
    Where(Expr),
    GroupBy(Expr),
    Having(Expr),
    OrderBy(SortDir, Expr),
    HasLimit,
    HasOffset,
    Join {
        qual: JoinQual,
        table: String,
        schema: Option<String>,
        prefix: Option<String>,
        on: Expr,
    },
    Source {
        table: String,
        schema: Option<String>,
        /// Fingerprint of the schema's ordered field set, so a schema
        /// redefinition invalidates plans.
        fields: Option<String>,
        prefix: Option<String>,
    },
    Select(Select),
    Window(String, WindowDef),
    Update(UpdateExpr),
    Combination(CombinationKind, Vec<KeyToken>),
}

/// A cache key, or the sentinel for plans that must not be shared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CacheKey {
    NoCache,
    Key(Vec<KeyToken>),
}

impl CacheKey {
    /// Hex fingerprint of the key, usable as a map key in an external plan
    /// cache. `None` for the no-cache sentinel.
    pub fn fingerprint(&self) -> Option<String> {
        match self {
            CacheKey::NoCache => None,
            CacheKey::Key(tokens) => compute_hash(tokens).ok(),
        }
    }
}

// =============================================================================
// Key construction
// =============================================================================

/// Compute the cache key for a planned query.
pub fn cache_key(
    query: &Query,
    op: QueryOp,
    schemas: &dyn SchemaProvider,
    adapter: &dyn AdapterInfo,
) -> CacheKey {
    if !adapter.supports_cache() {
        return CacheKey::NoCache;
    }
    if query_has_span(query) && !adapter.supports_variable_length_cache_specialization() {
        return CacheKey::NoCache;
    }
    CacheKey::Key(key_tokens(query, op, schemas))
}

fn key_tokens(query: &Query, op: QueryOp, schemas: &dyn SchemaProvider) -> Vec<KeyToken> {
    let mut tokens = vec![KeyToken::Op(op), KeyToken::SourceCount(query.sources.len())];

    if let Some(lock) = &query.lock {
        tokens.push(KeyToken::Lock(lock.clone()));
    }
    if let Some(prefix) = &query.prefix {
        tokens.push(KeyToken::Prefix(prefix.clone()));
    }
    for expr in &query.wheres {
        tokens.push(KeyToken::Where(expr.clone()));
    }
    for expr in &query.group_bys {
        tokens.push(KeyToken::GroupBy(expr.clone()));
    }
    for expr in &query.havings {
        tokens.push(KeyToken::Having(expr.clone()));
    }
    for ob in &query.order_bys {
        tokens.push(KeyToken::OrderBy(ob.dir, ob.expr.clone()));
    }
    if query.limit.is_some() {
        tokens.push(KeyToken::HasLimit);
    }
    if query.offset.is_some() {
        tokens.push(KeyToken::HasOffset);
    }
    for join in &query.joins {
        tokens.push(KeyToken::Join {
            qual: join.qual,
            table: join.source.table().to_string(),
            schema: join.source.schema_name().map(str::to_string),
            prefix: join.source.prefix().map(str::to_string),
            on: join.on.clone(),
        });
    }
    for source in &query.sources {
        let fields = source.schema_name().and_then(|name| {
            let meta = schemas.schema(name)?;
            let shape: Vec<(&str, _)> = meta
                .fields()
                .iter()
                .map(|fd| (fd.name.as_str(), fd.ty.clone()))
                .collect();
            compute_hash(&shape).ok()
        });
        tokens.push(KeyToken::Source {
            table: source.table().to_string(),
            schema: source.schema_name().map(str::to_string),
            fields,
            prefix: source.prefix().map(str::to_string),
        });
    }
    if let Some(select) = &query.select {
        tokens.push(KeyToken::Select(select.clone()));
    }
    for (name, def) in &query.windows {
        tokens.push(KeyToken::Window(name.clone(), def.clone()));
    }
    for update in &query.updates {
        tokens.push(KeyToken::Update(update.clone()));
    }
    for (kind, sub) in &query.combinations {
        tokens.push(KeyToken::Combination(*kind, key_tokens(sub, op, schemas)));
    }

    tokens
}

// =============================================================================
// Span detection
// =============================================================================

fn query_has_span(query: &Query) -> bool {
    let exprs = query
        .wheres
        .iter()
        .chain(&query.group_bys)
        .chain(&query.havings);
    if exprs.into_iter().any(expr_has_span) {
        return true;
    }
    if query.joins.iter().any(|j| expr_has_span(&j.on)) {
        return true;
    }
    if query.order_bys.iter().any(|ob| expr_has_span(&ob.expr)) {
        return true;
    }
    if query.windows.iter().any(|(_, w)| {
        w.partition_by.iter().any(expr_has_span)
            || w.order_by.iter().any(|ob| expr_has_span(&ob.expr))
    }) {
        return true;
    }
    if let Some(select) = &query.select {
        if select_has_span(select) {
            return true;
        }
    }
    if query.updates.iter().any(|u| expr_has_span(&u.value)) {
        return true;
    }
    if [&query.limit, &query.offset]
        .into_iter()
        .flatten()
        .any(expr_has_span)
    {
        return true;
    }
    query.combinations.iter().any(|(_, sub)| query_has_span(sub))
}

fn select_has_span(select: &Select) -> bool {
    match select {
        Select::Fields(exprs) => exprs.iter().any(expr_has_span),
        Select::Tuple(items) => items.iter().any(|item| match item {
            SelectItem::Scalar(expr) => expr_has_span(expr),
            SelectItem::Row(row) => select_has_span(row),
        }),
        Select::Source(_) | Select::Struct { .. } | Select::Map { .. } => false,
    }
}

fn expr_has_span(expr: &Expr) -> bool {
    match expr {
        Expr::ParamSpan { .. } => true,
        Expr::Pinned(Pin::List(_)) => true,
        Expr::Field { .. } | Expr::Literal(_) | Expr::Param(_) | Expr::Pinned(_) => false,
        Expr::List(items) => items.iter().any(expr_has_span),
        Expr::Tagged { expr, .. } | Expr::Unary { expr, .. } => expr_has_span(expr),
        Expr::Binary { left, right, .. } => expr_has_span(left) || expr_has_span(right),
        Expr::Call { args, .. } => args.iter().any(expr_has_span),
        Expr::Fragment(parts) => parts.iter().any(|part| match part {
            FragmentPart::Raw(_) => false,
            FragmentPart::Expr(e) => expr_has_span(e),
        }),
        Expr::Over { expr, .. } => expr_has_span(expr),
    }
}
