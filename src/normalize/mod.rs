//! Phase 2: normalization.
//!
//! Validates a planned query for its operation and flattens its projection:
//! field existence and virtual-field misuse, literal/type agreement,
//! membership-list flattening, window references, operation-specific clause
//! restrictions, select expansion, and preload binding consistency.
//! Type-tag literals against transform-requiring types are extracted as
//! additional parameters, appended after planning's list.

use std::collections::BTreeSet;

use crate::error::{QueryError, QueryResult, StructuralError, ValidationError};
use crate::plan::Planned;
use crate::query::{
    BinaryOp, Expr, FragmentPart, Query, QueryOp, Select, Source, UpdateExpr,
};
use crate::schema::SchemaProvider;
use crate::types::{SemanticType, TypeRegistry, Value};

pub mod select;

// =============================================================================
// Entry point
// =============================================================================

/// Normalize a planned query for `op`.
pub fn normalize(
    planned: Planned,
    op: QueryOp,
    types: &dyn TypeRegistry,
    schemas: &dyn SchemaProvider,
) -> QueryResult<Planned> {
    let Planned {
        query,
        params,
        cache_key,
    } = planned;

    guard_clauses(&query, op)?;

    let mut normalizer = Normalizer {
        types,
        schemas,
        params,
    };
    let query = normalizer.normalize_query(query, op)?;

    Ok(Planned {
        query,
        params: normalizer.params,
        cache_key,
    })
}

// =============================================================================
// Operation clause guards
// =============================================================================

fn guard_clauses(query: &Query, op: QueryOp) -> Result<(), StructuralError> {
    match op {
        QueryOp::All => {
            if !query.updates.is_empty() {
                return Err(StructuralError::InvalidClause {
                    op,
                    clause: "update",
                });
            }
            for (_, sub) in &query.combinations {
                guard_clauses(sub, op)?;
            }
        }
        QueryOp::UpdateAll | QueryOp::DeleteAll => {
            let forbidden: [(&'static str, bool); 9] = [
                ("select", query.select.is_some()),
                ("group_by", !query.group_bys.is_empty()),
                ("having", !query.havings.is_empty()),
                ("order_by", !query.order_bys.is_empty()),
                ("window", !query.windows.is_empty()),
                ("limit", query.limit.is_some()),
                ("offset", query.offset.is_some()),
                ("combination", !query.combinations.is_empty()),
                ("preload", !query.preloads.is_empty()),
            ];
            for (clause, present) in forbidden {
                if present {
                    return Err(StructuralError::InvalidClause { op, clause });
                }
            }
            match op {
                QueryOp::UpdateAll => {
                    if query.updates.is_empty() {
                        return Err(StructuralError::NoUpdates);
                    }
                    let mut seen = BTreeSet::new();
                    for update in &query.updates {
                        if !seen.insert(update.field.as_str()) {
                            return Err(StructuralError::DuplicateUpdateField {
                                field: update.field.clone(),
                            });
                        }
                    }
                }
                QueryOp::DeleteAll => {
                    if !query.updates.is_empty() {
                        return Err(StructuralError::InvalidClause {
                            op,
                            clause: "update",
                        });
                    }
                }
                QueryOp::All => unreachable!(),
            }
        }
    }
    Ok(())
}

// =============================================================================
// Normalizer
// =============================================================================

struct Normalizer<'a> {
    types: &'a dyn TypeRegistry,
    schemas: &'a dyn SchemaProvider,
    params: Vec<Value>,
}

impl<'a> Normalizer<'a> {
    fn normalize_query(&mut self, mut query: Query, op: QueryOp) -> QueryResult<Query> {
        let sources = query.sources.clone();
        let window_names: Vec<String> =
            query.windows.iter().map(|(name, _)| name.clone()).collect();
        let ctx = Ctx {
            sources: &sources,
            windows: &window_names,
        };

        for join in &mut query.joins {
            let on = std::mem::replace(&mut join.on, Expr::true_lit());
            join.on = self.rewrite(on, "join", &ctx)?;
        }
        query.wheres = self.rewrite_all(std::mem::take(&mut query.wheres), "where", &ctx)?;
        query.group_bys =
            self.rewrite_all(std::mem::take(&mut query.group_bys), "group_by", &ctx)?;
        query.havings = self.rewrite_all(std::mem::take(&mut query.havings), "having", &ctx)?;

        for (_, window) in &mut query.windows {
            let partition = std::mem::take(&mut window.partition_by);
            window.partition_by = self.rewrite_all(partition, "window", &ctx)?;
            for ob in &mut window.order_by {
                let expr = std::mem::replace(&mut ob.expr, Expr::true_lit());
                ob.expr = self.rewrite(expr, "window", &ctx)?;
            }
        }

        for ob in &mut query.order_bys {
            let expr = std::mem::replace(&mut ob.expr, Expr::true_lit());
            ob.expr = self.rewrite(expr, "order_by", &ctx)?;
        }

        query.limit = match query.limit.take() {
            Some(expr) => Some(self.rewrite(expr, "limit", &ctx)?),
            None => None,
        };
        query.offset = match query.offset.take() {
            Some(expr) => Some(self.rewrite(expr, "offset", &ctx)?),
            None => None,
        };

        let updates = std::mem::take(&mut query.updates);
        query.updates = updates
            .into_iter()
            .map(|update| self.normalize_update(update, &ctx))
            .collect::<QueryResult<Vec<_>>>()?;

        let combinations = std::mem::take(&mut query.combinations);
        query.combinations = combinations
            .into_iter()
            .map(|(kind, sub)| Ok((kind, self.normalize_query(sub, op)?)))
            .collect::<QueryResult<Vec<_>>>()?;

        // Clauses that only held now-empty lists normalize to empty.
        query.group_bys.retain(|e| !is_empty_list(e));
        query.order_bys.retain(|ob| !is_empty_list(&ob.expr));

        // Projection flattening and preload consistency apply to reads only;
        // the write operations forbid both clauses.
        if op == QueryOp::All {
            // Expansion flattens everything to a field list; the list still
            // has to pass the same field checks as every other clause, since
            // explicit selections and tuple scalars arrive unvalidated.
            let expanded = match select::expand_select(&query, self.schemas)? {
                Select::Fields(fields) => {
                    Select::Fields(self.rewrite_all(fields, "select", &ctx)?)
                }
                other => other,
            };
            let selected = selected_sources(&expanded);
            select::validate_preloads(&query, self.schemas, &selected)?;
            query.select = Some(expanded);
        }

        Ok(query)
    }

    fn normalize_update(&mut self, mut update: UpdateExpr, ctx: &Ctx<'_>) -> QueryResult<UpdateExpr> {
        // Update targets resolve against the from source's schema.
        if let Some(meta) = schema_meta(self.schemas, ctx.sources, 0)? {
            match meta.field_def(&update.field) {
                None => {
                    return Err(ValidationError::UnknownField {
                        schema: meta.name.clone(),
                        field: update.field,
                    }
                    .into());
                }
                Some(def) if def.is_virtual => {
                    return Err(ValidationError::VirtualField {
                        schema: meta.name.clone(),
                        field: update.field,
                    }
                    .into());
                }
                Some(_) => {}
            }
        }
        let value = std::mem::replace(&mut update.value, Expr::true_lit());
        update.value = self.rewrite(value, "update", ctx)?;
        Ok(update)
    }

    fn rewrite_all(
        &mut self,
        exprs: Vec<Expr>,
        clause: &'static str,
        ctx: &Ctx<'_>,
    ) -> QueryResult<Vec<Expr>> {
        exprs
            .into_iter()
            .map(|e| self.rewrite(e, clause, ctx))
            .collect()
    }

    fn rewrite(&mut self, expr: Expr, clause: &'static str, ctx: &Ctx<'_>) -> QueryResult<Expr> {
        match expr {
            Expr::Field { source, name } => {
                self.check_field(source, &name, ctx)?;
                Ok(Expr::Field { source, name })
            }

            Expr::Binary { left, op, right } if op == BinaryOp::In => {
                self.rewrite_membership(*left, *right, clause, ctx)
            }

            Expr::Binary { left, op, right } => {
                if op.is_comparison() {
                    self.check_comparison(&left, &right, clause, ctx)?;
                }
                let left = self.rewrite(*left, clause, ctx)?;
                let right = self.rewrite(*right, clause, ctx)?;
                Ok(Expr::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }

            Expr::Tagged { expr, ty } => {
                let inner = self.rewrite(*expr, clause, ctx)?;
                // A tagged literal against a transform-requiring type is
                // extracted as a parameter so the adapter never sees the
                // undumped form.
                if let Expr::Literal(value) = &inner {
                    if !ty.has_identity_dump() {
                        let rendered = format!("type({}, {})", value, ty);
                        let cast = self
                            .types
                            .cast(value, &ty)
                            .map_err(|e| QueryError::cast(e, clause, &rendered))?;
                        let dumped = self
                            .types
                            .dump(&cast, &ty)
                            .map_err(|e| QueryError::dump(e, clause, &rendered))?;
                        let ix = self.params.len();
                        self.params.push(dumped);
                        return Ok(Expr::Tagged {
                            expr: Box::new(Expr::Param(ix)),
                            ty,
                        });
                    }
                }
                Ok(Expr::Tagged {
                    expr: Box::new(inner),
                    ty,
                })
            }

            Expr::Unary { op, expr } => Ok(Expr::Unary {
                op,
                expr: Box::new(self.rewrite(*expr, clause, ctx)?),
            }),

            Expr::List(items) => Ok(Expr::List(self.rewrite_all(items, clause, ctx)?)),

            Expr::Call { name, args } => Ok(Expr::Call {
                name,
                args: self.rewrite_all(args, clause, ctx)?,
            }),

            Expr::Fragment(parts) => {
                let parts = parts
                    .into_iter()
                    .map(|part| match part {
                        FragmentPart::Raw(s) => Ok(FragmentPart::Raw(s)),
                        FragmentPart::Expr(e) => {
                            Ok(FragmentPart::Expr(self.rewrite(e, clause, ctx)?))
                        }
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Expr::Fragment(parts))
            }

            Expr::Over { expr, window } => {
                if !ctx.windows.iter().any(|name| *name == window) {
                    return Err(StructuralError::UnknownWindow { name: window }.into());
                }
                Ok(Expr::Over {
                    expr: Box::new(self.rewrite(*expr, clause, ctx)?),
                    window,
                })
            }

            leaf @ (Expr::Literal(_) | Expr::Param(_) | Expr::ParamSpan { .. } | Expr::Pinned(_)) => {
                Ok(leaf)
            }
        }
    }

    /// Normalize `left in right`: an in-place list flattens into a single
    /// rendered list; an empty literal list becomes an explicit empty
    /// parameter span so parameter slicing stays well-defined.
    fn rewrite_membership(
        &mut self,
        left: Expr,
        right: Expr,
        clause: &'static str,
        ctx: &Ctx<'_>,
    ) -> QueryResult<Expr> {
        let elem_ty = self.field_type_of(&left, ctx)?;
        let left = self.rewrite(left, clause, ctx)?;

        let right = match right {
            Expr::List(items) if items.is_empty() => Expr::ParamSpan {
                start: self.params.len(),
                count: 0,
            },
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let (Expr::Literal(value), Some((ty, field, schema))) = (&item, &elem_ty) {
                        self.check_literal(value, ty, field, schema, clause)?;
                    }
                    out.push(self.rewrite(item, clause, ctx)?);
                }
                Expr::List(out)
            }
            other => self.rewrite(other, clause, ctx)?,
        };

        Ok(Expr::is_in(left, right))
    }

    fn check_comparison(
        &self,
        left: &Expr,
        right: &Expr,
        clause: &'static str,
        ctx: &Ctx<'_>,
    ) -> QueryResult<()> {
        for (field_side, value_side) in [(left, right), (right, left)] {
            if let (Some((ty, field, schema)), Expr::Literal(value)) =
                (self.field_type_of(field_side, ctx)?, value_side)
            {
                self.check_literal(value, &ty, &field, &schema, clause)?;
            }
        }
        Ok(())
    }

    /// Literal-vs-field agreement. Identity-dump types demand a matching
    /// representation class up front; transform-requiring types get a
    /// cast+dump trial, whose failure is a dump error (representation), not
    /// a cast error (type compatibility).
    fn check_literal(
        &self,
        value: &Value,
        ty: &SemanticType,
        field: &str,
        _schema: &str,
        clause: &'static str,
    ) -> QueryResult<()> {
        if matches!(value, Value::Null) {
            return Ok(());
        }
        let intrinsic = value.intrinsic_type();

        if ty.has_identity_dump() {
            let compatible = intrinsic.as_ref() == Some(ty)
                || (matches!(intrinsic, Some(SemanticType::Int)) && *ty == SemanticType::Float);
            if !compatible {
                return Err(ValidationError::LiteralTypeMismatch {
                    clause,
                    value: value.clone(),
                    field: field.to_string(),
                    ty: ty.clone(),
                }
                .into());
            }
            return Ok(());
        }

        // Transform-requiring type: the literal must be in a plausible
        // source representation and must survive cast+dump.
        let plausible = matches!(
            intrinsic,
            Some(SemanticType::Str) | Some(SemanticType::Binary)
        ) || intrinsic.as_ref() == Some(ty);
        if !plausible {
            return Err(ValidationError::LiteralTypeMismatch {
                clause,
                value: value.clone(),
                field: field.to_string(),
                ty: ty.clone(),
            }
            .into());
        }

        let rendered = value.to_string();
        let cast = self.types.cast(value, ty).map_err(|e| {
            QueryError::dump(
                crate::types::DumpError {
                    value: e.value,
                    target: e.target,
                },
                clause,
                &rendered,
            )
        })?;
        self.types
            .dump(&cast, ty)
            .map_err(|e| QueryError::dump(e, clause, &rendered))?;
        Ok(())
    }

    fn check_field(&self, source: usize, name: &str, ctx: &Ctx<'_>) -> QueryResult<()> {
        let Some(meta) = schema_meta(self.schemas, ctx.sources, source)? else {
            return Ok(());
        };
        match meta.field_def(name) {
            None => Err(ValidationError::UnknownField {
                schema: meta.name.clone(),
                field: name.to_string(),
            }
            .into()),
            Some(def) if def.is_virtual => Err(ValidationError::VirtualField {
                schema: meta.name.clone(),
                field: name.to_string(),
            }
            .into()),
            Some(_) => Ok(()),
        }
    }

    /// The `(type, field name, schema name)` of a field expression, when it
    /// resolves against schema metadata.
    fn field_type_of(
        &self,
        expr: &Expr,
        ctx: &Ctx<'_>,
    ) -> QueryResult<Option<(SemanticType, String, String)>> {
        let Expr::Field { source, name } = expr else {
            return Ok(None);
        };
        let Some(meta) = schema_meta(self.schemas, ctx.sources, *source)? else {
            return Ok(None);
        };
        Ok(meta
            .field_def(name)
            .map(|def| (def.ty.clone(), name.clone(), meta.name.clone())))
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Ctx<'a> {
    sources: &'a [Source],
    windows: &'a [String],
}

fn schema_meta<'a>(
    schemas: &'a dyn SchemaProvider,
    sources: &[Source],
    source: usize,
) -> QueryResult<Option<&'a crate::schema::SchemaMeta>> {
    let Some(Source::Schema { schema, .. }) = sources.get(source) else {
        return Ok(None);
    };
    schemas
        .schema(schema)
        .map(Some)
        .ok_or_else(|| StructuralError::UnknownSchema {
            schema: schema.clone(),
        })
        .map_err(Into::into)
}

fn is_empty_list(expr: &Expr) -> bool {
    match expr {
        Expr::List(items) => items.is_empty(),
        Expr::ParamSpan { count, .. } => *count == 0,
        _ => false,
    }
}

fn selected_sources(select: &Select) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    if let Select::Fields(exprs) = select {
        for expr in exprs {
            if let Expr::Field { source, .. } = expr {
                out.insert(*source);
            }
        }
    }
    out
}
