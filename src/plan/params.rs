//! Parameter extraction and casting.
//!
//! Walks every clause in a fixed left-to-right order (select, join-on,
//! where, group_by, having, window, order_by, combinations, limit, offset,
//! update-set) and assigns each placeholder the next positional parameter
//! index. Placeholders compared against typed fields are cast to the
//! field's semantic type and then dumped into the adapter representation,
//! so the flat parameter list never carries domain-typed values.

use crate::error::{QueryError, QueryResult, StructuralError};
use crate::query::{
    BinaryOp, Expr, FragmentPart, Pin, Query, Select, SelectItem, Source, UpdateExpr,
};
use crate::schema::SchemaProvider;
use crate::types::{SemanticType, TypeRegistry, Value};

pub(crate) struct ParamPlanner<'a> {
    types: &'a dyn TypeRegistry,
    schemas: &'a dyn SchemaProvider,
    params: Vec<Value>,
}

impl<'a> ParamPlanner<'a> {
    pub(crate) fn new(types: &'a dyn TypeRegistry, schemas: &'a dyn SchemaProvider) -> Self {
        ParamPlanner {
            types,
            schemas,
            params: Vec::new(),
        }
    }

    /// Rewrite every placeholder in `query` into positional parameters and
    /// return the query together with the extracted values.
    pub(crate) fn plan(mut self, query: Query) -> QueryResult<(Query, Vec<Value>)> {
        let query = self.plan_query(query)?;
        Ok((query, std::mem::take(&mut self.params)))
    }

    fn plan_query(&mut self, mut query: Query) -> QueryResult<Query> {
        let sources = query.sources.clone();

        query.select = match query.select.take() {
            Some(select) => Some(self.plan_select(select, &sources)?),
            None => None,
        };

        for join in &mut query.joins {
            let on = std::mem::replace(&mut join.on, Expr::true_lit());
            join.on = self.rewrite(on, "join", None, &sources)?;
        }

        query.wheres = self.rewrite_all(query.wheres, "where", &sources)?;
        query.group_bys = self.rewrite_all(query.group_bys, "group_by", &sources)?;
        query.havings = self.rewrite_all(query.havings, "having", &sources)?;

        for (_, window) in &mut query.windows {
            let partition = std::mem::take(&mut window.partition_by);
            window.partition_by = self.rewrite_all(partition, "window", &sources)?;
            for ob in &mut window.order_by {
                let expr = std::mem::replace(&mut ob.expr, Expr::true_lit());
                ob.expr = self.rewrite(expr, "window", None, &sources)?;
            }
        }

        for ob in &mut query.order_bys {
            let expr = std::mem::replace(&mut ob.expr, Expr::true_lit());
            ob.expr = self.rewrite(expr, "order_by", None, &sources)?;
        }

        // Combination sub-queries share the outer parameter list; their
        // field indices resolve against their own sources.
        let combinations = std::mem::take(&mut query.combinations);
        query.combinations = combinations
            .into_iter()
            .map(|(kind, sub)| {
                if sub.sources.is_empty() {
                    return Err(StructuralError::MissingFrom.into());
                }
                Ok((kind, self.plan_query(sub)?))
            })
            .collect::<QueryResult<Vec<_>>>()?;

        query.limit = match query.limit.take() {
            Some(expr) => Some(self.rewrite(expr, "limit", Some(&SemanticType::Int), &sources)?),
            None => None,
        };
        query.offset = match query.offset.take() {
            Some(expr) => Some(self.rewrite(expr, "offset", Some(&SemanticType::Int), &sources)?),
            None => None,
        };

        let updates = std::mem::take(&mut query.updates);
        query.updates = updates
            .into_iter()
            .map(|update| self.plan_update(update, &sources))
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(query)
    }

    fn plan_select(&mut self, select: Select, sources: &[Source]) -> QueryResult<Select> {
        match select {
            Select::Fields(exprs) => Ok(Select::Fields(self.rewrite_all(exprs, "select", sources)?)),
            Select::Tuple(items) => {
                let items = items
                    .into_iter()
                    .map(|item| match item {
                        SelectItem::Scalar(expr) => {
                            Ok(SelectItem::Scalar(self.rewrite(expr, "select", None, sources)?))
                        }
                        row => Ok(row),
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Select::Tuple(items))
            }
            shaped => Ok(shaped),
        }
    }

    fn plan_update(&mut self, mut update: UpdateExpr, sources: &[Source]) -> QueryResult<UpdateExpr> {
        let ty = self.field_type(0, &update.field, sources);
        let value = std::mem::replace(&mut update.value, Expr::true_lit());
        update.value = self.rewrite(value, "update", ty.as_ref(), sources)?;
        Ok(update)
    }

    fn rewrite_all(
        &mut self,
        exprs: Vec<Expr>,
        clause: &'static str,
        sources: &[Source],
    ) -> QueryResult<Vec<Expr>> {
        exprs
            .into_iter()
            .map(|e| self.rewrite(e, clause, None, sources))
            .collect()
    }

    /// Rewrite one expression. `ty` is the semantic type a value in this
    /// position must cast to, when one is known from context.
    fn rewrite(
        &mut self,
        expr: Expr,
        clause: &'static str,
        ty: Option<&SemanticType>,
        sources: &[Source],
    ) -> QueryResult<Expr> {
        match expr {
            Expr::Pinned(pin) => self.bind_pin(pin, clause, ty),

            Expr::Tagged { expr, ty: tag } => {
                let inner = self.rewrite(*expr, clause, Some(&tag), sources)?;
                Ok(Expr::Tagged {
                    expr: Box::new(inner),
                    ty: tag,
                })
            }

            Expr::Binary { left, op, right } if op == BinaryOp::In => {
                self.rewrite_membership(*left, *right, clause, sources)
            }

            Expr::Binary { left, op, right } => {
                let left_ty = self.expr_type(&left, sources);
                let right_ty = self.expr_type(&right, sources);
                let (lt, rt) = if op.is_comparison() {
                    // The field side's type is authoritative for the other.
                    (right_ty.as_ref(), left_ty.as_ref())
                } else {
                    (None, None)
                };
                let left = self.rewrite(*left, clause, lt, sources)?;
                let right = self.rewrite(*right, clause, rt, sources)?;
                Ok(Expr::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }

            Expr::Unary { op, expr } => Ok(Expr::Unary {
                op,
                expr: Box::new(self.rewrite(*expr, clause, None, sources)?),
            }),

            Expr::List(items) => {
                let items = items
                    .into_iter()
                    .map(|item| self.rewrite(item, clause, ty, sources))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Expr::List(items))
            }

            Expr::Call { name, args } => {
                let args = args
                    .into_iter()
                    .map(|arg| self.rewrite(arg, clause, None, sources))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Expr::Call { name, args })
            }

            Expr::Fragment(parts) => {
                let parts = parts
                    .into_iter()
                    .map(|part| match part {
                        FragmentPart::Raw(s) => Ok(FragmentPart::Raw(s)),
                        FragmentPart::Expr(e) => {
                            Ok(FragmentPart::Expr(self.rewrite(e, clause, None, sources)?))
                        }
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Expr::Fragment(parts))
            }

            Expr::Over { expr, window } => Ok(Expr::Over {
                expr: Box::new(self.rewrite(*expr, clause, None, sources)?),
                window,
            }),

            leaf @ (Expr::Field { .. }
            | Expr::Literal(_)
            | Expr::Param(_)
            | Expr::ParamSpan { .. }) => Ok(leaf),
        }
    }

    /// Rewrite `left in right`. A pinned list on the right becomes one
    /// logical parameter group rendered as a span; each element is cast
    /// against the field's element type individually.
    fn rewrite_membership(
        &mut self,
        left: Expr,
        right: Expr,
        clause: &'static str,
        sources: &[Source],
    ) -> QueryResult<Expr> {
        let elem_ty = self.expr_type(&left, sources);
        let left = self.rewrite(left, clause, None, sources)?;

        let right = match right {
            Expr::Pinned(Pin::List(values)) => {
                let start = self.params.len();
                let count = values.len();
                for value in values {
                    self.push_param(value, clause, elem_ty.as_ref())?;
                }
                Expr::ParamSpan { start, count }
            }
            Expr::Pinned(Pin::Expr(e)) => {
                return Err(StructuralError::ExprInValuePosition {
                    clause,
                    expr: e.to_string(),
                }
                .into());
            }
            other => self.rewrite(other, clause, elem_ty.as_ref(), sources)?,
        };

        Ok(Expr::is_in(left, right))
    }

    /// Bind one scalar placeholder in value position.
    fn bind_pin(
        &mut self,
        pin: Pin,
        clause: &'static str,
        ty: Option<&SemanticType>,
    ) -> QueryResult<Expr> {
        match pin {
            Pin::Value(Value::List(items)) => Err(StructuralError::ListInValuePosition {
                clause,
                expr: Value::List(items).to_string(),
            }
            .into()),
            Pin::List(items) => Err(StructuralError::ListInValuePosition {
                clause,
                expr: Value::List(items).to_string(),
            }
            .into()),
            Pin::Expr(e) => Err(StructuralError::ExprInValuePosition {
                clause,
                expr: e.to_string(),
            }
            .into()),
            Pin::Value(value) => {
                let ix = self.params.len();
                self.push_param(value, clause, ty)?;
                Ok(Expr::Param(ix))
            }
        }
    }

    /// Cast, dump, and append one parameter value.
    fn push_param(
        &mut self,
        value: Value,
        clause: &'static str,
        ty: Option<&SemanticType>,
    ) -> QueryResult<()> {
        let target = ty.cloned().or_else(|| value.intrinsic_type());
        let stored = match target {
            Some(target) => {
                let rendered = Expr::Pinned(Pin::Value(value.clone())).to_string();
                let cast = self
                    .types
                    .cast(&value, &target)
                    .map_err(|e| QueryError::cast(e, clause, &rendered))?;
                self.types
                    .dump(&cast, &target)
                    .map_err(|e| QueryError::dump(e, clause, &rendered))?
            }
            // Untyped position (e.g. Null with no field context): stored as-is.
            None => value,
        };
        self.params.push(stored);
        Ok(())
    }

    /// The semantic type of an expression, when statically known.
    fn expr_type(&self, expr: &Expr, sources: &[Source]) -> Option<SemanticType> {
        match expr {
            Expr::Field { source, name } => self.field_type(*source, name, sources),
            Expr::Tagged { ty, .. } => Some(ty.clone()),
            _ => None,
        }
    }

    fn field_type(&self, source: usize, name: &str, sources: &[Source]) -> Option<SemanticType> {
        let schema = sources.get(source)?.schema_name()?;
        let meta = self.schemas.schema(schema)?;
        Some(meta.field_def(name)?.ty.clone())
    }
}
