//! Select-clause flattening.
//!
//! Expands the declared select shape into a flat field-access projection:
//! default selection becomes one field list per schema-backed source in
//! declared field order; struct/map projections expand recursively through
//! nested associations, each of which must be satisfied by a preload
//! binding over a joined source.

use crate::error::{QueryResult, StructuralError, ValidationError};
use crate::query::{Expr, Preload, Query, Select, SelectField, SelectItem, Source};
use crate::schema::{SchemaMeta, SchemaProvider};

/// Expand `query.select` (or the default selection) into `Select::Fields`.
pub(crate) fn expand_select(query: &Query, schemas: &dyn SchemaProvider) -> QueryResult<Select> {
    let mut fields = Vec::new();
    match &query.select {
        None => {
            // Default selection: every schema-backed source, declared order.
            for (ix, source) in query.sources.iter().enumerate() {
                if let Some(meta) = source_meta(source, schemas) {
                    push_source_fields(&mut fields, ix, meta);
                }
            }
        }
        Some(select) => expand_shape(select, query, schemas, &mut fields)?,
    }
    Ok(Select::Fields(fields))
}

fn expand_shape(
    select: &Select,
    query: &Query,
    schemas: &dyn SchemaProvider,
    out: &mut Vec<Expr>,
) -> QueryResult<()> {
    match select {
        Select::Fields(exprs) => {
            out.extend(exprs.iter().cloned());
            Ok(())
        }
        Select::Source(ix) => {
            match query.sources.get(*ix).and_then(|s| source_meta(s, schemas)) {
                Some(meta) => push_source_fields(out, *ix, meta),
                // Schema-less whole-row selection stays a bare source; the
                // adapter renders it as `table.*`.
                None => out.push(Expr::field(*ix, "*")),
            }
            Ok(())
        }
        Select::Struct { source, fields } | Select::Map { source, fields } => {
            let meta = query
                .sources
                .get(*source)
                .and_then(|s| source_meta(s, schemas))
                .ok_or(StructuralError::BindingNotSelected { binding: *source })?;
            expand_projection(*source, meta, fields, &[], query, schemas, out)
        }
        Select::Tuple(items) => {
            // Rows expand in place; scalar accesses append after them.
            let mut scalars = Vec::new();
            for item in items {
                match item {
                    SelectItem::Row(row) => expand_shape(row, query, schemas, out)?,
                    SelectItem::Scalar(expr) => scalars.push(expr.clone()),
                }
            }
            out.extend(scalars);
            Ok(())
        }
    }
}

/// Expand one struct/map projection level. `path` is the association path
/// from the root projection to this level, used to match preload bindings.
fn expand_projection(
    source: usize,
    meta: &SchemaMeta,
    fields: &[SelectField],
    path: &[String],
    query: &Query,
    schemas: &dyn SchemaProvider,
    out: &mut Vec<Expr>,
) -> QueryResult<()> {
    for field in fields {
        match field {
            SelectField::Field(name) => {
                let def = meta.field_def(name).ok_or_else(|| ValidationError::UnknownField {
                    schema: meta.name.clone(),
                    field: name.clone(),
                })?;
                if def.is_virtual {
                    return Err(ValidationError::VirtualField {
                        schema: meta.name.clone(),
                        field: name.clone(),
                    }
                    .into());
                }
                out.push(Expr::field(source, name.clone()));
            }
            SelectField::Assoc { name, fields } => {
                if meta.association_spec(name).is_none() {
                    if meta.field_def(name).is_some() {
                        return Err(ValidationError::NotAnAssociation {
                            schema: meta.name.clone(),
                            name: name.clone(),
                        }
                        .into());
                    }
                    return Err(StructuralError::UnknownAssociation {
                        schema: meta.name.clone(),
                        name: name.clone(),
                    }
                    .into());
                }

                let mut assoc_path = path.to_vec();
                assoc_path.push(name.clone());
                let binding = preload_binding(&query.preloads, &assoc_path).ok_or_else(|| {
                    StructuralError::UnboundAssociationSelect { name: name.clone() }
                })?;

                let target = crate::plan::assoc::chain_target(schemas, &meta.name, name)?;
                let target_meta =
                    schemas
                        .schema(&target)
                        .ok_or_else(|| StructuralError::UnknownSchema {
                            schema: target.clone(),
                        })?;
                expand_projection(binding, target_meta, fields, &assoc_path, query, schemas, out)?;
            }
        }
    }
    Ok(())
}

/// Find the preload whose path matches `path` exactly and has a binding.
fn preload_binding(preloads: &[Preload], path: &[String]) -> Option<usize> {
    preloads
        .iter()
        .find(|p| p.path == path)
        .and_then(|p| p.binding)
}

fn source_meta<'a>(source: &Source, schemas: &'a dyn SchemaProvider) -> Option<&'a SchemaMeta> {
    schemas.schema(source.schema_name()?)
}

fn push_source_fields(out: &mut Vec<Expr>, ix: usize, meta: &SchemaMeta) {
    for name in meta.stored_field_names() {
        out.push(Expr::field(ix, name));
    }
}

/// Validate preload declarations against the schema graph and the expanded
/// selection.
pub(crate) fn validate_preloads(
    query: &Query,
    schemas: &dyn SchemaProvider,
    selected_sources: &std::collections::BTreeSet<usize>,
) -> QueryResult<()> {
    for preload in &query.preloads {
        if let Some(binding) = preload.binding {
            if binding >= query.sources.len() {
                return Err(StructuralError::TooManyBindings {
                    binding,
                    sources: query.sources.len(),
                }
                .into());
            }
            if !selected_sources.contains(&binding) {
                return Err(StructuralError::BindingNotSelected { binding }.into());
            }
        }

        // Walk the path through the schema graph from the root source.
        let mut current = query
            .from_source()
            .and_then(|s| source_meta(s, schemas));
        for name in &preload.path {
            let Some(meta) = current else { break };
            match meta.association_spec(name) {
                Some(_) => {
                    let target = crate::plan::assoc::chain_target(schemas, &meta.name, name)?;
                    current = schemas.schema(&target);
                }
                None if meta.field_def(name).is_some() => {
                    return Err(ValidationError::NotAnAssociation {
                        schema: meta.name.clone(),
                        name: name.clone(),
                    }
                    .into());
                }
                None => {
                    return Err(StructuralError::UnknownAssociation {
                        schema: meta.name.clone(),
                        name: name.clone(),
                    }
                    .into());
                }
            }
        }
    }
    Ok(())
}
