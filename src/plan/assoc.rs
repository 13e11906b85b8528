//! Association join expansion.
//!
//! Rewrites every symbolic association join into concrete [`JoinExpr`]
//! nodes with resolved source indices. Through-chains are flattened with an
//! explicit worklist keyed by association name, so cyclic schema graphs
//! terminate; a chain that revisits the same association is an error.
//!
//! Index assignment: declared joins keep their build-time indices (from is
//! 0, the nth declared join is n). Expanding a chain keeps the declared
//! index on the chain's final hop and allocates fresh indices for
//! intermediate hops from a counter starting at the declared source count,
//! in order of first need. Intermediate hops are shared across chains,
//! keyed by `(parent_ix, association name)`, so a hop first needed by a
//! later declaration can hold a lower index than an earlier declaration's
//! own trailing hop.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{QueryResult, StructuralError};
use crate::query::{AssocRef, Expr, JoinExpr, JoinQual, Query, Source};
use crate::schema::{AssociationSpec, JoinFilter, SchemaProvider};

// =============================================================================
// Chain flattening
// =============================================================================

/// One concrete hop of a flattened association chain.
struct ResolvedHop {
    name: String,
    spec: AssociationSpec,
}

/// Flatten `name` on `owner_schema` into concrete hops, splicing through
/// chains in place.
fn flatten_chain(
    schemas: &dyn SchemaProvider,
    owner_schema: &str,
    name: &str,
) -> Result<Vec<ResolvedHop>, StructuralError> {
    let mut hops = Vec::new();
    let mut pending: VecDeque<String> = VecDeque::from([name.to_string()]);
    let mut current_schema = owner_schema.to_string();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    while let Some(next) = pending.pop_front() {
        let meta = schemas
            .schema(&current_schema)
            .ok_or_else(|| StructuralError::UnknownSchema {
                schema: current_schema.clone(),
            })?;
        let spec = meta
            .association_spec(&next)
            .ok_or_else(|| StructuralError::UnknownAssociation {
                schema: current_schema.clone(),
                name: next.clone(),
            })?;

        match spec {
            AssociationSpec::Through { chain } => {
                if !seen.insert((current_schema.clone(), next.clone())) {
                    return Err(StructuralError::AssociationCycle {
                        schema: current_schema.clone(),
                        name: next,
                    });
                }
                for link in chain.iter().rev() {
                    pending.push_front(link.clone());
                }
            }
            concrete => {
                let target = match concrete {
                    AssociationSpec::Has { target, .. }
                    | AssociationSpec::BelongsTo { target, .. }
                    | AssociationSpec::ManyToMany { target, .. } => target.clone(),
                    AssociationSpec::Through { .. } => unreachable!(),
                };
                hops.push(ResolvedHop {
                    name: next,
                    spec: concrete.clone(),
                });
                current_schema = target;
            }
        }
    }

    Ok(hops)
}

/// The schema an association ultimately lands on, with through chains
/// walked to their final hop.
pub(crate) fn chain_target(
    schemas: &dyn SchemaProvider,
    owner_schema: &str,
    name: &str,
) -> Result<String, StructuralError> {
    let hops = flatten_chain(schemas, owner_schema, name)?;
    let last = hops.last().ok_or_else(|| StructuralError::UnknownAssociation {
        schema: owner_schema.to_string(),
        name: name.to_string(),
    })?;
    match &last.spec {
        AssociationSpec::Has { target, .. }
        | AssociationSpec::BelongsTo { target, .. }
        | AssociationSpec::ManyToMany { target, .. } => Ok(target.clone()),
        AssociationSpec::Through { .. } => unreachable!("chains are flattened"),
    }
}

// =============================================================================
// Expansion
// =============================================================================

/// Merge an optional filter predicate into a key-equality condition.
/// The filter renders first.
fn merge_on(filter: Option<&JoinFilter>, ix: usize, key_eq: Expr) -> Expr {
    match filter {
        Some(f) => Expr::and(f.build(ix), key_eq),
        None => key_eq,
    }
}

struct Expander<'a> {
    schemas: &'a dyn SchemaProvider,
    sources: Vec<Source>,
    /// Expansion-created intermediate hops, shared across chains.
    hop_cache: HashMap<(usize, String), usize>,
}

impl<'a> Expander<'a> {
    fn source_for(&self, target_schema: &str) -> Result<Source, StructuralError> {
        let meta =
            self.schemas
                .schema(target_schema)
                .ok_or_else(|| StructuralError::UnknownSchema {
                    schema: target_schema.to_string(),
                })?;
        Ok(Source::Schema {
            schema: meta.name.clone(),
            table: meta.source_table.clone(),
            prefix: meta.prefix.clone(),
        })
    }

    /// Allocate a fresh source index at the end of the arena.
    fn fresh_ix(&mut self, source: Source) -> usize {
        let ix = self.sources.len();
        self.sources.push(source);
        ix
    }

    /// Emit the join(s) for one hop. `target_ix` is `Some` when the hop is
    /// the chain's final one and must keep the declared index.
    fn emit_hop(
        &mut self,
        hop: &ResolvedHop,
        parent_ix: usize,
        target_ix: Option<usize>,
        qual: JoinQual,
        out: &mut Vec<JoinExpr>,
    ) -> Result<usize, StructuralError> {
        match &hop.spec {
            AssociationSpec::Has {
                target,
                owner_key,
                related_key,
                filter,
                ..
            }
            | AssociationSpec::BelongsTo {
                target,
                owner_key,
                related_key,
                filter,
            } => {
                let source = self.source_for(target)?;
                let ix = match target_ix {
                    Some(ix) => {
                        self.sources[ix] = source.clone();
                        ix
                    }
                    None => self.fresh_ix(source.clone()),
                };
                let key_eq = Expr::eq(
                    Expr::field(parent_ix, owner_key.clone()),
                    Expr::field(ix, related_key.clone()),
                );
                out.push(JoinExpr {
                    ix,
                    source,
                    on: merge_on(filter.as_ref(), ix, key_eq),
                    qual,
                    assoc: None,
                });
                Ok(ix)
            }
            AssociationSpec::ManyToMany {
                target,
                join_table,
                owner_key,
                join_owner_key,
                join_target_key,
                target_key,
                filter,
                join_filter,
            } => {
                // The join table is always an extra hop with a fresh index.
                let jt_source = Source::Table {
                    table: join_table.clone(),
                    prefix: None,
                };
                let jt_ix = self.fresh_ix(jt_source.clone());
                let jt_eq = Expr::eq(
                    Expr::field(parent_ix, owner_key.clone()),
                    Expr::field(jt_ix, join_owner_key.clone()),
                );
                out.push(JoinExpr {
                    ix: jt_ix,
                    source: jt_source,
                    on: merge_on(join_filter.as_ref(), jt_ix, jt_eq),
                    qual,
                    assoc: None,
                });

                let source = self.source_for(target)?;
                let ix = match target_ix {
                    Some(ix) => {
                        self.sources[ix] = source.clone();
                        ix
                    }
                    None => self.fresh_ix(source.clone()),
                };
                let key_eq = Expr::eq(
                    Expr::field(jt_ix, join_target_key.clone()),
                    Expr::field(ix, target_key.clone()),
                );
                out.push(JoinExpr {
                    ix,
                    source,
                    on: merge_on(filter.as_ref(), ix, key_eq),
                    qual,
                    assoc: None,
                });
                Ok(ix)
            }
            AssociationSpec::Through { .. } => unreachable!("chains are flattened"),
        }
    }
}

/// Expand every symbolic association join in `query` into concrete joins.
/// No `assoc` markers remain afterwards, combination sub-queries included.
pub fn expand_joins(mut query: Query, schemas: &dyn SchemaProvider) -> QueryResult<Query> {
    // Each combination sub-query owns its source arena and expands
    // independently.
    let combinations = std::mem::take(&mut query.combinations);
    query.combinations = combinations
        .into_iter()
        .map(|(kind, sub)| Ok((kind, expand_joins(sub, schemas)?)))
        .collect::<QueryResult<Vec<_>>>()?;

    if query.joins.iter().all(|j| j.assoc.is_none()) {
        return Ok(query);
    }

    let mut expander = Expander {
        schemas,
        sources: std::mem::take(&mut query.sources),
        hop_cache: HashMap::new(),
    };
    let joins = std::mem::take(&mut query.joins);
    let mut out = Vec::with_capacity(joins.len());

    for join in joins {
        let Some(AssocRef { source, name }) = join.assoc.clone() else {
            out.push(join);
            continue;
        };

        let owner_schema = match expander.sources.get(source) {
            Some(Source::Schema { schema, .. }) => schema.clone(),
            _ => {
                return Err(StructuralError::SchemalessJoin { ix: source, name }.into());
            }
        };

        let hops = flatten_chain(schemas, &owner_schema, &name)?;
        // A through chain with no links flattens to nothing.
        let Some(last) = hops.len().checked_sub(1) else {
            return Err(StructuralError::UnknownAssociation {
                schema: owner_schema,
                name,
            }
            .into());
        };
        let mut parent_ix = source;

        for (pos, hop) in hops.iter().enumerate() {
            if pos == last {
                expander.emit_hop(hop, parent_ix, Some(join.ix), join.qual, &mut out)?;
            } else {
                // Intermediate hop: reuse one an earlier chain created, or
                // create it now at the next fresh index.
                let key = (parent_ix, hop.name.clone());
                parent_ix = match expander.hop_cache.get(&key) {
                    Some(&ix) => ix,
                    None => {
                        let ix = expander.emit_hop(hop, parent_ix, None, join.qual, &mut out)?;
                        expander.hop_cache.insert(key, ix);
                        ix
                    }
                };
            }
        }
    }

    query.sources = expander.sources;
    query.joins = out;
    Ok(query)
}
