use quarry::error::{QueryError, StructuralError};
use quarry::plan::{plan, AdapterCaps};
use quarry::query::{CombinationKind, Expr, JoinQual, Query, QueryOp};
use quarry::schema::{AssociationSpec, Cardinality, Catalog, JoinFilter, SchemaMeta};
use quarry::types::{default_registry, SemanticType};

/// Helper to create a blog-shaped schema graph:
/// Post has_many Comment, Comment belongs_to User and has_many Vote,
/// plus through chains and a many-to-many tags relation on Post.
fn create_catalog() -> Catalog {
    Catalog::new()
        .add(
            SchemaMeta::new("Post", "posts")
                .field("id", SemanticType::Int)
                .field("title", SemanticType::Str)
                .association(
                    "comments",
                    AssociationSpec::Has {
                        target: "Comment".to_string(),
                        cardinality: Cardinality::Many,
                        owner_key: "id".to_string(),
                        related_key: "post_id".to_string(),
                        filter: None,
                    },
                )
                .association(
                    "visible_comments",
                    AssociationSpec::Has {
                        target: "Comment".to_string(),
                        cardinality: Cardinality::Many,
                        owner_key: "id".to_string(),
                        related_key: "post_id".to_string(),
                        filter: Some(JoinFilter::new(|ix| {
                            Expr::eq(Expr::field(ix, "hidden"), Expr::literal(false))
                        })),
                    },
                )
                .association(
                    "comment_authors",
                    AssociationSpec::Through {
                        chain: vec!["comments".to_string(), "author".to_string()],
                    },
                )
                .association(
                    "comment_votes",
                    AssociationSpec::Through {
                        chain: vec!["comments".to_string(), "votes".to_string()],
                    },
                )
                .association(
                    "tags",
                    AssociationSpec::ManyToMany {
                        target: "Tag".to_string(),
                        join_table: "posts_tags".to_string(),
                        owner_key: "id".to_string(),
                        join_owner_key: "post_id".to_string(),
                        join_target_key: "tag_id".to_string(),
                        target_key: "id".to_string(),
                        filter: None,
                        join_filter: Some(JoinFilter::new(|ix| {
                            Expr::eq(Expr::field(ix, "approved"), Expr::literal(true))
                        })),
                    },
                ),
        )
        .add(
            SchemaMeta::new("Comment", "comments")
                .field("id", SemanticType::Int)
                .field("post_id", SemanticType::Int)
                .field("author_id", SemanticType::Int)
                .field("hidden", SemanticType::Bool)
                .association(
                    "author",
                    AssociationSpec::BelongsTo {
                        target: "User".to_string(),
                        owner_key: "author_id".to_string(),
                        related_key: "id".to_string(),
                        filter: None,
                    },
                )
                .association(
                    "votes",
                    AssociationSpec::Has {
                        target: "Vote".to_string(),
                        cardinality: Cardinality::Many,
                        owner_key: "id".to_string(),
                        related_key: "comment_id".to_string(),
                        filter: None,
                    },
                ),
        )
        .add(SchemaMeta::new("User", "users").field("id", SemanticType::Int))
        .add(
            SchemaMeta::new("Vote", "votes")
                .field("id", SemanticType::Int)
                .field("comment_id", SemanticType::Int),
        )
        .add(SchemaMeta::new("Tag", "tags").field("id", SemanticType::Int))
}

fn plan_all(query: Query) -> quarry::Planned {
    plan(
        query,
        QueryOp::All,
        default_registry(),
        &create_catalog(),
        &AdapterCaps::default(),
    )
    .unwrap()
}

fn join_indices(planned: &quarry::Planned) -> Vec<usize> {
    planned.query.joins.iter().map(|j| j.ix).collect()
}

#[test]
fn test_has_many_expands_to_key_equality() {
    let planned =
        plan_all(Query::from_schema("Post", "posts").join_assoc(JoinQual::Inner, 0, "comments"));
    assert_eq!(planned.query.joins.len(), 1);
    let join = &planned.query.joins[0];
    assert_eq!(join.ix, 1);
    assert!(join.assoc.is_none());
    assert_eq!(join.on.to_string(), "s0.id == s1.post_id");
    assert_eq!(planned.query.sources[1].table(), "comments");
}

#[test]
fn test_belongs_to_expands_from_joined_source() {
    let planned = plan_all(
        Query::from_schema("Post", "posts")
            .join_assoc(JoinQual::Inner, 0, "comments")
            .join_assoc(JoinQual::Left, 1, "author"),
    );
    assert_eq!(join_indices(&planned), vec![1, 2]);
    assert_eq!(planned.query.joins[1].on.to_string(), "s1.author_id == s2.id");
    assert_eq!(planned.query.sources[2].table(), "users");
}

#[test]
fn test_filter_predicate_renders_before_key_equality() {
    let planned = plan_all(
        Query::from_schema("Post", "posts").join_assoc(JoinQual::Inner, 0, "visible_comments"),
    );
    assert_eq!(
        planned.query.joins[0].on.to_string(),
        "s1.hidden == false and s0.id == s1.post_id"
    );
}

#[test]
fn test_many_to_many_emits_join_table_hop() {
    let planned =
        plan_all(Query::from_schema("Post", "posts").join_assoc(JoinQual::Inner, 0, "tags"));

    // Join table takes a fresh index, the target keeps the declared one.
    assert_eq!(join_indices(&planned), vec![2, 1]);
    assert_eq!(planned.query.sources[2].table(), "posts_tags");
    assert_eq!(planned.query.sources[1].table(), "tags");
    assert_eq!(
        planned.query.joins[0].on.to_string(),
        "s2.approved == true and s0.id == s2.post_id"
    );
    assert_eq!(planned.query.joins[1].on.to_string(), "s2.tag_id == s1.id");
}

#[test]
fn test_through_chain_final_hop_keeps_declared_index() {
    let planned = plan_all(
        Query::from_schema("Post", "posts").join_assoc(JoinQual::Inner, 0, "comment_authors"),
    );
    // Intermediate comments hop is allocated after the declared sources.
    assert_eq!(join_indices(&planned), vec![2, 1]);
    assert_eq!(planned.query.sources[2].table(), "comments");
    assert_eq!(planned.query.sources[1].table(), "users");
    assert_eq!(planned.query.joins[0].on.to_string(), "s0.id == s2.post_id");
    assert_eq!(planned.query.joins[1].on.to_string(), "s2.author_id == s1.id");
}

#[test]
fn test_through_before_direct_yields_non_monotonic_indices() {
    let planned = plan_all(
        Query::from_schema("Post", "posts")
            .join_assoc(JoinQual::Inner, 0, "comment_authors")
            .join_assoc(JoinQual::Inner, 0, "comments"),
    );
    // The chain's shared hop is indexed before the direct join even though
    // the direct join was declared with a lower build index.
    assert_eq!(join_indices(&planned), vec![3, 1, 2]);
    assert_eq!(planned.query.sources[3].table(), "comments");
    assert_eq!(planned.query.sources[1].table(), "users");
    assert_eq!(planned.query.sources[2].table(), "comments");
}

#[test]
fn test_sibling_chains_share_intermediate_hop() {
    let planned = plan_all(
        Query::from_schema("Post", "posts")
            .join_assoc(JoinQual::Inner, 0, "comment_authors")
            .join_assoc(JoinQual::Inner, 0, "comment_votes"),
    );
    // One comments hop serves both chains: its index is fixed when the
    // first chain needs it and reused by the second.
    assert_eq!(join_indices(&planned), vec![3, 1, 2]);
    assert_eq!(planned.query.joins.len(), 3);
    assert_eq!(planned.query.sources[3].table(), "comments");
    assert_eq!(planned.query.sources[1].table(), "users");
    assert_eq!(planned.query.sources[2].table(), "votes");
    assert_eq!(planned.query.joins[2].on.to_string(), "s3.id == s2.comment_id");
}

#[test]
fn test_association_join_inside_combination_expanded() {
    let sub = Query::from_schema("Post", "posts").join_assoc(JoinQual::Inner, 0, "comments");
    let planned = plan_all(
        Query::from_schema("Post", "posts").combine(CombinationKind::Union, sub),
    );

    // The sub-query expands against its own source arena; no symbolic
    // markers survive planning anywhere in the tree.
    let (_, sub) = &planned.query.combinations[0];
    assert_eq!(sub.joins.len(), 1);
    assert!(sub.joins[0].assoc.is_none());
    assert_eq!(sub.joins[0].ix, 1);
    assert_eq!(sub.joins[0].on.to_string(), "s0.id == s1.post_id");
    assert_eq!(sub.sources[1].table(), "comments");
}

#[test]
fn test_association_on_schemaless_source_rejected() {
    let err = plan(
        Query::from_table("raw").join_assoc(JoinQual::Inner, 0, "comments"),
        QueryOp::All,
        default_registry(),
        &create_catalog(),
        &AdapterCaps::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Structural(StructuralError::SchemalessJoin { ix: 0, .. })
    ));
}

#[test]
fn test_unknown_association_rejected() {
    let err = plan(
        Query::from_schema("Post", "posts").join_assoc(JoinQual::Inner, 0, "reactions"),
        QueryOp::All,
        default_registry(),
        &create_catalog(),
        &AdapterCaps::default(),
    )
    .unwrap_err();
    match err {
        QueryError::Structural(StructuralError::UnknownAssociation { schema, name }) => {
            assert_eq!(schema, "Post");
            assert_eq!(name, "reactions");
        }
        other => panic!("expected unknown association, got {other:?}"),
    }
}

#[test]
fn test_through_cycle_rejected() {
    let catalog = Catalog::new().add(
        SchemaMeta::new("Node", "nodes")
            .field("id", SemanticType::Int)
            .association(
                "loop",
                AssociationSpec::Through {
                    chain: vec!["loop".to_string()],
                },
            ),
    );
    let err = plan(
        Query::from_schema("Node", "nodes").join_assoc(JoinQual::Inner, 0, "loop"),
        QueryOp::All,
        default_registry(),
        &catalog,
        &AdapterCaps::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Structural(StructuralError::AssociationCycle { .. })
    ));
}
