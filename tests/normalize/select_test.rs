use quarry::error::{QueryError, StructuralError, ValidationError};
use quarry::plan::AdapterCaps;
use quarry::prepare::prepare;
use quarry::query::{Expr, JoinQual, Query, QueryOp, Select, SelectField, SelectItem};
use quarry::schema::{AssociationSpec, Cardinality, Catalog, SchemaMeta};
use quarry::types::{default_registry, SemanticType};

fn create_catalog() -> Catalog {
    Catalog::new()
        .add(
            SchemaMeta::new("Post", "posts")
                .field("id", SemanticType::Int)
                .field("title", SemanticType::Str)
                .field("body", SemanticType::Str)
                .virtual_field("rank", SemanticType::Float)
                .association(
                    "comments",
                    AssociationSpec::Has {
                        target: "Comment".to_string(),
                        cardinality: Cardinality::Many,
                        owner_key: "id".to_string(),
                        related_key: "post_id".to_string(),
                        filter: None,
                    },
                ),
        )
        .add(
            SchemaMeta::new("Comment", "comments")
                .field("id", SemanticType::Int)
                .field("post_id", SemanticType::Int)
                .field("author_id", SemanticType::Int)
                .field("text", SemanticType::Str)
                .association(
                    "author",
                    AssociationSpec::BelongsTo {
                        target: "User".to_string(),
                        owner_key: "author_id".to_string(),
                        related_key: "id".to_string(),
                        filter: None,
                    },
                ),
        )
        .add(
            SchemaMeta::new("User", "users")
                .field("id", SemanticType::Int)
                .field("name", SemanticType::Str),
        )
}

fn run(query: Query) -> Result<quarry::Prepared, QueryError> {
    prepare(
        query,
        QueryOp::All,
        &create_catalog(),
        default_registry(),
        &AdapterCaps::default(),
    )
}

fn selected_fields(prepared: &quarry::Prepared) -> Vec<String> {
    match prepared.query.select.as_ref().unwrap() {
        Select::Fields(fields) => fields.iter().map(|f| f.to_string()).collect(),
        other => panic!("expected flat fields, got {other:?}"),
    }
}

#[test]
fn test_default_select_expands_declared_field_order() {
    let prepared = run(Query::from_schema("Post", "posts")).unwrap();
    // Virtual fields are not part of the stored row.
    assert_eq!(
        selected_fields(&prepared),
        vec!["s0.id", "s0.title", "s0.body"]
    );
}

#[test]
fn test_default_select_covers_every_schema_source() {
    let prepared = run(
        Query::from_schema("Post", "posts").join_assoc(JoinQual::Inner, 0, "comments"),
    )
    .unwrap();
    assert_eq!(
        selected_fields(&prepared),
        vec![
            "s0.id", "s0.title", "s0.body", "s1.id", "s1.post_id", "s1.author_id", "s1.text"
        ]
    );
}

#[test]
fn test_struct_projection_expands_bound_association() {
    let query = Query::from_schema("Post", "posts")
        .join_assoc(JoinQual::Inner, 0, "comments")
        .preload(["comments".to_string()], Some(1))
        .select(Select::Struct {
            source: 0,
            fields: vec![
                SelectField::Field("id".to_string()),
                SelectField::Field("title".to_string()),
                SelectField::Assoc {
                    name: "comments".to_string(),
                    fields: vec![
                        SelectField::Field("id".to_string()),
                        SelectField::Field("text".to_string()),
                    ],
                },
            ],
        });
    let prepared = run(query).unwrap();
    assert_eq!(
        selected_fields(&prepared),
        vec!["s0.id", "s0.title", "s1.id", "s1.text"]
    );
}

#[test]
fn test_nested_association_projection() {
    let query = Query::from_schema("Post", "posts")
        .join_assoc(JoinQual::Inner, 0, "comments")
        .join_assoc(JoinQual::Inner, 1, "author")
        .preload(["comments".to_string()], Some(1))
        .preload(["comments".to_string(), "author".to_string()], Some(2))
        .select(Select::Map {
            source: 0,
            fields: vec![
                SelectField::Field("id".to_string()),
                SelectField::Assoc {
                    name: "comments".to_string(),
                    fields: vec![
                        SelectField::Field("id".to_string()),
                        SelectField::Assoc {
                            name: "author".to_string(),
                            fields: vec![SelectField::Field("name".to_string())],
                        },
                    ],
                },
            ],
        });
    let prepared = run(query).unwrap();
    assert_eq!(
        selected_fields(&prepared),
        vec!["s0.id", "s1.id", "s2.name"]
    );
}

#[test]
fn test_unbound_association_in_select_rejected() {
    let query = Query::from_schema("Post", "posts")
        .join_assoc(JoinQual::Inner, 0, "comments")
        .select(Select::Struct {
            source: 0,
            fields: vec![
                SelectField::Field("id".to_string()),
                SelectField::Assoc {
                    name: "comments".to_string(),
                    fields: vec![SelectField::Field("id".to_string())],
                },
            ],
        });
    let err = run(query).unwrap_err();
    match err {
        QueryError::Structural(StructuralError::UnboundAssociationSelect { name }) => {
            assert_eq!(name, "comments");
        }
        other => panic!("expected unbound association select, got {other:?}"),
    }
}

#[test]
fn test_omitted_association_is_not_auto_included() {
    let query = Query::from_schema("Post", "posts")
        .join_assoc(JoinQual::Inner, 0, "comments")
        .preload(["comments".to_string()], Some(1))
        .select(Select::Struct {
            source: 0,
            fields: vec![SelectField::Field("id".to_string())],
        });
    let err = run(query).unwrap_err();
    // With the association elided from the projection, the preload binding
    // no longer appears in the selected row.
    assert!(matches!(
        err,
        QueryError::Structural(StructuralError::BindingNotSelected { binding: 1 })
    ));
}

#[test]
fn test_tuple_select_appends_scalar_after_row() {
    let query = Query::from_schema("Post", "posts")
        .join_assoc(JoinQual::Inner, 0, "comments")
        .select(Select::Tuple(vec![
            SelectItem::Scalar(Expr::field(1, "id")),
            SelectItem::Row(Select::Source(0)),
        ]));
    let prepared = run(query).unwrap();
    assert_eq!(
        selected_fields(&prepared),
        vec!["s0.id", "s0.title", "s0.body", "s1.id"]
    );
}

#[test]
fn test_unknown_field_in_explicit_select_rejected() {
    let query = Query::from_schema("Post", "posts")
        .select(Select::Fields(vec![Expr::field(0, "subtitle")]));
    let err = run(query).unwrap_err();
    match err {
        QueryError::Validation(ValidationError::UnknownField { schema, field }) => {
            assert_eq!(schema, "Post");
            assert_eq!(field, "subtitle");
        }
        other => panic!("expected unknown field, got {other:?}"),
    }
}

#[test]
fn test_virtual_field_in_explicit_select_rejected() {
    let query = Query::from_schema("Post", "posts")
        .select(Select::Fields(vec![Expr::field(0, "rank")]));
    let err = run(query).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Validation(ValidationError::VirtualField { .. })
    ));
}

#[test]
fn test_unknown_field_in_tuple_scalar_rejected() {
    let query = Query::from_schema("Post", "posts")
        .join_assoc(JoinQual::Inner, 0, "comments")
        .select(Select::Tuple(vec![
            SelectItem::Row(Select::Source(0)),
            SelectItem::Scalar(Expr::field(1, "subtitle")),
        ]));
    let err = run(query).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Validation(ValidationError::UnknownField { .. })
    ));
}

#[test]
fn test_virtual_field_in_projection_rejected() {
    let query = Query::from_schema("Post", "posts").select(Select::Struct {
        source: 0,
        fields: vec![SelectField::Field("rank".to_string())],
    });
    let err = run(query).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Validation(ValidationError::VirtualField { .. })
    ));
}

#[test]
fn test_preload_binding_beyond_sources_rejected() {
    let query = Query::from_schema("Post", "posts").preload(["comments".to_string()], Some(5));
    let err = run(query).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Structural(StructuralError::TooManyBindings {
            binding: 5,
            sources: 1,
        })
    ));
}

#[test]
fn test_preload_target_must_be_association() {
    let query = Query::from_schema("Post", "posts").preload(["title".to_string()], None);
    let err = run(query).unwrap_err();
    match err {
        QueryError::Validation(ValidationError::NotAnAssociation { schema, name }) => {
            assert_eq!(schema, "Post");
            assert_eq!(name, "title");
        }
        other => panic!("expected not-an-association, got {other:?}"),
    }
}

#[test]
fn test_unknown_preload_target_rejected() {
    let query = Query::from_schema("Post", "posts").preload(["reactions".to_string()], None);
    let err = run(query).unwrap_err();
    assert!(matches!(
        err,
        QueryError::Structural(StructuralError::UnknownAssociation { .. })
    ));
}
