use quarry::plan::{plan, AdapterCaps, CacheKey};
use quarry::query::{Expr, JoinQual, Query, QueryOp, SortDir, Source};
use quarry::schema::{Catalog, SchemaMeta};
use quarry::types::{default_registry, SemanticType, Value};

fn create_catalog() -> Catalog {
    Catalog::new()
        .add(
            SchemaMeta::new("Post", "posts")
                .field("id", SemanticType::Int)
                .field("title", SemanticType::Str),
        )
        .add(
            SchemaMeta::new("Draft", "drafts")
                .field("id", SemanticType::Int)
                .field("title", SemanticType::Str),
        )
}

const CACHING: AdapterCaps = AdapterCaps {
    cache: true,
    length_specialization: false,
};

const SPECIALIZING: AdapterCaps = AdapterCaps {
    cache: true,
    length_specialization: true,
};

fn key_of(query: Query, adapter: &AdapterCaps) -> CacheKey {
    plan(
        query,
        QueryOp::All,
        default_registry(),
        &create_catalog(),
        adapter,
    )
    .unwrap()
    .cache_key
}

fn base_query(id: i64) -> Query {
    Query::from_schema("Post", "posts")
        .where_(Expr::eq(Expr::field(0, "id"), Expr::pinned(id)))
        .order_by(SortDir::Desc, Expr::field(0, "title"))
        .limit(Expr::literal(10i64))
}

#[test]
fn test_same_shape_different_values_share_key() {
    let a = key_of(base_query(1), &CACHING);
    let b = key_of(base_query(99), &CACHING);
    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert!(a.fingerprint().is_some());
}

#[test]
fn test_literal_difference_changes_key() {
    let a = key_of(base_query(1), &CACHING);
    let b = key_of(base_query(1).where_(Expr::eq(
        Expr::field(0, "title"),
        Expr::literal("fixed"),
    )), &CACHING);
    assert_ne!(a, b);

    // A differing literal inside an equal clause set still differs.
    let fixed = |title: &str| {
        key_of(
            base_query(1).where_(Expr::eq(Expr::field(0, "title"), Expr::literal(title))),
            &CACHING,
        )
    };
    assert_ne!(fixed("a"), fixed("b"));
}

#[test]
fn test_join_qualifier_changes_key() {
    let on = Expr::eq(Expr::field(0, "id"), Expr::field(1, "id"));
    let raw = Source::Table {
        table: "raw".to_string(),
        prefix: None,
    };
    let inner = key_of(
        base_query(1).join_on(JoinQual::Inner, raw.clone(), on.clone()),
        &CACHING,
    );
    let left = key_of(base_query(1).join_on(JoinQual::Left, raw, on), &CACHING);
    assert_ne!(inner, left);
}

#[test]
fn test_source_schema_changes_key() {
    let a = key_of(base_query(1), &CACHING);
    let b = key_of(
        Query::from_schema("Draft", "drafts")
            .where_(Expr::eq(Expr::field(0, "id"), Expr::pinned(1i64)))
            .order_by(SortDir::Desc, Expr::field(0, "title"))
            .limit(Expr::literal(10i64)),
        &CACHING,
    );
    assert_ne!(a, b);
}

#[test]
fn test_prefix_changes_key() {
    let a = key_of(base_query(1), &CACHING);
    let b = key_of(base_query(1).with_prefix("tenant_a"), &CACHING);
    assert_ne!(a, b);
}

#[test]
fn test_variable_length_list_yields_no_cache() {
    let query = Query::from_schema("Post", "posts").where_(Expr::is_in(
        Expr::field(0, "id"),
        Expr::pinned_list([Value::Int(1), Value::Int(2)]),
    ));
    assert_eq!(key_of(query, &CACHING), CacheKey::NoCache);
}

#[test]
fn test_length_specialization_keys_per_count() {
    let list_query = |values: Vec<Value>| {
        Query::from_schema("Post", "posts")
            .where_(Expr::is_in(Expr::field(0, "id"), Expr::pinned_list(values)))
    };

    let two = key_of(list_query(vec![Value::Int(1), Value::Int(2)]), &SPECIALIZING);
    let two_other = key_of(list_query(vec![Value::Int(8), Value::Int(9)]), &SPECIALIZING);
    let three = key_of(
        list_query(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        &SPECIALIZING,
    );

    assert!(matches!(two, CacheKey::Key(_)));
    // Same length shares a key; a differing length gets its own.
    assert_eq!(two, two_other);
    assert_ne!(two, three);
}

#[test]
fn test_adapter_without_cache_always_no_cache() {
    let none = AdapterCaps {
        cache: false,
        length_specialization: false,
    };
    assert_eq!(key_of(base_query(1), &none), CacheKey::NoCache);
}
