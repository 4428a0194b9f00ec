//! Integration tests for the pgrest REST layer

use std::sync::Arc;

use serde_json::json;

use pgrest::common::config::PgRestConfig;
use pgrest::common::error::Error;
use pgrest::common::types::{ColumnInfo, TableInfo};
use pgrest::rest::backend::row;
use pgrest::rest::builder::{encode_cursor, encode_key, parse_composite_key};
use pgrest::rest::{QueryParams, RecordingExecutor, Row, SchemaCache, SchemaSnapshot, SqlValue};
use pgrest::PgRestServer;

fn schema() -> Arc<SchemaCache> {
    let snapshot = SchemaSnapshot::new()
        .with_table(TableInfo::new(
            "users",
            vec![
                ColumnInfo::new("id", "integer").primary_key(),
                ColumnInfo::new("name", "text"),
                ColumnInfo::new("email", "text"),
            ],
        ))
        .with_table(TableInfo::new(
            "authors",
            vec![
                ColumnInfo::new("id", "integer").primary_key(),
                ColumnInfo::new("name", "text"),
            ],
        ))
        .with_table(
            TableInfo::new(
                "posts",
                vec![
                    ColumnInfo::new("id", "integer").primary_key(),
                    ColumnInfo::new("title", "text"),
                    ColumnInfo::new("author_id", "integer"),
                    ColumnInfo::new("tags", "text[]"),
                ],
            )
            .with_foreign_key("author_id", "authors", "id"),
        )
        .with_table(TableInfo::new(
            "order_items",
            vec![
                ColumnInfo::new("order_id", "integer").primary_key(),
                ColumnInfo::new("product_id", "integer").primary_key(),
                ColumnInfo::new("quantity", "integer"),
            ],
        ));
    Arc::new(SchemaCache::from_snapshot(snapshot))
}

fn server(executor: &Arc<RecordingExecutor>) -> PgRestServer {
    PgRestServer::new(PgRestConfig::default(), schema(), executor.clone())
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn user(id: i64, name: &str, email: &str) -> Row {
    row([
        ("id", SqlValue::Int(id)),
        ("name", text(name)),
        ("email", text(email)),
    ])
}

fn post(id: i64, author_id: i64) -> Row {
    row([
        ("id", SqlValue::Int(id)),
        ("title", text(&format!("post {id}"))),
        ("author_id", SqlValue::Int(author_id)),
        (
            "tags",
            SqlValue::Array(vec![text("sports"), text("music")]),
        ),
    ])
}

fn int(value: &SqlValue) -> i64 {
    match value {
        SqlValue::Int(n) => *n,
        other => panic!("expected integer parameter, got {other:?}"),
    }
}

/// Apply the trailing `LIMIT ? OFFSET ?` parameters to `rows`
fn page(rows: Vec<Row>, params: &[SqlValue]) -> Vec<Row> {
    let n = params.len();
    let limit = usize::try_from(int(&params[n - 2])).unwrap();
    let offset = usize::try_from(int(&params[n - 1])).unwrap();
    rows.into_iter().skip(offset).take(limit).collect()
}

fn users_executor() -> Arc<RecordingExecutor> {
    Arc::new(
        RecordingExecutor::new()
            .on_query("COUNT(*)", vec![row([("count", SqlValue::Int(2))])])
            .on_query_with("FROM users", |sql, params| {
                let mut rows = vec![
                    user(1, "John", "john@x.com"),
                    user(2, "Jane", "jane@x.com"),
                ];
                if sql.contains("ORDER BY name ASC") {
                    rows.sort_by_key(|r| r["name"].as_text());
                }
                Ok(page(rows, params))
            }),
    )
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_simple_get_with_legacy_ordering() {
    let executor = users_executor();
    let server = server(&executor);
    let params = QueryParams::parse("offset=0&limit=1&orderBy=name&orderDirection=asc");

    let response = server.state().service.list("users", &params).await.unwrap();

    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0]["name"], json!("Jane"));
    assert_eq!(response.pagination.total, 2);
    assert!(response.pagination.has_more);
}

#[tokio::test]
async fn test_composite_key_read() {
    let executor = Arc::new(RecordingExecutor::new().on_query_with(
        "FROM order_items",
        |_, params| {
            let rows = vec![row([
                ("order_id", SqlValue::Int(1)),
                ("product_id", SqlValue::Int(2)),
                ("quantity", SqlValue::Int(5)),
            ])];
            Ok(if params == [SqlValue::Int(1), SqlValue::Int(2)] {
                rows
            } else {
                vec![]
            })
        },
    ));
    let server = server(&executor);
    let state = server.state();
    let service = &state.service;

    let item = service
        .get("order_items", "1,2", &QueryParams::new())
        .await
        .unwrap();
    assert_eq!(item, json!({"order_id": 1, "product_id": 2, "quantity": 5}));

    let missing = service
        .get("order_items", "999,888", &QueryParams::new())
        .await;
    assert!(matches!(missing, Err(Error::ResourceNotFound)));
}

#[test]
fn test_composite_key_symmetry() {
    let cache = schema();
    let table = pgrest::rest::SchemaProvider::table(cache.as_ref(), "order_items")
        .unwrap()
        .unwrap();

    let key = encode_key(&["7", "42"]);
    let parts: Vec<String> = parse_composite_key(&table, &key)
        .unwrap()
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(parts, vec!["7", "42"]);

    let err = parse_composite_key(&table, "1,2,3").unwrap_err();
    assert!(err.to_string().contains('2'));
}

#[tokio::test]
async fn test_array_filters() {
    let executor = Arc::new(RecordingExecutor::new().on_query_with(
        "FROM posts",
        |sql, params| {
            let included = if sql.contains("tags @> ARRAY[?]::text[]") {
                params[0] == text("sports") || params[0] == text("music")
            } else if sql.contains("array_length(tags,1) = ?") {
                int(&params[0]) == 2
            } else {
                true
            };
            Ok(if included { vec![post(1, 1)] } else { vec![] })
        },
    ));
    let server = server(&executor);
    let state = server.state();
    let service = &state.service;

    for (query, expected) in [
        ("tags=arraycontains.sports", 1),
        ("tags=arraylength.2", 1),
        ("tags=arraylength.3", 0),
    ] {
        let response = service
            .list("posts", &QueryParams::parse(query))
            .await
            .unwrap();
        assert_eq!(response.data.len(), expected, "{query}");
    }
    assert_eq!(
        executor.statements()[1].sql,
        "SELECT * FROM posts WHERE tags @> ARRAY[?]::text[] LIMIT ? OFFSET ?"
    );
}

#[tokio::test]
async fn test_filter_without_operator_matches_eq() {
    let executor = Arc::new(RecordingExecutor::new());
    let server = server(&executor);
    let state = server.state();
    let service = &state.service;

    service
        .list("users", &QueryParams::parse("id=eq.5"))
        .await
        .unwrap();
    let explicit = executor.statements();
    executor.clear_log();

    service
        .list("users", &QueryParams::parse("id=5"))
        .await
        .unwrap();
    assert_eq!(executor.statements(), explicit);
    assert_eq!(explicit[0].params, vec![SqlValue::Int(5)]);
}

#[tokio::test]
async fn test_or_group_inside_and() {
    let executor = Arc::new(RecordingExecutor::new());
    let server = server(&executor);

    server
        .state()
        .service
        .list(
            "users",
            &QueryParams::parse("or=(name.like.John,id.gt.65)&email=eq.a@x.com"),
        )
        .await
        .unwrap();

    let count = &executor.statements()[0];
    assert_eq!(
        count.sql,
        "SELECT COUNT(*) AS count FROM users WHERE email = ? AND (name LIKE ? OR id > ?)"
    );
    assert_eq!(
        count.params,
        vec![text("a@x.com"), text("%John%"), SqlValue::Int(65)]
    );
}

#[tokio::test]
async fn test_injection_attempts_never_reach_the_database() {
    let executor = Arc::new(RecordingExecutor::new());
    let server = server(&executor);
    let state = server.state();
    let service = &state.service;

    for query in [
        "name=eq.x;select",
        "name=eq.x--",
        "name=eq.Robert%27)%20DROP%20TABLE%20users",
        "name=in.(a,b'c)",
        "order=name;drop",
        "select=id,secret",
    ] {
        let err = service
            .list("users", &QueryParams::parse(query))
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{query}: {err}");
    }
    assert_eq!(executor.statement_count(), 0);
}

#[tokio::test]
async fn test_cursor_walk() {
    let executor = Arc::new(
        RecordingExecutor::new()
            .on_query("COUNT(*)", vec![row([("count", SqlValue::Int(5))])])
            .on_query_with("FROM users", |sql, params| {
                let after = if sql.contains("id > ?") { int(&params[0]) } else { 0 };
                let rows = (1..=5)
                    .filter(|id| *id > after)
                    .map(|id| user(id, &format!("u{id}"), "x@x.com"))
                    .collect();
                Ok(page(rows, params))
            }),
    );
    let server = server(&executor);
    let state = server.state();
    let service = &state.service;

    let mut seen = Vec::new();
    let mut query = "first=2".to_string();
    loop {
        let response = service
            .list_cursor("users", &QueryParams::parse(&query))
            .await
            .unwrap();
        assert_eq!(response.total_count, 5);
        seen.extend(response.edges.iter().map(|e| e.node["id"].as_i64().unwrap()));
        if !response.page_info.has_next_page {
            break;
        }
        let end = response.page_info.end_cursor.unwrap();
        query = format!("first=2&after={}", urlencode(&end));
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    assert_eq!(encode_cursor("5"), "NQ==");
}

fn urlencode(s: &str) -> String {
    s.replace('=', "%3D").replace('+', "%2B").replace('/', "%2F")
}

// ============================================================================
// Relationship expansion
// ============================================================================

fn blog_executor(posts: Vec<Row>) -> Arc<RecordingExecutor> {
    Arc::new(
        RecordingExecutor::new()
            .on_query_with("FROM authors WHERE id IN", |_, params| {
                Ok([(1, "Ann"), (2, "Bob"), (3, "Cy")]
                    .into_iter()
                    .filter(|(id, _)| params.contains(&SqlValue::Int(*id)))
                    .map(|(id, name)| row([("id", SqlValue::Int(id)), ("name", text(name))]))
                    .collect())
            })
            .on_query_with("FROM posts WHERE author_id IN", |_, params| {
                Ok([(10, 1), (11, 1)]
                    .into_iter()
                    .filter(|(_, author)| params.contains(&SqlValue::Int(*author)))
                    .map(|(id, author)| {
                        row([("id", SqlValue::Int(id)), ("author_id", SqlValue::Int(author))])
                    })
                    .collect())
            })
            .on_query("FROM posts", posts)
            .on_query(
                "FROM authors",
                vec![
                    row([("id", SqlValue::Int(1)), ("name", text("Ann"))]),
                    row([("id", SqlValue::Int(2)), ("name", text("Bob"))]),
                ],
            ),
    )
}

#[tokio::test]
async fn test_forward_and_reverse_expansion() {
    let executor = blog_executor(vec![post(10, 1), post(11, 1)]);
    let server = server(&executor);
    let state = server.state();
    let service = &state.service;

    let posts = service
        .list("posts", &QueryParams::parse("select=*,authors(*)"))
        .await
        .unwrap();
    assert_eq!(posts.data[0]["authors"], json!({"id": 1, "name": "Ann"}));

    let authors = service
        .list("authors", &QueryParams::parse("select=*,posts(id)"))
        .await
        .unwrap();
    assert_eq!(authors.data[0]["posts"], json!([{"id": 10}, {"id": 11}]));
    assert_eq!(authors.data[1]["posts"], json!([]));
}

#[tokio::test]
async fn test_expansion_issues_one_query_per_relationship() {
    for m in [0_i64, 1, 5, 100] {
        let posts = (0..m).map(|i| post(i, i % 3 + 1)).collect();
        let executor = blog_executor(posts);
        let server = server(&executor);

        let response = server
            .state()
            .service
            .list("posts", &QueryParams::parse("limit=100&expand=authors"))
            .await
            .unwrap();

        assert_eq!(response.data.len(), usize::try_from(m).unwrap());
        let expected = usize::from(m > 0);
        assert_eq!(
            executor.count_matching("FROM authors WHERE id IN"),
            expected,
            "M={m}"
        );
    }
}

#[tokio::test]
async fn test_expansion_failure_keeps_primary_rows() {
    let executor = Arc::new(
        RecordingExecutor::new()
            .on_query_with("FROM authors", |_, _| {
                Err(Error::sql(None, "relation \"authors\" is locked"))
            })
            .on_query(
                "FROM posts",
                vec![row([("id", SqlValue::Int(1)), ("author_id", SqlValue::Int(1))])],
            ),
    );
    let server = server(&executor);

    let response = server
        .state()
        .service
        .list("posts", &QueryParams::parse("select=id,authors(name)"))
        .await
        .unwrap();
    assert_eq!(response.data, vec![json!({"id": 1})]);
}
