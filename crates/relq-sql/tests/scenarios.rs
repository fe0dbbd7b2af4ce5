//! End-to-end scenarios: schema JSON in, rows out of an in-memory database.

use relq_core::Connective;
use relq_sql::{build_count, build_select, fetch, scalar, FromRow, Schema, SqlError};
use rusqlite::Connection;

const SCHEMA: &str = r#"{
    "Order": {
        "table": "orders",
        "alias": "o",
        "fields": [
            { "name": "id", "column": "id", "value_type": "integer" },
            { "name": "orderNumber", "column": "order_number", "value_type": "integer" },
            { "name": "status", "column": "status", "value_type": "text" },
            { "name": "customerId", "column": "customer_id", "value_type": "integer" }
        ],
        "searchers": ["id", "orderNumber", "status", "customerId"],
        "joins": [
            {
                "origin_field": "customerId",
                "target_class": "Customer",
                "target_field": "id"
            }
        ]
    },
    "Customer": {
        "table": "customers",
        "alias": "c",
        "fields": [
            { "name": "id", "column": "id", "value_type": "integer" },
            { "name": "name", "column": "name", "value_type": "text" },
            { "name": "region", "column": "region", "value_type": "text" }
        ],
        "searchers": ["id", "name", "region"]
    }
}"#;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn seeded_connection() -> Connection {
    init_logging();
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT, region TEXT);
         CREATE TABLE orders (
             id INTEGER PRIMARY KEY,
             order_number INTEGER,
             status TEXT,
             customer_id INTEGER
         );
         INSERT INTO customers VALUES (1, 'john smith', 'eu');
         INSERT INTO customers VALUES (2, 'jane doe', 'us');
         INSERT INTO orders VALUES (1, 100, 'open', 1);
         INSERT INTO orders VALUES (2, 200, 'open', 2);
         INSERT INTO orders VALUES (3, 300, 'closed', 1);",
    )
    .unwrap();
    conn
}

#[derive(Debug, PartialEq)]
struct OrderRow {
    number: i64,
    customer: String,
}

impl FromRow for OrderRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            number: row.get(0)?,
            customer: row.get(1)?,
        })
    }
}

#[test]
fn test_search_across_join_fetches_matching_rows() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ctx = schema.context("Order").unwrap();

    ctx.searcher("status").unwrap().eq("open".to_string()).unwrap();
    ctx.searcher("customerId.name")
        .unwrap()
        .and()
        .unwrap()
        .like("%smith%".to_string())
        .unwrap()
        .set_output(true)
        .unwrap();
    ctx.searcher("orderNumber").unwrap().set_output(true).unwrap();

    let query = build_select(&ctx).unwrap();
    assert_eq!(
        query.sql,
        "SELECT o1.order_number, c2.name FROM orders o1 \
         INNER JOIN customers c2 ON o1.customer_id = c2.id \
         WHERE o1.status = ? AND c2.name LIKE ?"
    );

    let conn = seeded_connection();
    let rows: Vec<OrderRow> = fetch(&conn, &query).unwrap();
    assert_eq!(
        rows,
        vec![OrderRow {
            number: 100,
            customer: "john smith".to_string()
        }]
    );
}

#[test]
fn test_cancelled_search_builds_a_bare_select() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ctx = schema.context("Order").unwrap();

    ctx.searcher("customerId.name")
        .unwrap()
        .eq("john smith".to_string())
        .unwrap();
    assert!(build_select(&ctx).unwrap().sql.contains("INNER JOIN"));

    let sid = ctx.find_searcher("customerId.name").unwrap();
    ctx.searcher_by_id(sid).cancel_search();

    let query = build_select(&ctx).unwrap();
    assert_eq!(query.sql, "SELECT * FROM orders o1");
    assert!(query.binds.is_empty());

    // The tree is reusable after rollback.
    ctx.searcher("status").unwrap().eq("closed".to_string()).unwrap();
    let conn = seeded_connection();
    let count = scalar(&conn, &build_count(&ctx).unwrap()).unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_cancel_leaves_no_trailing_connective() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ctx = schema.context("Order").unwrap();

    ctx.searcher("status").unwrap().eq("open".to_string()).unwrap();
    let anchor = ctx.find_searcher("id").unwrap();
    ctx.searcher_by_id(anchor).and().unwrap();
    ctx.searcher("orderNumber").unwrap().greater_than(150i64).unwrap();

    let number = ctx.find_searcher("orderNumber").unwrap();
    ctx.searcher_by_id(number).cancel_search();

    let query = build_select(&ctx).unwrap();
    assert_eq!(query.sql, "SELECT * FROM orders o1 WHERE o1.status = ?");

    let conn = seeded_connection();
    let count = scalar(&conn, &build_count(&ctx).unwrap()).unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_extra_condition_binds_travel_with_the_join() {
    let schema = Schema::from_json(
        &SCHEMA.replace(
            r#""target_field": "id""#,
            r#""target_field": "id", "extra_condition": "{$TO.region}:eq(eu)""#,
        ),
    )
    .unwrap();
    let mut ctx = schema.context("Order").unwrap();

    ctx.searcher("customerId.name")
        .unwrap()
        .like("%smith%".to_string())
        .unwrap();
    let query = build_select(&ctx).unwrap();
    assert!(query
        .sql
        .contains("INNER JOIN customers c2 ON o1.customer_id = c2.id AND (c2.region = ?)"));
    // Join binds come before WHERE binds.
    assert_eq!(query.binds.len(), 2);

    let conn = seeded_connection();
    let count = scalar(&conn, &build_count(&ctx).unwrap()).unwrap();
    assert_eq!(count, 2, "both of smith's orders, regardless of status");
}

#[test]
fn test_child_query_membership() {
    let schema = Schema::from_json(SCHEMA).unwrap();

    let mut customers = schema.context("Customer").unwrap();
    customers.searcher("region").unwrap().eq("eu".to_string()).unwrap();
    customers.searcher("id").unwrap().set_output(true).unwrap();
    let inner = build_select(&customers).unwrap();

    let mut orders = schema.context("Order").unwrap();
    orders
        .searcher("customerId")
        .unwrap()
        .in_child_query(inner)
        .unwrap();
    let query = build_select(&orders).unwrap();
    assert_eq!(
        query.sql,
        "SELECT * FROM orders o1 WHERE o1.customer_id IN \
         (SELECT c1.id FROM customers c1 WHERE c1.region = ?)"
    );

    let conn = seeded_connection();
    let count = scalar(&conn, &build_count(&orders).unwrap()).unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_grouping_ordering_and_pagination() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ctx = schema.context("Order").unwrap();
    ctx.set_auto_chain(Some(Connective::And));

    ctx.searcher("orderNumber")
        .unwrap()
        .set_output(true)
        .unwrap()
        .mark_order_by(0, false)
        .unwrap();
    ctx.set_page(2, 1);

    let query = build_select(&ctx).unwrap();
    assert_eq!(
        query.sql,
        "SELECT o1.order_number FROM orders o1 ORDER BY o1.order_number DESC LIMIT 1 OFFSET 1"
    );

    #[derive(Debug)]
    struct Number(i64);
    impl FromRow for Number {
        fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self(row.get(0)?))
        }
    }

    let conn = seeded_connection();
    let rows: Vec<Number> = fetch(&conn, &query).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, 200, "second page of the descending order list");
}

#[test]
fn test_delimiter_groups_render_as_parentheses() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ctx = schema.context("Order").unwrap();

    ctx.searcher("status")
        .unwrap()
        .ds()
        .unwrap()
        .eq("open".to_string())
        .unwrap()
        .or()
        .unwrap()
        .eq("closed".to_string())
        .unwrap()
        .de()
        .unwrap();
    ctx.searcher("orderNumber")
        .unwrap()
        .and()
        .unwrap()
        .greater_than(150i64)
        .unwrap();

    let query = build_select(&ctx).unwrap();
    assert_eq!(
        query.sql,
        "SELECT * FROM orders o1 WHERE ( o1.status = ? OR o1.status = ? ) AND o1.order_number > ?"
    );

    let conn = seeded_connection();
    let count = scalar(&conn, &build_count(&ctx).unwrap()).unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_open_delimiter_group_blocks_the_build() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ctx = schema.context("Order").unwrap();
    ctx.searcher("status")
        .unwrap()
        .ds()
        .unwrap()
        .eq("open".to_string())
        .unwrap();
    let err = build_select(&ctx).unwrap_err();
    assert!(matches!(err, SqlError::OpenDelimiters(1)));
}

#[test]
fn test_dynamic_join_between_two_schema_trees() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut orders = schema.context("Order").unwrap();
    let customers = schema.context("Customer").unwrap();

    let from = orders.find_searcher("customerId").unwrap();
    let to = customers.find_searcher("id").unwrap();
    let dyn_root = orders.join_tree(customers, None, None, from, to).unwrap();

    let region = orders.get_searcher_from(dyn_root, "region").unwrap();
    orders
        .searcher_by_id(region)
        .eq("eu".to_string())
        .unwrap();

    let query = build_select(&orders).unwrap();
    assert_eq!(
        query.sql,
        "SELECT * FROM orders o1 \
         INNER JOIN customers c3 ON o1.customer_id = c3.id \
         WHERE c3.region = ?"
    );

    let conn = seeded_connection();
    let count = scalar(&conn, &build_count(&orders).unwrap()).unwrap();
    assert_eq!(count, 2);
}
