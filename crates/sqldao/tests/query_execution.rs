mod common;

use common::Blog;
use sqldao::prelude::*;
use sqldao::{Assignment, QuerySet, SortOrder};

fn seeded() -> (Blog, common::MemoryDb) {
    let blog = Blog::new();
    let db = blog.db();
    for (title, status) in [("alpha", 0), ("beta", 1), ("gamma", 2), ("alphabet", 3)] {
        db.seed(
            "Post",
            &[("Title", Value::from(title)), ("Status", Value::Int(status))],
        );
    }
    (blog, db)
}

#[test]
fn scenario_greater_than_selects_matching_rows() {
    let (blog, db) = seeded();
    let mut statements = StatementBuilder::for_database(&db);
    let rows = statements
        .select(&blog.post)
        .where_filter(&Filter::col("Status").gt(1).unwrap())
        .go()
        .execute_get_data_table(&db)
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        db.statements()[0],
        "SELECT Id, Title, Status, AuthorId FROM Post WHERE Status > @P1"
    );
    assert!(statements.is_empty());
}

#[test]
fn combined_filters_number_ordinals_without_gaps() {
    let (blog, db) = seeded();
    let filter = Filter::col("Title").starts_with("alpha")
        & Filter::col("Status")
            .in_values([Value::Int(0), Value::Int(3)])
            .unwrap();
    let rendered = filter.render(1);
    assert_eq!(rendered.params.len(), 3);
    assert_eq!(rendered.next_ordinal, 4);
    assert_eq!(
        rendered.sql,
        "(Title LIKE @P1) AND (Status IN (@P2, @P3))"
    );

    let rows = StatementBuilder::for_database(&db)
        .select(&blog.post)
        .where_filter(&filter)
        .go()
        .execute_get_data_table(&db)
        .unwrap();
    let titles: Vec<String> = rows
        .iter()
        .filter_map(|r| r.get_by_name("Title").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(titles, vec!["alpha", "alphabet"]);
}

#[test]
fn empty_in_list_never_reaches_database() {
    let (_blog, db) = seeded();
    let err = Filter::col("Title").in_values(Vec::<Value>::new()).unwrap_err();
    assert!(err.is_malformed_filter());
    assert_eq!(db.statement_count(), 0);
}

#[test]
fn go_twice_sends_one_terminator() {
    let (blog, db) = seeded();
    let mut statements = StatementBuilder::for_database(&db);
    statements.select_count(blog.post.name()).go().go();
    assert!(statements.sql().ends_with("FROM Post ;\r\n"));
    assert!(!statements.sql().ends_with(";\r\n;\r\n"));
    let count = statements.execute_get_data_table(&db).unwrap();
    assert_eq!(count.first().and_then(|r| r.get(0)).and_then(Value::as_i64), Some(4));
}

#[test]
fn ordered_top_select() {
    let (blog, db) = seeded();
    let rows = StatementBuilder::for_database(&db)
        .select_top(1, &blog.post)
        .order_by("Status", SortOrder::Descending)
        .go()
        .execute_get_data_table(&db)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows.first().and_then(|r| r.get_by_name("Title")).and_then(Value::as_str),
        Some("alphabet")
    );
}

#[test]
fn failed_execution_still_resets_buffer() {
    let (blog, db) = seeded();
    db.fail_on("DELETE FROM Post");
    let mut statements = StatementBuilder::for_database(&db);
    statements
        .delete(blog.post.name())
        .where_filter(&Filter::col("Status").eq(0))
        .go();
    assert!(statements.execute(&db).is_err());
    assert!(statements.is_empty());
    assert_eq!(db.row_count("Post"), 4);
}

#[test]
fn query_set_binds_results_in_append_order() {
    let (blog, db) = seeded();
    let mut queries = QuerySet::for_database(&db);
    let inserted = queries.insert(
        blog.tag.name(),
        &[Assignment::new("Name", "rust")],
        blog.tag.key_column(),
    );
    let posts = queries.select(&blog.post, Some(&Filter::col("Status").lt(2).unwrap()));
    let tags = queries.count(blog.tag.name(), None);
    let results = queries.execute(&db).unwrap();

    assert_eq!(results.generated_key(inserted), Some(1));
    assert_eq!(results.rows(posts).map(RowSet::len), Some(2));
    assert_eq!(results.count(tags), Some(1));
    assert!(queries.is_empty());
}

#[test]
fn from_fields_filter_matches_rows() {
    let (blog, db) = seeded();
    let filter = Filter::from_fields(
        &blog.post,
        [("Title", Value::from("beta")), ("Status", Value::Int(1))],
    )
    .unwrap();
    let found = Entity::find_where(&DbCx::new(&db), &blog.post, &filter).unwrap();
    assert_eq!(found.len(), 1);

    let err = Filter::from_fields(&blog.post, [("Nope", Value::Int(1))]).unwrap_err();
    assert!(err.is_malformed_filter());
}
