use std::sync::Arc;

use jx::query::{Format, Grouping, Range, Select};
use jx::{DEFAULT_LIMIT, Error, Expr, Query, Schema, UpdateCommand, ValidationError, Value, normalize};
use serde_json::json;

fn schema(rows: serde_json::Value) -> Arc<Schema> {
    let rows = match Value::from(rows) {
        Value::Array(rows) => rows,
        other => vec![other],
    };
    Arc::new(Schema::infer(&rows).unwrap())
}

fn bugs() -> Arc<Schema> {
    schema(json!([
        {"bug_id": 1, "status": "open", "votes": 3, "attachments": [{"id": 10, "size": 5}]},
        {"bug_id": 2, "status": "closed", "votes": 1}
    ]))
}

fn norm(raw: serde_json::Value) -> Result<Query, Error> {
    normalize(&raw.into(), &bugs())
}

fn validation_error(raw: serde_json::Value) -> ValidationError {
    match norm(raw) {
        Err(Error::Validation(e)) => e,
        other => panic!("expected a validation error, got {:?}", other),
    }
}

#[test]
fn test_defaults() {
    let query = norm(json!({"from": "bugs"})).unwrap();
    assert_eq!(query.from(), Some("bugs"));
    assert!(query.select().is_identity());
    assert_eq!(query.select().clauses()[0].name, "__all__");
    assert!(query.where_clause().is_always_true());
    assert!(query.sort().is_empty());
    assert!(query.window().is_empty());
    assert_eq!(query.limit(), DEFAULT_LIMIT);
    assert_eq!(query.format(), Format::List);
    assert!(!query.is_aggregate());
}

#[test]
fn test_grouping_defaults_to_count() {
    let query = norm(json!({"groupby": ["status"]})).unwrap();
    let clause = &query.select().clauses()[0];
    assert_eq!(clause.aggregate, "count");
    assert_eq!(clause.name, "count");
    assert!(query.is_aggregate());
    assert_eq!(query.groupby().unwrap()[0].name, "status");
    assert!(query.edges().is_none());
}

#[test]
fn test_edges_and_groupby_are_exclusive() {
    assert_eq!(
        validation_error(json!({"edges": ["status"], "groupby": ["status"]})),
        ValidationError::BothEdgesAndGroupby
    );
}

#[test]
fn test_limit_validation() {
    assert!(matches!(validation_error(json!({"limit": -1})), ValidationError::InvalidLimit(_)));
    assert!(matches!(validation_error(json!({"limit": 1.5})), ValidationError::InvalidLimit(_)));
    assert!(matches!(validation_error(json!({"limit": "ten"})), ValidationError::InvalidLimit(_)));
    assert_eq!(norm(json!({"limit": 0})).unwrap().limit(), 0);
    assert_eq!(norm(json!({"limit": 25.0})).unwrap().limit(), 25);
    assert_eq!(norm(json!({"limit": null})).unwrap().limit(), DEFAULT_LIMIT);
    assert_eq!(norm(json!({})).unwrap().explicit_limit(), None);
    assert_eq!(norm(json!({"limit": 7})).unwrap().explicit_limit(), Some(7));
}

#[test]
fn test_select_forms() {
    let query = norm(json!({"select": "status"})).unwrap();
    assert!(matches!(query.select(), Select::Single(c) if c.name == "status" && c.value == Expr::variable("status")));

    let query = norm(json!({"select": ["bug_id", {"name": "v", "value": "votes"}]})).unwrap();
    let names: Vec<&str> = query.select().clauses().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["bug_id", "v"]);

    let query = norm(json!({"select": "*"})).unwrap();
    assert!(query.select().is_identity());
}

#[test]
fn test_aggregate_select_names() {
    let query = norm(json!({"select": [{"value": "votes", "aggregate": "sum"}, {"aggregate": "count"}]})).unwrap();
    let names: Vec<&str> = query.select().clauses().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["votes", "count"]);
    assert!(query.is_aggregate());
}

#[test]
fn test_unknown_aggregate() {
    assert_eq!(
        validation_error(json!({"select": {"value": "votes", "aggregate": "median"}})),
        ValidationError::UnknownAggregate("median".to_string())
    );
}

#[test]
fn test_grouping_requires_aggregates() {
    assert!(matches!(
        validation_error(json!({"select": ["status"], "groupby": ["status"]})),
        ValidationError::InvalidClause { .. }
    ));
}

#[test]
fn test_sort_forms() {
    let query = norm(json!({"sort": ["status", {"value": "votes", "sort": -1}, {"field": "bug_id", "sort": "desc"}]}))
        .unwrap();
    let directions: Vec<i8> = query.sort().iter().map(|s| s.sort).collect();
    assert_eq!(directions, vec![1, -1, -1]);
    assert_eq!(query.sort()[2].value, Expr::variable("bug_id"));

    let query = norm(json!({"sort": {"value": "votes"}})).unwrap();
    assert_eq!(query.sort().len(), 1);
    assert_eq!(query.sort()[0].sort, 1);
}

#[test]
fn test_window_normalization() {
    let query = norm(json!({
        "window": {"name": "running", "value": "votes", "aggregate": "sum", "sort": "bug_id", "range": {"min": -2, "max": 1}}
    }))
    .unwrap();
    let window = &query.window()[0];
    assert_eq!(window.name, "running");
    assert_eq!(window.aggregate.as_deref(), Some("sum"));
    assert_eq!(window.range, Some(Range { min: Some(-2), max: Some(1) }));
    assert_eq!(window.sort.len(), 1);
    assert!(window.where_clause.is_always_true());
}

#[test]
fn test_window_range_must_be_ordered() {
    assert_eq!(
        validation_error(json!({"window": {"name": "w", "value": "votes", "aggregate": "sum", "frame": {"min": 2, "max": 1}}})),
        ValidationError::InvalidRange { min: 2, max: 1 }
    );
}

#[test]
fn test_depth_guard_rejects_nested_columns() {
    assert_eq!(
        validation_error(json!({"select": "attachments.size"})),
        ValidationError::TooDeep {
            var: "attachments.size".to_string()
        }
    );
    assert!(matches!(
        validation_error(json!({"groupby": ["attachments.id"]})),
        ValidationError::TooDeep { .. }
    ));
}

#[test]
fn test_depth_guard_ignores_where() {
    let query = norm(json!({"where": {"eq": {"attachments.id": 10}}})).unwrap();
    assert!(!query.where_clause().is_always_true());
}

#[test]
fn test_depth_guard_allows_the_array_itself() {
    assert!(norm(json!({"select": "attachments"})).is_ok());
}

#[test]
fn test_format() {
    assert_eq!(norm(json!({"format": "table"})).unwrap().format(), Format::Table);
    assert_eq!(norm(json!({"format": "cube"})).unwrap().format(), Format::Cube);
    assert_eq!(
        validation_error(json!({"format": "csv"})),
        ValidationError::UnknownFormat("csv".to_string())
    );
}

#[test]
fn test_edges_with_partitions() {
    let query = norm(json!({
        "edges": [{
            "name": "popularity",
            "domain": {"partitions": [
                {"name": "hot", "where": {"gte": {"votes": 3}}},
                {"name": "cold", "where": {"lt": {"votes": 3}}}
            ]},
            "allowNulls": false
        }]
    }))
    .unwrap();
    let edge = &query.edges().unwrap()[0];
    assert_eq!(edge.name, "popularity");
    assert!(edge.value.is_none());
    assert!(!edge.allow_nulls);
    assert_eq!(edge.domain.partitions.len(), 2);
    assert!(matches!(query.grouping(), Grouping::Edges(_)));
}

#[test]
fn test_groupby_rejects_partitions() {
    assert!(matches!(
        validation_error(json!({
            "groupby": [{"name": "p", "domain": {"partitions": [{"name": "a", "where": true}]}}]
        })),
        ValidationError::InvalidClause { .. }
    ));
}

#[test]
fn test_compilation_errors_surface_at_normalization() {
    let result = norm(json!({"where": {"regex": {"status": "("}}}));
    assert!(matches!(result, Err(Error::Compilation(_))));

    let result = norm(json!({"where": {"bogus": 1}}));
    assert!(matches!(result, Err(Error::Compilation(_))));
}

#[test]
fn test_unknown_keys_are_ignored() {
    assert!(norm(json!({"select": "bug_id", "explain": true})).is_ok());
}

#[test]
fn test_query_must_be_object() {
    assert!(matches!(validation_error(json!(["select"])), ValidationError::InvalidClause { .. }));
}

#[test]
fn test_copy_is_equal_and_shares_schema() {
    let query = norm(json!({"select": "bug_id", "sort": "votes", "limit": 3})).unwrap();
    let copy = query.copy();
    assert_eq!(copy, query);
    assert!(Arc::ptr_eq(copy.schema(), query.schema()));
}

#[test]
fn test_update_command() {
    let command = UpdateCommand::from_value(
        &json!({"set": {"status": "closed"}, "clear": "votes", "where": {"eq": {"bug_id": 1}}}).into(),
    )
    .unwrap();
    assert_eq!(command.set, vec![("status".to_string(), Value::from("closed"))]);
    assert_eq!(command.clear, vec!["votes".to_string()]);
    assert!(!command.where_clause.is_always_true());

    assert!(UpdateCommand::from_value(&json!({"set": 3}).into()).is_err());
}
