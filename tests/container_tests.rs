use std::sync::Arc;

use jx::query::{Format, SortClause, WindowSpec};
use jx::{Container, Error, ExecutionError, Expr, ListContainer, QueryOutput, UpdateCommand, Value, normalize, parse};
use serde_json::json;

fn container(rows: serde_json::Value) -> ListContainer {
    match Value::from(rows) {
        Value::Array(rows) => ListContainer::new("test", rows).unwrap(),
        other => panic!("expected an array of rows, got {}", other),
    }
}

fn bugs() -> ListContainer {
    container(json!([
        {"bug_id": 1, "product": "Firefox", "status": "open", "votes": 3},
        {"bug_id": 2, "product": "Core", "status": "closed", "votes": 1},
        {"bug_id": 3, "product": "Firefox", "status": "closed", "votes": 5},
        {"bug_id": 4, "product": "Core", "status": "open", "votes": 0},
        {"bug_id": 5, "product": "Firefox", "status": "open", "votes": 2}
    ]))
}

fn v(doc: serde_json::Value) -> Value {
    doc.into()
}

fn expr(spec: serde_json::Value) -> Expr {
    parse(&spec.into()).unwrap()
}

fn rows(output: QueryOutput) -> Vec<Value> {
    match output {
        QueryOutput::Container(c) => c.rows().to_vec(),
        QueryOutput::Value(value) => panic!("expected rows, got {}", value),
    }
}

fn query_rows(c: &ListContainer, raw: serde_json::Value) -> Vec<Value> {
    rows(c.query(&raw.into()).unwrap())
}

fn query_value(c: &ListContainer, raw: serde_json::Value) -> Value {
    match c.query(&raw.into()).unwrap() {
        QueryOutput::Value(value) => value,
        QueryOutput::Container(c) => panic!("expected a value, got {} rows", c.len()),
    }
}

fn window(spec: serde_json::Value, schema_of: &ListContainer) -> WindowSpec {
    let query = normalize(&json!({"window": spec}).into(), schema_of.schema()).unwrap();
    query.window()[0].clone()
}

#[test]
fn test_filter_scenario() {
    let c = container(json!([{"a": 1}, {"a": 2}, {"a": 3}]));
    let filtered = c.filter(&expr(json!({"gt": {"a": 1}}))).unwrap();
    assert_eq!(filtered.rows(), &[v(json!({"a": 2})), v(json!({"a": 3}))]);
    assert_eq!(c.len(), 3);
}

#[test]
fn test_filter_composes_like_and() {
    let c = bugs();
    let p1 = json!({"eq": {"status": "open"}});
    let p2 = json!({"gte": {"votes": 2}});

    let twice = c.filter(&expr(p1.clone())).unwrap().filter(&expr(p2.clone())).unwrap();
    let once = c.filter(&expr(json!({"and": [p1, p2]}))).unwrap();
    assert_eq!(twice.rows(), once.rows());
    assert_eq!(once.len(), 2);
}

#[test]
fn test_sort_descending_scenario() {
    let c = container(json!([{"x": 3}, {"x": 1}, {"x": 2}]));
    let sorted = c
        .sort(&[SortClause {
            value: Expr::variable("x"),
            sort: -1,
        }])
        .unwrap();
    assert_eq!(sorted.rows(), &[v(json!({"x": 3})), v(json!({"x": 2})), v(json!({"x": 1}))]);
}

#[test]
fn test_sort_is_stable() {
    let sorted = query_rows(&bugs(), json!({"sort": "product", "select": "bug_id"}));
    assert_eq!(sorted, vec![v(json!(2)), v(json!(4)), v(json!(1)), v(json!(3)), v(json!(5))]);
}

#[test]
fn test_multi_key_sort() {
    let sorted = query_rows(
        &bugs(),
        json!({"sort": ["product", {"value": "votes", "sort": -1}], "select": "bug_id"}),
    );
    assert_eq!(sorted, vec![v(json!(2)), v(json!(4)), v(json!(3)), v(json!(1)), v(json!(5))]);
}

#[test]
fn test_nulls_sort_last() {
    let c = container(json!([{"x": null}, {"x": 2}, {"x": 1}]));
    let sorted = query_rows(&c, json!({"sort": "x", "select": "x"}));
    assert_eq!(sorted, vec![v(json!(1)), v(json!(2)), Value::Null]);
}

#[test]
fn test_identity_select_shares_rows() {
    let c = bugs();
    let query = normalize(&json!({}).into(), c.schema()).unwrap();
    let selected = c.select(query.select()).unwrap();
    assert!(selected.shares_rows_with(&c));
    assert!(Arc::ptr_eq(selected.schema(), c.schema()));
}

#[test]
fn test_select_list_projects_objects() {
    let projected = query_rows(
        &bugs(),
        json!({
            "select": ["bug_id", {"name": "meta.hot", "value": {"gte": {"votes": 3}}}],
            "where": {"eq": {"product": "Firefox"}}
        }),
    );
    assert_eq!(
        projected,
        vec![
            v(json!({"bug_id": 1, "meta": {"hot": true}})),
            v(json!({"bug_id": 3, "meta": {"hot": true}})),
            v(json!({"bug_id": 5, "meta": {"hot": false}})),
        ]
    );
}

#[test]
fn test_limit_applies_before_select() {
    let c = container(json!((0..15).map(|i| json!({"i": i})).collect::<Vec<_>>()));
    assert_eq!(query_rows(&c, json!({"select": "i"})).len(), 15);
    assert_eq!(query_rows(&c, json!({"select": "i", "limit": 3})), vec![v(json!(0)), v(json!(1)), v(json!(2))]);
    assert_eq!(
        query_rows(&c, json!({"select": "i", "sort": {"value": "i", "sort": -1}, "limit": 2})),
        vec![v(json!(14)), v(json!(13))]
    );
}

#[test]
fn test_execution_error_on_scalar_rows() {
    let c = container(json!([{"a": "x"}]));
    let err = c.query(&json!({"select": "a.b"}).into()).unwrap_err();
    assert!(matches!(err, Error::Execution(ExecutionError::AccessError(_))));
}

#[test]
fn test_window_mutates_in_place() {
    let mut c = bugs();
    let spec = window(
        json!({"name": "total", "value": "votes", "aggregate": "sum", "edges": ["product"]}),
        &c,
    );
    c.window(&spec).unwrap();

    let totals: Vec<Value> = c.get("total").unwrap();
    assert_eq!(totals, vec![v(json!(10)), v(json!(1)), v(json!(10)), v(json!(1)), v(json!(10))]);
    assert!(c.schema().get("total").is_some());
}

#[test]
fn test_window_running_sum_in_partition() {
    let mut c = bugs();
    let spec = window(
        json!({
            "name": "running",
            "value": "votes",
            "aggregate": "sum",
            "edges": ["product"],
            "sort": "bug_id",
            "range": {"max": 1}
        }),
        &c,
    );
    c.window(&spec).unwrap();
    // Firefox: 3, 3+5, 3+5+2; Core: 1, 1+0
    assert_eq!(
        c.get("running").unwrap(),
        vec![v(json!(3)), v(json!(1)), v(json!(8)), v(json!(1)), v(json!(10))]
    );
}

#[test]
fn test_window_where_gives_null() {
    let mut c = bugs();
    let spec = window(
        json!({"name": "open_rank", "value": "bug_id", "aggregate": "count", "where": {"eq": {"status": "open"}}, "sort": "bug_id", "range": {"max": 1}}),
        &c,
    );
    c.window(&spec).unwrap();
    assert_eq!(
        c.get("open_rank").unwrap(),
        vec![v(json!(1)), Value::Null, Value::Null, v(json!(2)), v(json!(3))]
    );
}

#[test]
fn test_window_without_aggregate_is_calculated() {
    let mut c = bugs();
    let spec = window(json!({"name": "double", "value": {"mul": ["votes", 2]}}), &c);
    c.window(&spec).unwrap();
    assert_eq!(c.get("double").unwrap()[2], v(json!(10)));
}

#[test]
fn test_with_window_leaves_source_untouched() {
    let c = bugs();
    let spec = window(json!({"name": "n", "value": "votes", "aggregate": "count"}), &c);
    let windowed = c.with_window(&spec).unwrap();
    assert_eq!(windowed.get("n").unwrap()[0], v(json!(5)));
    assert_eq!(c.get("n").unwrap()[0], Value::Null);
    assert!(!windowed.shares_rows_with(&c));
}

#[test]
fn test_window_on_shared_rows_copies() {
    let c = bugs();
    let query = normalize(&json!({}).into(), c.schema()).unwrap();
    let mut shared = c.select(query.select()).unwrap();
    assert!(shared.shares_rows_with(&c));

    let spec = window(json!({"name": "n", "value": "votes", "aggregate": "count"}), &c);
    shared.window(&spec).unwrap();
    assert!(!shared.shares_rows_with(&c));
    assert!(c.schema().get("n").is_none());
}

#[test]
fn test_query_windows_run_after_select() {
    let result = query_rows(
        &bugs(),
        json!({
            "select": ["bug_id", "votes"],
            "where": {"eq": {"status": "open"}},
            "window": {"name": "share", "value": "votes", "aggregate": "max"}
        }),
    );
    assert_eq!(
        result,
        vec![
            v(json!({"bug_id": 1, "votes": 3, "share": 3})),
            v(json!({"bug_id": 4, "votes": 0, "share": 3})),
            v(json!({"bug_id": 5, "votes": 2, "share": 3})),
        ]
    );
}

#[test]
fn test_update_clears_then_sets() {
    let mut c = bugs();
    let command = UpdateCommand::from_value(
        &json!({"set": {"status": "verified", "meta.by": "qa"}, "clear": ["votes"], "where": {"eq": {"bug_id": 2}}})
            .into(),
    )
    .unwrap();
    c.update(&command).unwrap();

    assert_eq!(
        c.rows()[1],
        v(json!({"bug_id": 2, "product": "Core", "status": "verified", "votes": null, "meta": {"by": "qa"}}))
    );
    assert_eq!(c.rows()[0], bugs().rows()[0]);
    assert!(c.schema().get("meta.by").is_some());
}

#[test]
fn test_with_update_is_pure() {
    let c = bugs();
    let command = UpdateCommand::from_value(&json!({"set": {"votes": 100}}).into()).unwrap();
    let updated = c.with_update(&command).unwrap();
    assert!(updated.get("votes").unwrap().iter().all(|v| *v == Value::Integer(100)));
    assert_eq!(c.get("votes").unwrap()[0], Value::Integer(3));
}

#[test]
fn test_update_error_keeps_applied_rows() {
    let mut c = container(json!([{"a": 1}, {"c": 3}]));
    let command = UpdateCommand::from_value(&json!({"set": {"c.d": 2}}).into()).unwrap();
    assert!(c.update(&command).is_err());
    assert_eq!(c.rows()[0], v(json!({"a": 1, "c": {"d": 2}})));
}

#[test]
fn test_schema_follows_partial_update() {
    let mut c = container(json!([{"id": 1}, {"id": 2, "b": 5}]));
    let command = UpdateCommand::from_value(&json!({"set": {"new": 1, "b.c": 1}}).into()).unwrap();
    assert!(matches!(c.update(&command), Err(Error::Execution(ExecutionError::AccessError(_)))));

    assert_eq!(c.rows()[0], v(json!({"id": 1, "new": 1, "b": {"c": 1}})));
    assert!(c.schema().get("new").is_some());
    assert!(c.schema().get("b.c").is_some());
    assert_eq!(c.schema().leaf_names(), vec!["b.c", "id", "new"]);
}

#[test]
fn test_schema_follows_partial_window() {
    let mut c = container(json!([{"id": 1}, {"id": 2, "w": 5}]));
    let spec = window(json!({"name": "w.x", "value": "id"}), &c);
    assert!(c.window(&spec).is_err());
    assert!(c.schema().get("w.x").is_some());
}

#[test]
fn test_groups_match_equal_numbers() {
    let result = query_rows(&container(json!([{"k": 1}, {"k": 1.0}, {"k": 2}])), json!({"groupby": ["k"]}));
    assert_eq!(result, vec![v(json!({"k": 1, "count": 2})), v(json!({"k": 2, "count": 1}))]);
}

#[test]
fn test_groupby_counts() {
    let result = query_rows(&bugs(), json!({"groupby": ["product"]}));
    assert_eq!(
        result,
        vec![
            v(json!({"product": "Core", "count": 2})),
            v(json!({"product": "Firefox", "count": 3})),
        ]
    );
}

#[test]
fn test_groupby_multiple_aggregates() {
    let result = query_rows(
        &bugs(),
        json!({
            "groupby": ["product", "status"],
            "select": [
                {"name": "n", "aggregate": "count"},
                {"name": "votes", "value": "votes", "aggregate": "sum"},
                {"name": "top", "value": "votes", "aggregate": "max"}
            ],
            "sort": {"value": "votes", "sort": -1}
        }),
    );
    assert_eq!(
        result,
        vec![
            v(json!({"product": "Firefox", "status": "closed", "n": 1, "votes": 5, "top": 5})),
            v(json!({"product": "Firefox", "status": "open", "n": 2, "votes": 5, "top": 3})),
            v(json!({"product": "Core", "status": "closed", "n": 1, "votes": 1, "top": 1})),
            v(json!({"product": "Core", "status": "open", "n": 1, "votes": 0, "top": 0})),
        ]
    );
}

#[test]
fn test_edges_with_partitions_fill_the_domain() {
    let c = bugs();
    let result = query_rows(
        &c,
        json!({
            "edges": [{
                "name": "popularity",
                "domain": {"partitions": [
                    {"name": "hot", "where": {"gte": {"votes": 3}}},
                    {"name": "warm", "where": {"gte": {"votes": 1}}},
                    {"name": "huge", "where": {"gte": {"votes": 100}}}
                ]}
            }],
            "select": {"name": "bugs", "aggregate": "count"}
        }),
    );
    assert_eq!(
        result,
        vec![
            v(json!({"popularity": "hot", "bugs": 2})),
            v(json!({"popularity": "warm", "bugs": 2})),
            v(json!({"popularity": "huge", "bugs": 0})),
            v(json!({"popularity": null, "bugs": 1})),
        ]
    );
}

#[test]
fn test_edges_disallowing_nulls_drop_rows() {
    let result = query_rows(
        &bugs(),
        json!({
            "edges": [{
                "name": "popularity",
                "allowNulls": false,
                "domain": {"partitions": [{"name": "hot", "where": {"gte": {"votes": 3}}}]}
            }],
            "select": {"name": "votes", "value": "votes", "aggregate": "sum"}
        }),
    );
    assert_eq!(result, vec![v(json!({"popularity": "hot", "votes": 8}))]);
}

#[test]
fn test_edge_domain_where_restricts_membership() {
    let result = query_rows(
        &bugs(),
        json!({
            "edges": [{"name": "product", "value": "product", "allowNulls": false, "domain": {"where": {"eq": {"status": "open"}}}}]
        }),
    );
    assert_eq!(
        result,
        vec![
            v(json!({"product": "Core", "count": 1})),
            v(json!({"product": "Firefox", "count": 2})),
        ]
    );
}

#[test]
fn test_ungrouped_aggregates() {
    let c = bugs();
    assert_eq!(
        query_value(&c, json!({"select": {"value": "votes", "aggregate": "sum"}, "where": {"eq": {"status": "open"}}})),
        v(json!(5))
    );
    assert_eq!(
        query_value(
            &c,
            json!({"select": [{"name": "n", "aggregate": "count"}, {"name": "avg", "value": "votes", "aggregate": "avg"}]})
        ),
        v(json!({"n": 5, "avg": 2.2}))
    );

    let stats = query_value(&c, json!({"select": {"value": "votes", "aggregate": "stats"}}));
    assert_eq!(stats.as_object().unwrap().get("count"), Some(&Value::Integer(5)));
}

#[test]
fn test_grouped_output_is_limited() {
    let c = container(json!((0..30).map(|i| json!({"k": i})).collect::<Vec<_>>()));
    assert_eq!(query_rows(&c, json!({"groupby": ["k"]})).len(), 30);
    assert_eq!(query_rows(&c, json!({"groupby": ["k"], "limit": 12})).len(), 12);
}

#[test]
fn test_windows_see_every_row_without_limit() {
    let c = container(json!((0..12).map(|i| json!({"a": i})).collect::<Vec<_>>()));
    let result = query_rows(&c, json!({"window": [{"name": "n", "value": "a", "aggregate": "count"}]}));
    assert_eq!(result.len(), 12);
    assert!(result.iter().all(|row| row.as_object().and_then(|o| o.get("n")) == Some(&Value::Integer(12))));
}

#[test]
fn test_format_table() {
    let c = container(json!([{"a": 1, "b": {"c": "x"}}, {"a": 2}]));
    assert_eq!(
        c.format(Format::Table).unwrap(),
        v(json!({
            "meta": {"format": "table"},
            "header": ["a", "b.c"],
            "data": [[1, "x"], [2, null]]
        }))
    );
}

#[test]
fn test_format_cube() {
    let c = container(json!([{"a": 1}, {"a": 2}]));
    assert_eq!(
        c.format(Format::Cube).unwrap(),
        v(json!({
            "meta": {"format": "cube"},
            "edges": [{"name": "rownum", "domain": {"type": "rownum", "min": 0, "max": 2, "interval": 1}}],
            "data": {"a": [1, 2]}
        }))
    );
}

#[test]
fn test_format_list_and_query_format() {
    let c = container(json!([{"a": 1}]));
    assert_eq!(c.to_value(), v(json!({"meta": {"format": "list"}, "data": [{"a": 1}]})));
    assert_eq!(c.format(Format::List).unwrap(), c.to_value());

    let table = query_value(&c, json!({"select": "a", "format": "table"}));
    assert_eq!(table, v(json!({"meta": {"format": "table"}, "header": ["."], "data": [[1]]})));
}

#[test]
fn test_validation_aborts_before_rows_are_touched() {
    let c = container(json!([{"a": "x"}]));
    let err = c.query(&json!({"select": "a.b", "limit": -1}).into()).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_extend_and_add_widen_schema() {
    let mut c = container(json!([{"a": 1}]));
    c.extend(vec![v(json!({"a": 2.5})), v(json!({"b": "x"}))]).unwrap();
    c.add(v(json!({"a": 3}))).unwrap();
    assert_eq!(c.len(), 4);
    assert_eq!(c.schema().get("a").unwrap().json_type, jx::JsonType::Double);
    assert!(c.schema().get("b").is_some());

    let err = c.add(v(json!({"b": {"c": 1}}))).unwrap_err();
    assert!(matches!(err, Error::SchemaConflict(_)));
    assert_eq!(c.len(), 4);
}

#[test]
fn test_get_and_iteration() {
    let c = bugs();
    assert_eq!(c.get("bug_id").unwrap(), (1..=5).map(Value::Integer).collect::<Vec<_>>());
    assert_eq!(c.iter().count(), 5);
    assert_eq!((&c).into_iter().filter(|row| row.as_object().is_some()).count(), 5);
    assert_eq!(c.name(), "test");
    assert!(!c.is_empty());
}

#[test]
fn test_concurrent_readers() {
    let c = Arc::new(bugs());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let c = Arc::clone(&c);
            std::thread::spawn(move || {
                let filtered = c.filter(&expr(json!({"gt": {"votes": i}}))).unwrap();
                filtered.len()
            })
        })
        .collect();
    let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counts, vec![4, 3, 2, 1]);
}

#[test]
fn test_locker_is_available_to_callers() {
    let c = bugs();
    let guard = c.locker().try_lock();
    assert!(guard.is_some());
}
