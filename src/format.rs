//! Output shapes for query results.
//!
//! ```text
//! list   {"meta": {"format": "list"},  "data": [row, ...]}
//! table  {"meta": {"format": "table"}, "header": [col, ...], "data": [[v, ...], ...]}
//! cube   {"meta": {"format": "cube"},  "edges": [rownum], "data": {col: [v, ...]}}
//! ```
use crate::{
    compiler::ExecutionError,
    path::{get_path, split_field},
    value::Value,
};

fn meta(format: &str) -> Value {
    Value::object([("format", Value::from(format))])
}

pub fn rows_to_list(rows: &[Value]) -> Value {
    Value::object([("meta", meta("list")), ("data", Value::Array(rows.to_vec()))])
}

pub fn rows_to_table(rows: &[Value], columns: &[String]) -> Result<Value, ExecutionError> {
    let paths: Vec<_> = columns.iter().map(|c| split_field(c)).collect();
    let data = rows
        .iter()
        .map(|row| {
            paths
                .iter()
                .map(|path| get_path(row, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Value::object([
        ("meta", meta("table")),
        ("header", Value::Array(columns.iter().map(|c| Value::from(c.as_str())).collect())),
        ("data", Value::Array(data)),
    ]))
}

/// Column-major layout along a single `rownum` edge.
pub fn rows_to_cube(rows: &[Value], columns: &[String]) -> Result<Value, ExecutionError> {
    let mut data = std::collections::BTreeMap::new();
    for column in columns {
        let path = split_field(column);
        let values = rows
            .iter()
            .map(|row| get_path(row, &path))
            .collect::<Result<Vec<_>, _>>()?;
        data.insert(column.clone(), Value::Array(values));
    }

    let rownum = Value::object([
        ("name", Value::from("rownum")),
        (
            "domain",
            Value::object([
                ("type", Value::from("rownum")),
                ("min", Value::Integer(0)),
                ("max", Value::Integer(rows.len() as i64)),
                ("interval", Value::Integer(1)),
            ]),
        ),
    ]);

    Ok(Value::object([
        ("meta", meta("cube")),
        ("edges", Value::Array(vec![rownum])),
        ("data", Value::Object(data)),
    ]))
}
