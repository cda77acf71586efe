use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::{
    ast::Expr,
    compiler::{compile, get_all_vars},
    error::Error,
    parser::parse,
    query::{
        Domain, Edge, Format, Grouping, Partition, Query, Range, Select, SelectClause,
        SortClause, ValidationError, WindowSpec,
    },
    schema::Schema,
    value::Value,
    window::is_aggregate,
};

const CLAUSES: &[&str] = &[
    "from", "select", "edges", "groupby", "where", "sort", "window", "limit", "format",
];

/// Validate a raw query against `schema` and produce its canonical form.
///
/// Every expression is parsed and compiled here, so a query that normalizes
/// can only fail at execution time on row data.
///
/// ```
/// use std::sync::Arc;
/// use jx::{normalize, Schema, Value, DEFAULT_LIMIT};
///
/// let schema = Arc::new(Schema::new());
/// let query = normalize(&serde_json::json!({"from": "bugs"}).into(), &schema).unwrap();
/// assert!(query.select().is_identity());
/// assert_eq!(query.limit(), DEFAULT_LIMIT);
/// ```
pub fn normalize(raw: &Value, schema: &Arc<Schema>) -> Result<Query, Error> {
    let Value::Object(map) = raw else {
        return Err(ValidationError::clause(
            "query",
            format!("expecting an object, got {}", raw.type_name()),
        )
        .into());
    };

    for key in map.keys().filter(|k| !CLAUSES.contains(&k.as_str())) {
        debug!(clause = %key, "ignoring unrecognized query clause");
    }

    let grouping = match (present(map, "edges"), present(map, "groupby")) {
        (Some(_), Some(_)) => return Err(ValidationError::BothEdgesAndGroupby.into()),
        (Some(edges), None) => Grouping::Edges(
            listwrap(Some(edges))
                .into_iter()
                .map(|e| normalize_edge(e, "edges", true))
                .collect::<Result<_, _>>()?,
        ),
        (None, Some(groupby)) => Grouping::GroupBy(
            listwrap(Some(groupby))
                .into_iter()
                .map(|e| normalize_edge(e, "groupby", false))
                .collect::<Result<_, _>>()?,
        ),
        (None, None) => Grouping::None,
    };

    let select = match present(map, "select") {
        Some(Value::Array(items)) if !items.is_empty() => Select::List(
            items
                .iter()
                .map(normalize_select)
                .collect::<Result<_, _>>()?,
        ),
        Some(Value::Array(_)) | None => default_select(&grouping),
        Some(single) => Select::Single(normalize_select(single)?),
    };

    let aggregating = grouping.is_grouped() || select.clauses().iter().any(SelectClause::is_aggregate);
    if aggregating && let Some(plain) = select.clauses().iter().find(|c| !c.is_aggregate()) {
        return Err(ValidationError::clause(
            "select",
            format!("'{}' needs an aggregate when the query aggregates", plain.name),
        )
        .into());
    }

    let where_clause = normalize_where(map.get("where"))?;

    let window = listwrap(map.get("window"))
        .into_iter()
        .map(normalize_window)
        .collect::<Result<Vec<_>, _>>()?;

    let sort = normalize_sort(map.get("sort"))?;

    let limit = match present(map, "limit") {
        None => None,
        Some(limit) => match limit.as_int() {
            Some(n) if n >= 0 => Some(n as usize),
            _ => return Err(ValidationError::InvalidLimit(limit.to_string()).into()),
        },
    };

    let format = match present(map, "format") {
        None => Format::List,
        Some(Value::String(name)) => {
            Format::from_name(name).ok_or_else(|| ValidationError::UnknownFormat(name.clone()))?
        }
        Some(other) => return Err(ValidationError::UnknownFormat(other.to_string()).into()),
    };

    let from = match present(map, "from") {
        None => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(other) => {
            return Err(ValidationError::clause(
                "from",
                format!("expecting a container name, got {}", other.type_name()),
            )
            .into());
        }
    };

    let query = Query {
        from,
        select,
        grouping,
        where_clause,
        sort,
        window,
        limit,
        format,
        schema: Arc::clone(schema),
    };

    check_depth(&query)?;
    compile_all(&query)?;

    debug!(
        from = query.from().unwrap_or("-"),
        columns = query.select().clauses().len(),
        aggregate = query.is_aggregate(),
        limit = query.limit(),
        "normalized query"
    );
    Ok(query)
}

fn present<'a>(map: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

/// Null and absent become no items, an array its elements, anything else
/// a single item.
pub(crate) fn listwrap(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

fn default_select(grouping: &Grouping) -> Select {
    if grouping.is_grouped() {
        Select::Single(SelectClause {
            name: "count".to_string(),
            value: Expr::variable("."),
            aggregate: "count".to_string(),
        })
    } else {
        Select::Single(SelectClause {
            name: "__all__".to_string(),
            value: Expr::variable("."),
            aggregate: "none".to_string(),
        })
    }
}

fn normalize_select(spec: &Value) -> Result<SelectClause, Error> {
    match spec {
        Value::String(name) => Ok(SelectClause {
            name: name.clone(),
            value: parse(spec)?,
            aggregate: "none".to_string(),
        }),
        Value::Object(map) => {
            let aggregate = match present(map, "aggregate") {
                None => "none".to_string(),
                Some(Value::String(name)) if name == "none" || is_aggregate(name) => name.clone(),
                Some(Value::String(name)) => {
                    return Err(ValidationError::UnknownAggregate(name.clone()).into());
                }
                Some(other) => return Err(ValidationError::UnknownAggregate(other.to_string()).into()),
            };

            let value = match present(map, "value") {
                Some(value) => parse(value)?,
                None if aggregate == "count" => Expr::variable("."),
                None => {
                    return Err(ValidationError::clause("select", "expecting a `value`").into());
                }
            };

            let name = match (present(map, "name"), present(map, "value")) {
                (Some(Value::String(name)), _) => name.clone(),
                (None, Some(Value::String(value))) => value.clone(),
                (None, _) if aggregate != "none" => aggregate.clone(),
                _ => {
                    return Err(ValidationError::clause("select", "expecting a string `name`").into());
                }
            };

            Ok(SelectClause {
                name,
                value,
                aggregate,
            })
        }
        other => Err(ValidationError::clause(
            "select",
            format!("expecting a field name or an object, got {}", other.type_name()),
        )
        .into()),
    }
}

fn normalize_edge(spec: &Value, clause: &str, allow_partitions: bool) -> Result<Edge, Error> {
    match spec {
        Value::String(name) => Ok(Edge {
            name: name.clone(),
            value: Some(parse(spec)?),
            domain: Domain::default(),
            allow_nulls: true,
        }),
        Value::Object(map) => {
            let value = present(map, "value").map(parse).transpose()?;
            let domain = match present(map, "domain") {
                None => Domain::default(),
                Some(Value::Object(domain)) => normalize_domain(domain, clause)?,
                Some(other) => {
                    return Err(ValidationError::clause(
                        clause,
                        format!("expecting a domain object, got {}", other.type_name()),
                    )
                    .into());
                }
            };
            if !domain.partitions.is_empty() && !allow_partitions {
                return Err(ValidationError::clause(clause, "domains with partitions need `edges`").into());
            }
            if value.is_none() && domain.partitions.is_empty() {
                return Err(ValidationError::clause(clause, "expecting a `value` or domain partitions").into());
            }

            let name = match (present(map, "name"), present(map, "value")) {
                (Some(Value::String(name)), _) => name.clone(),
                (None, Some(Value::String(value))) => value.clone(),
                _ => return Err(ValidationError::clause(clause, "expecting a string `name`").into()),
            };

            let allow_nulls = match present(map, "allowNulls") {
                None => true,
                Some(Value::Boolean(b)) => *b,
                Some(_) => return Err(ValidationError::clause(clause, "allowNulls must be a boolean").into()),
            };

            Ok(Edge {
                name,
                value,
                domain,
                allow_nulls,
            })
        }
        other => Err(ValidationError::clause(
            clause,
            format!("expecting a field name or an object, got {}", other.type_name()),
        )
        .into()),
    }
}

fn normalize_domain(domain: &BTreeMap<String, Value>, clause: &str) -> Result<Domain, Error> {
    let key = match present(domain, "key") {
        None => None,
        Some(Value::String(key)) => Some(key.clone()),
        Some(_) => return Err(ValidationError::clause(clause, "domain key must be a field name").into()),
    };
    let where_clause = present(domain, "where").map(parse).transpose()?;

    let mut partitions = Vec::new();
    for part in listwrap(domain.get("partitions")) {
        let Value::Object(part) = part else {
            return Err(ValidationError::clause(clause, "partitions must be objects").into());
        };
        let Some(Value::String(name)) = present(part, "name") else {
            return Err(ValidationError::clause(clause, "every partition needs a string `name`").into());
        };
        let Some(test) = present(part, "where") else {
            return Err(ValidationError::clause(
                clause,
                format!("partition '{}' needs a `where`", name),
            )
            .into());
        };
        partitions.push(Partition {
            name: name.clone(),
            where_clause: parse(test)?,
        });
    }

    Ok(Domain {
        key,
        where_clause,
        partitions,
    })
}

fn normalize_where(spec: Option<&Value>) -> Result<Expr, Error> {
    match spec {
        None | Some(Value::Null) => Ok(Expr::always_true()),
        Some(spec) => Ok(parse(spec)?),
    }
}

fn normalize_sort(spec: Option<&Value>) -> Result<Vec<SortClause>, Error> {
    listwrap(spec)
        .into_iter()
        .map(|clause| match clause {
            Value::String(_) => Ok(SortClause {
                value: parse(clause)?,
                sort: 1,
            }),
            Value::Object(map) => {
                let Some(value) = present(map, "value").or_else(|| present(map, "field")) else {
                    return Err(ValidationError::clause("sort", "expecting a `value`").into());
                };
                let sort = match present(map, "sort") {
                    None => 1,
                    Some(Value::String(dir)) if dir == "asc" => 1,
                    Some(Value::String(dir)) if dir == "desc" => -1,
                    Some(dir) => match dir.as_int() {
                        Some(n) if n >= 0 => 1,
                        Some(_) => -1,
                        None => {
                            return Err(ValidationError::clause(
                                "sort",
                                format!("unknown direction {}", dir),
                            )
                            .into());
                        }
                    },
                };
                Ok(SortClause {
                    value: parse(value)?,
                    sort,
                })
            }
            other => Err(ValidationError::clause(
                "sort",
                format!("expecting a field name or an object, got {}", other.type_name()),
            )
            .into()),
        })
        .collect()
}

fn normalize_window(spec: &Value) -> Result<WindowSpec, Error> {
    let Value::Object(map) = spec else {
        return Err(ValidationError::clause(
            "window",
            format!("expecting an object, got {}", spec.type_name()),
        )
        .into());
    };

    let Some(value_spec) = present(map, "value") else {
        return Err(ValidationError::clause("window", "expecting a `value`").into());
    };
    let name = match (present(map, "name"), value_spec) {
        (Some(Value::String(name)), _) => name.clone(),
        (None, Value::String(value)) => value.clone(),
        _ => return Err(ValidationError::clause("window", "expecting a string `name`").into()),
    };

    let aggregate = match present(map, "aggregate") {
        None => None,
        Some(Value::String(name)) if name == "none" => None,
        Some(Value::String(name)) if is_aggregate(name) => Some(name.clone()),
        Some(other) => {
            let name = other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string());
            return Err(ValidationError::UnknownAggregate(name).into());
        }
    };

    let range = match present(map, "range").or_else(|| present(map, "frame")) {
        None => None,
        Some(Value::Object(bounds)) => {
            let bound = |key: &str| -> Result<Option<i64>, Error> {
                match present(bounds, key) {
                    None => Ok(None),
                    Some(v) => v.as_int().map(Some).ok_or_else(|| {
                        ValidationError::clause("window", format!("range {} must be an integer", key)).into()
                    }),
                }
            };
            let range = Range {
                min: bound("min")?,
                max: bound("max")?,
            };
            if let (Some(min), Some(max)) = (range.min, range.max)
                && min > max
            {
                return Err(ValidationError::InvalidRange { min, max }.into());
            }
            Some(range)
        }
        Some(_) => return Err(ValidationError::clause("window", "range must be {min, max}").into()),
    };

    Ok(WindowSpec {
        name,
        value: parse(value_spec)?,
        edges: listwrap(map.get("edges"))
            .into_iter()
            .map(|e| normalize_edge(e, "window", true))
            .collect::<Result<_, _>>()?,
        sort: normalize_sort(map.get("sort"))?,
        aggregate,
        range,
        where_clause: normalize_where(map.get("where"))?,
    })
}

/// Select and grouping variables must be reachable from the row root; a
/// column under a nested array is not.
fn check_depth(query: &Query) -> Result<(), Error> {
    let mut vars = Vec::new();
    for clause in query.select().clauses() {
        vars.extend(get_all_vars(&clause.value));
    }
    for edge in query.grouping().edges() {
        if let Some(value) = &edge.value {
            vars.extend(get_all_vars(value));
        }
        vars.extend(edge.domain.key.iter().cloned());
        if let Some(test) = &edge.domain.where_clause {
            vars.extend(get_all_vars(test));
        }
        for part in &edge.domain.partitions {
            vars.extend(get_all_vars(&part.where_clause));
        }
    }

    let schema = query.schema();
    match vars
        .into_iter()
        .find(|var| schema.get(var).is_some_and(|column| column.depth() > 0))
    {
        Some(var) => Err(ValidationError::TooDeep { var }.into()),
        None => Ok(()),
    }
}

/// Warm the compiler cache and surface pattern errors before execution.
fn compile_all(query: &Query) -> Result<(), Error> {
    compile(query.where_clause())?;
    for clause in query.select().clauses() {
        compile(&clause.value)?;
    }
    for edge in query.grouping().edges() {
        compile_edge(edge)?;
    }
    for sort in query.sort() {
        compile(&sort.value)?;
    }
    for window in query.window() {
        compile(&window.value)?;
        compile(&window.where_clause)?;
        for edge in &window.edges {
            compile_edge(edge)?;
        }
        for sort in &window.sort {
            compile(&sort.value)?;
        }
    }
    Ok(())
}

fn compile_edge(edge: &Edge) -> Result<(), Error> {
    if let Some(value) = &edge.value {
        compile(value)?;
    }
    if let Some(test) = &edge.domain.where_clause {
        compile(test)?;
    }
    for part in &edge.domain.partitions {
        compile(&part.where_clause)?;
    }
    Ok(())
}
