//! Aggregation over groups of rows.
//!
//! Each edge maps a row to one key: the first matching domain partition
//! when the domain has partitions, otherwise the edge value. Every select
//! clause is then folded over each group with its registered accumulator.
use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::{
    compiler::{CompiledExpression, compile},
    error::Error,
    output::group_key,
    path::{set_path, split_field},
    query::{Edge, Grouping, Query, Select, SelectClause, ValidationError},
    value::Value,
    window::init_aggregate,
};

/// Result of the aggregation path.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregated {
    /// One row per group
    Rows(Vec<Value>),
    /// Ungrouped aggregate: a scalar for a single select, an object for a
    /// list select
    Single(Value),
}

struct CompiledEdge<'a> {
    edge: &'a Edge,
    value: Option<CompiledExpression>,
    domain_where: Option<CompiledExpression>,
    partitions: Vec<(Value, CompiledExpression)>,
}

impl<'a> CompiledEdge<'a> {
    fn new(edge: &'a Edge) -> Result<Self, Error> {
        Ok(CompiledEdge {
            edge,
            value: edge.value.as_ref().map(compile).transpose()?,
            domain_where: edge.domain.where_clause.as_ref().map(compile).transpose()?,
            partitions: edge
                .domain
                .partitions
                .iter()
                .map(|part| -> Result<_, Error> {
                    Ok((Value::String(part.name.clone()), compile(&part.where_clause)?))
                })
                .collect::<Result<_, _>>()?,
        })
    }

    /// The row's key on this edge; `None` drops the row.
    fn key(&self, row: &Value) -> Result<Option<Value>, Error> {
        let in_domain = match &self.domain_where {
            Some(test) => test.test(row)?,
            None => true,
        };

        let key = if !in_domain {
            Value::Null
        } else if !self.partitions.is_empty() {
            let mut found = Value::Null;
            for (name, test) in &self.partitions {
                if test.test(row)? {
                    found = name.clone();
                    break;
                }
            }
            found
        } else {
            match &self.value {
                Some(value) => value.eval(row)?,
                None => Value::Null,
            }
        };

        if key.is_null() && !self.edge.allow_nulls {
            return Ok(None);
        }
        Ok(Some(key))
    }
}

/// Group `rows` (already filtered by the query's `where`) and aggregate
/// each group.
pub fn aggregate(rows: &[Value], query: &Query) -> Result<Aggregated, Error> {
    let clauses = query.select().clauses();
    let values = clauses
        .iter()
        .map(|clause| compile(&clause.value))
        .collect::<Result<Vec<_>, _>>()?;

    let edges = query
        .grouping()
        .edges()
        .iter()
        .map(CompiledEdge::new)
        .collect::<Result<Vec<_>, _>>()?;

    if edges.is_empty() {
        let all: Vec<usize> = (0..rows.len()).collect();
        let results = fold(rows, &all, clauses, &values)?;
        return Ok(Aggregated::Single(match query.select() {
            Select::Single(_) => results.into_iter().next().unwrap_or(Value::Null),
            Select::List(_) => {
                let mut out = Value::Object(Default::default());
                for (clause, result) in clauses.iter().zip(results) {
                    set_path(&mut out, &split_field(&clause.name), result)?;
                }
                out
            }
        }));
    }

    let mut keys: Vec<Vec<Value>> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    let mut lookup: HashMap<String, usize> = HashMap::new();
    'rows: for (i, row) in rows.iter().enumerate() {
        let mut key = Vec::with_capacity(edges.len());
        for edge in &edges {
            match edge.key(row)? {
                Some(k) => key.push(k),
                None => continue 'rows,
            }
        }
        let id = group_key(&Value::Array(key.clone()));
        let slot = *lookup.entry(id).or_insert_with(|| {
            keys.push(key);
            members.push(Vec::new());
            keys.len() - 1
        });
        members[slot].push(i);
    }

    let order = group_order(query.grouping(), &edges, &keys);
    debug!(groups = order.len(), observed = keys.len(), "aggregating groups");

    let empty = Vec::new();
    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let rows_in_group = lookup
            .get(&group_key(&Value::Array(key.clone())))
            .map_or(&empty, |&slot| &members[slot]);
        let results = fold(rows, rows_in_group, clauses, &values)?;

        let mut row = Value::Object(Default::default());
        for (edge, k) in edges.iter().zip(key) {
            set_path(&mut row, &split_field(&edge.edge.name), k)?;
        }
        for (clause, result) in clauses.iter().zip(results) {
            set_path(&mut row, &split_field(&clause.name), result)?;
        }
        out.push(row);
    }
    Ok(Aggregated::Rows(out))
}

/// With `edges` whose domains all list partitions, every combination of
/// partitions is reported (empty ones included) in partition order, followed
/// by any observed combinations holding nulls. Otherwise only observed
/// groups are reported, ordered by key.
fn group_order(
    grouping: &Grouping,
    edges: &[CompiledEdge<'_>],
    observed: &[Vec<Value>],
) -> Vec<Vec<Value>> {
    let dense = matches!(grouping, Grouping::Edges(_)) && edges.iter().all(|e| !e.partitions.is_empty());
    if !dense {
        let mut keys = observed.to_vec();
        keys.sort_by(|a, b| compare_keys(a, b));
        return keys;
    }

    let mut product: Vec<Vec<Value>> = vec![Vec::new()];
    for edge in edges {
        product = product
            .into_iter()
            .flat_map(|prefix| {
                edge.partitions.iter().map(move |(name, _)| {
                    let mut key = prefix.clone();
                    key.push(name.clone());
                    key
                })
            })
            .collect();
    }

    let mut extra: Vec<Vec<Value>> = observed
        .iter()
        .filter(|key| key.iter().any(Value::is_null))
        .cloned()
        .collect();
    extra.sort_by(|a, b| compare_keys(a, b));
    product.extend(extra);
    product
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.sort_order(y))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn fold(
    rows: &[Value],
    members: &[usize],
    clauses: &[SelectClause],
    values: &[CompiledExpression],
) -> Result<Vec<Value>, Error> {
    clauses
        .iter()
        .zip(values)
        .map(|(clause, value)| -> Result<Value, Error> {
            let mut acc = init_aggregate(&clause.aggregate)
                .ok_or_else(|| ValidationError::UnknownAggregate(clause.aggregate.clone()))?;
            for &i in members {
                acc.add(&value.eval(&rows[i])?)?;
            }
            Ok(acc.end()?)
        })
        .collect()
}
