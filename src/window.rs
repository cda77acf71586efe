//! # Window functions
//!
//! A window computes one new field per row. Rows are partitioned by the
//! window's edges, ordered by its sort, and each row receives the aggregate
//! over a frame `[i + min, i + max)` of its partition, clamped to the
//! partition bounds. Frames slide: every step adds the rows entering the
//! frame and removes the rows leaving it, so any [`Accumulator`] that can
//! `remove` works with any range.
//!
//! - **[accumulator]** - the accumulator trait and the aggregate registry
//! - **[simple]** - count, sum, avg
//! - **[multiset]** - min, max over a counted bag
//! - **[stats]** - moments for the `stats` aggregate
pub mod accumulator;
pub mod multiset;
pub mod simple;
pub mod stats;

use std::collections::HashMap;

use tracing::trace;

pub use accumulator::{
    Accumulator, AccumulatorFactory, AggregateRegistry, aggregate_names, init_aggregate, is_aggregate,
    register_aggregate,
};
pub use multiset::{Max, Min, Multiset};
pub use simple::{Average, Count, Sum};
pub use stats::{Stats, Summary, ZMoment};

use crate::{
    compiler::{CompiledExpression, ExecutionError, compile},
    error::Error,
    output::group_key,
    path::{set_path, split_field},
    query::{Edge, Range, SortClause, ValidationError, WindowSpec},
    value::Value,
};

/// Aggregate `values` over a sliding frame, one result per position.
///
/// With no range the frame is the whole slice.
///
/// ```
/// use jx::{window::slide, query::Range, Value};
///
/// let values: Vec<Value> = [1, 2, 3, 4].into_iter().map(Value::Integer).collect();
/// let trailing = Range { min: Some(-1), max: Some(1) };
/// let sums = slide(&values, "sum", Some(trailing)).unwrap();
/// assert_eq!(sums, [1, 3, 5, 7].into_iter().map(Value::Integer).collect::<Vec<_>>());
/// ```
pub fn slide(values: &[Value], aggregate: &str, range: Option<Range>) -> Result<Vec<Value>, Error> {
    let mut acc = init_aggregate(aggregate).ok_or_else(|| ValidationError::UnknownAggregate(aggregate.to_string()))?;

    let range = range.unwrap_or_default();
    if let (Some(min), Some(max)) = (range.min, range.max)
        && min > max
    {
        return Err(ValidationError::InvalidRange { min, max }.into());
    }
    let n = values.len() as i64;
    let (min, max) = (range.min.unwrap_or(-n), range.max.unwrap_or(n));
    let clamp = |x: i64| x.clamp(0, n) as usize;

    let mut out = Vec::with_capacity(values.len());
    let (mut lo, mut hi) = (0usize, 0usize);
    for i in 0..n {
        let (new_lo, new_hi) = (clamp(i.saturating_add(min)), clamp(i.saturating_add(max)));
        while hi < new_hi {
            acc.add(&values[hi])?;
            hi += 1;
        }
        while lo < new_lo {
            acc.remove(&values[lo])?;
            lo += 1;
        }
        out.push(acc.end()?);
    }
    Ok(out)
}

/// Compute `spec` for every row and write it to the row's `spec.name` field.
///
/// Rows rejected by the window's `where` receive null.
pub(crate) fn apply(rows: &mut [Value], spec: &WindowSpec) -> Result<(), Error> {
    let value = compile(&spec.value)?;
    let filter = compile(&spec.where_clause)?;
    let field = split_field(&spec.name);

    let mut results = vec![Value::Null; rows.len()];
    let mut eligible = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if filter.test(row)? {
            eligible.push(i);
        }
    }

    match &spec.aggregate {
        None => {
            for &i in &eligible {
                results[i] = value.eval(&rows[i])?;
            }
        }
        Some(aggregate) => {
            let partitions = partition(rows, &eligible, &spec.edges)?;
            trace!(window = %spec.name, partitions = partitions.len(), "sliding window");
            let sort = compile_sort(&spec.sort)?;
            for mut members in partitions {
                sort_indices(rows, &mut members, &sort)?;
                let values = members
                    .iter()
                    .map(|&i| value.eval(&rows[i]))
                    .collect::<Result<Vec<_>, _>>()?;
                let aggregated = slide(&values, aggregate, spec.range)?;
                for (i, result) in members.into_iter().zip(aggregated) {
                    results[i] = result;
                }
            }
        }
    }

    for (row, result) in rows.iter_mut().zip(results) {
        set_path(row, &field, result)?;
    }
    Ok(())
}

/// Group row indices by their edge values, in order of first appearance.
fn partition(rows: &[Value], indices: &[usize], edges: &[Edge]) -> Result<Vec<Vec<usize>>, Error> {
    if edges.is_empty() {
        return Ok(vec![indices.to_vec()]);
    }

    let keys = edges
        .iter()
        .map(|edge| edge.value.as_ref().map(compile).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut lookup: HashMap<String, usize> = HashMap::new();
    for &i in indices {
        let mut key = Vec::with_capacity(keys.len());
        for compiled in &keys {
            key.push(match compiled {
                Some(expr) => expr.eval(&rows[i])?,
                None => Value::Null,
            });
        }
        let slot = *lookup.entry(group_key(&Value::Array(key))).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    Ok(groups)
}

pub(crate) fn compile_sort(sort: &[SortClause]) -> Result<Vec<(CompiledExpression, i8)>, Error> {
    sort.iter()
        .map(|clause| -> Result<_, Error> { Ok((compile(&clause.value)?, clause.sort)) })
        .collect()
}

/// Stable sort of `indices` by the rows they point at.
pub(crate) fn sort_indices(
    rows: &[Value],
    indices: &mut Vec<usize>,
    sort: &[(CompiledExpression, i8)],
) -> Result<(), ExecutionError> {
    if sort.is_empty() {
        return Ok(());
    }

    let mut decorated = indices
        .iter()
        .map(|&i| -> Result<_, ExecutionError> {
            let keys = sort
                .iter()
                .map(|(expr, _)| expr.eval(&rows[i]))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((keys, i))
        })
        .collect::<Result<Vec<_>, _>>()?;

    decorated.sort_by(|(a, _), (b, _)| {
        a.iter()
            .zip(b)
            .zip(sort)
            .map(|((x, y), (_, direction))| {
                let ord = x.sort_order(y);
                if *direction < 0 { ord.reverse() } else { ord }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    *indices = decorated.into_iter().map(|(_, i)| i).collect();
    Ok(())
}
