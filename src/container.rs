//! # Containers
//!
//! A container is a named collection of rows with a schema, queried with the
//! JSON query language. [`ListContainer`] keeps its rows in memory.
//!
//! Set operations (`filter`, `sort`, `select`) never touch the receiver;
//! they return a new container. `window` and `update` modify rows in place
//! and serialize on the container's lock. Rows are shared copy-on-write, so
//! a container returned by an identity select shares storage with its
//! source until either side is modified.
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    compiler::compile,
    error::Error,
    format::{rows_to_cube, rows_to_list, rows_to_table},
    groupby::{Aggregated, aggregate},
    path::{get_path, set_path, split_field},
    query::{Format, Query, Select, SortClause, UpdateCommand, WindowSpec, normalize},
    schema::Schema,
    value::Value,
    window::{self, compile_sort, sort_indices},
};

/// Anything that can answer queries.
pub trait Container {
    fn name(&self) -> &str;

    fn get_schema(&self) -> Arc<Schema>;

    /// Run a normalized query.
    fn execute(&self, query: &Query) -> Result<QueryOutput, Error>;

    /// Normalize `raw` against this container's schema and run it.
    fn query(&self, raw: &Value) -> Result<QueryOutput, Error> {
        let mut state = QueryState::Unvalidated;
        let outcome = normalize(raw, &self.get_schema()).and_then(|query| {
            state = state.advance(QueryState::Normalized);
            state = state.advance(QueryState::Executing);
            self.execute(&query)
        });
        let end = if outcome.is_ok() { QueryState::Done } else { QueryState::Failed };
        state.advance(end);
        outcome
    }
}

/// Lifecycle of one [`Container::query`] call. `Done` and `Failed` are
/// terminal; nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Unvalidated,
    Normalized,
    Executing,
    Done,
    Failed,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Done | QueryState::Failed)
    }

    fn advance(self, next: QueryState) -> QueryState {
        trace!(from = ?self, to = ?next, "query state");
        next
    }
}

/// A query answers with rows, or with a formatted document or an
/// ungrouped aggregate.
#[derive(Debug, Clone)]
pub enum QueryOutput {
    Container(ListContainer),
    Value(Value),
}

impl QueryOutput {
    pub fn as_container(&self) -> Option<&ListContainer> {
        match self {
            QueryOutput::Container(c) => Some(c),
            QueryOutput::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            QueryOutput::Container(_) => None,
            QueryOutput::Value(v) => Some(v),
        }
    }

    /// Rows render in list format.
    pub fn into_value(self) -> Value {
        match self {
            QueryOutput::Container(c) => c.to_value(),
            QueryOutput::Value(v) => v,
        }
    }
}

/// In-memory rows with an inferred schema.
#[derive(Debug, Clone)]
pub struct ListContainer {
    name: String,
    rows: Arc<Vec<Value>>,
    schema: Arc<Schema>,
    locker: Arc<Mutex<()>>,
}

impl ListContainer {
    /// Wrap `rows`, inferring their schema.
    ///
    /// ```
    /// use jx::{ListContainer, Value};
    ///
    /// let rows: Vec<Value> = vec![serde_json::json!({"a": 1}).into()];
    /// let bugs = ListContainer::new("bugs", rows).unwrap();
    /// assert_eq!(bugs.len(), 1);
    /// assert!(bugs.schema().get("a").is_some());
    /// ```
    pub fn new(name: impl Into<String>, rows: Vec<Value>) -> Result<Self, Error> {
        let schema = Schema::infer(&rows)?;
        Ok(Self::with_schema(name, rows, Arc::new(schema)))
    }

    /// Wrap `rows` with a schema the caller vouches for.
    pub fn with_schema(name: impl Into<String>, rows: Vec<Value>, schema: Arc<Schema>) -> Self {
        ListContainer {
            name: name.into(),
            rows: Arc::new(rows),
            schema,
            locker: Arc::new(Mutex::new(())),
        }
    }

    fn derive(&self, rows: Vec<Value>) -> Result<Self, Error> {
        Self::new(self.name.clone(), rows)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Advisory lock serializing in-place modification.
    pub fn locker(&self) -> &Mutex<()> {
        &self.locker
    }

    /// True when both containers read the same row storage.
    pub fn shares_rows_with(&self, other: &ListContainer) -> bool {
        Arc::ptr_eq(&self.rows, &other.rows)
    }

    /// Values of `field` across all rows.
    pub fn get(&self, field: &str) -> Result<Vec<Value>, Error> {
        let path = split_field(field);
        Ok(self
            .rows
            .iter()
            .map(|row| get_path(row, &path))
            .collect::<Result<_, _>>()?)
    }

    /// Rows satisfying `predicate`, in their original order.
    pub fn filter(&self, predicate: &crate::ast::Expr) -> Result<Self, Error> {
        if predicate.is_always_true() {
            return Ok(self.clone());
        }
        let test = compile(predicate)?;
        let mut kept = Vec::new();
        for row in self.rows.iter() {
            if test.test(row)? {
                kept.push(row.clone());
            }
        }
        trace!(container = %self.name, kept = kept.len(), of = self.len(), "filtered");
        self.derive(kept)
    }

    /// Stable multi-key sort.
    pub fn sort(&self, sort: &[SortClause]) -> Result<Self, Error> {
        if sort.is_empty() {
            return Ok(self.clone());
        }
        let keys = compile_sort(sort)?;
        let mut order: Vec<usize> = (0..self.len()).collect();
        sort_indices(&self.rows, &mut order, &keys)?;
        let rows = order.into_iter().map(|i| self.rows[i].clone()).collect();
        Ok(ListContainer {
            name: self.name.clone(),
            rows: Arc::new(rows),
            schema: Arc::clone(&self.schema),
            locker: Arc::new(Mutex::new(())),
        })
    }

    /// The first `n` rows.
    pub fn limit(&self, n: usize) -> Self {
        if n >= self.len() {
            return self.clone();
        }
        ListContainer {
            name: self.name.clone(),
            rows: Arc::new(self.rows[..n].to_vec()),
            schema: Arc::clone(&self.schema),
            locker: Arc::new(Mutex::new(())),
        }
    }

    fn limit_to(self, limit: Option<usize>) -> Self {
        match limit {
            Some(n) => self.limit(n),
            None => self,
        }
    }

    /// Project every row. The identity select returns this container.
    pub fn select(&self, select: &Select) -> Result<Self, Error> {
        if select.is_identity() {
            return Ok(self.clone());
        }

        let rows = match select {
            Select::Single(clause) => {
                let value = compile(&clause.value)?;
                self.rows.iter().map(|row| value.eval(row)).collect::<Result<Vec<_>, _>>()?
            }
            Select::List(clauses) => {
                let columns = clauses
                    .iter()
                    .map(|clause| -> Result<_, Error> {
                        Ok((split_field(&clause.name), compile(&clause.value)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let mut rows = Vec::with_capacity(self.len());
                for row in self.rows.iter() {
                    let mut out = Value::Object(Default::default());
                    for (path, value) in &columns {
                        set_path(&mut out, path, value.eval(row)?)?;
                    }
                    rows.push(out);
                }
                rows
            }
        };
        self.derive(rows)
    }

    /// Add the window's column to every row, in place.
    pub fn window(&mut self, spec: &WindowSpec) -> Result<(), Error> {
        let locker = Arc::clone(&self.locker);
        let _guard = locker.lock();
        debug!(container = %self.name, window = %spec.name, "applying window");

        let rows = Arc::make_mut(&mut self.rows);
        let applied = window::apply(rows, spec);
        self.reinfer(applied)
    }

    /// Clear then set fields on every row matching the command's `where`,
    /// in place.
    pub fn update(&mut self, command: &UpdateCommand) -> Result<(), Error> {
        let locker = Arc::clone(&self.locker);
        let _guard = locker.lock();

        let test = compile(&command.where_clause)?;
        let rows = Arc::make_mut(&mut self.rows);
        let mut touched = 0usize;
        let applied = rows.iter_mut().try_for_each(|row| -> Result<(), Error> {
            if test.test(row)? {
                command.apply(row)?;
                touched += 1;
            }
            Ok(())
        });
        debug!(container = %self.name, touched, "updated rows");
        self.reinfer(applied)
    }

    /// Re-derive the schema after rows changed in place. When the change
    /// stopped partway the schema still covers whatever was written, minus
    /// rows that no longer agree with the others.
    fn reinfer(&mut self, applied: Result<(), Error>) -> Result<(), Error> {
        if let Err(e) = applied {
            let (schema, conflicts) = Schema::infer_lenient(&self.rows);
            for conflict in &conflicts {
                warn!(container = %self.name, %conflict, "skipped row in schema after failed change");
            }
            self.schema = Arc::new(schema);
            return Err(e);
        }
        self.schema = Arc::new(Schema::infer(&self.rows)?);
        Ok(())
    }

    /// A windowed copy; this container is untouched.
    pub fn with_window(&self, spec: &WindowSpec) -> Result<Self, Error> {
        let mut copy = self.detached();
        copy.window(spec)?;
        Ok(copy)
    }

    /// An updated copy; this container is untouched.
    pub fn with_update(&self, command: &UpdateCommand) -> Result<Self, Error> {
        let mut copy = self.detached();
        copy.update(command)?;
        Ok(copy)
    }

    fn detached(&self) -> Self {
        ListContainer {
            locker: Arc::new(Mutex::new(())),
            ..self.clone()
        }
    }

    /// Append rows, widening the schema.
    pub fn extend(&mut self, rows: impl IntoIterator<Item = Value>) -> Result<(), Error> {
        let locker = Arc::clone(&self.locker);
        let _guard = locker.lock();

        let added: Vec<Value> = rows.into_iter().collect();
        let mut schema = Schema::clone(&self.schema);
        schema.merge_rows(&added)?;
        Arc::make_mut(&mut self.rows).extend(added);
        self.schema = Arc::new(schema);
        Ok(())
    }

    pub fn add(&mut self, row: Value) -> Result<(), Error> {
        self.extend(std::iter::once(row))
    }

    /// Render the rows in `format`. Table and cube columns are the
    /// schema's root leaves.
    pub fn format(&self, format: Format) -> Result<Value, Error> {
        Ok(match format {
            Format::List => rows_to_list(&self.rows),
            Format::Table => rows_to_table(&self.rows, &self.schema.leaf_names())?,
            Format::Cube => rows_to_cube(&self.rows, &self.schema.leaf_names())?,
        })
    }

    /// List format.
    pub fn to_value(&self) -> Value {
        rows_to_list(&self.rows)
    }
}

impl Container for ListContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn execute(&self, query: &Query) -> Result<QueryOutput, Error> {
        debug!(
            container = %self.name,
            aggregate = query.is_aggregate(),
            windows = query.window().len(),
            "executing query"
        );

        let filtered = self.filter(query.where_clause())?;
        let mut result = if query.is_aggregate() {
            match aggregate(filtered.rows(), query)? {
                Aggregated::Single(value) => return Ok(QueryOutput::Value(value)),
                Aggregated::Rows(rows) => filtered
                    .derive(rows)?
                    .sort(query.sort())?
                    .limit_to(query.explicit_limit()),
            }
        } else {
            filtered
                .sort(query.sort())?
                .limit_to(query.explicit_limit())
                .select(query.select())?
        };

        for spec in query.window() {
            result.window(spec)?;
        }

        match query.format() {
            Format::List => Ok(QueryOutput::Container(result)),
            other => Ok(QueryOutput::Value(result.format(other)?)),
        }
    }
}

impl<'a> IntoIterator for &'a ListContainer {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
