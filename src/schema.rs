//! # Schema inference
//!
//! Rows carry no declared schema. A [`Schema`] is built by scanning rows and
//! assigning every leaf path a [`JsonType`] from the type lattice, together
//! with the chain of enclosing arrays it was found under.
//!
//! - **[lattice]** - the [`JsonType`] domain and its [`merge`] table
//! - **[inference]** - the recursive row scan
//!
//! ## Example
//!
//! ```
//! use jx::{Schema, Value};
//! use jx::schema::JsonType;
//!
//! let rows: Vec<Value> = vec![
//!     serde_json::json!({"a": 1, "b": {"c": "x"}}).into(),
//!     serde_json::json!({"a": 2.5}).into(),
//! ];
//! let schema = Schema::infer(&rows).unwrap();
//!
//! assert_eq!(schema.get("a").unwrap().json_type, JsonType::Double);
//! assert_eq!(schema.get("b.c").unwrap().json_type, JsonType::String);
//! ```
pub mod inference;
pub mod lattice;

use std::collections::BTreeMap;
use std::fmt;

pub use lattice::{JsonType, merge};

use crate::value::Value;

/// One leaf (or structured) path of the rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Full dotted name, e.g. `"bug.attachments.flags"`
    pub name: String,
    pub json_type: JsonType,
    /// Enclosing array fields, outermost first. Empty at the row root.
    pub nested_path: Vec<String>,
}

impl Column {
    /// How many arrays deep this column sits below the row root.
    pub fn depth(&self) -> usize {
        self.nested_path.len()
    }
}

/// A column was observed holding both a scalar and a structured value.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaConflictError {
    pub column: String,
    pub existing: JsonType,
    pub observed: JsonType,
}

impl fmt::Display for SchemaConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Schema conflict on column '{}': can not merge {} with {}",
            self.column, self.existing, self.observed
        )
    }
}

impl std::error::Error for SchemaConflictError {}

/// Mapping from full column name to [`Column`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: BTreeMap<String, Column>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infer the schema of `rows`.
    pub fn infer(rows: &[Value]) -> Result<Schema, SchemaConflictError> {
        let mut schema = Schema::new();
        schema.merge_rows(rows)?;
        Ok(schema)
    }

    /// Infer the schema of `rows`, skipping any row that conflicts with the
    /// rows before it. Returns the conflicts that were skipped.
    pub fn infer_lenient(rows: &[Value]) -> (Schema, Vec<SchemaConflictError>) {
        let mut schema = Schema::new();
        let mut conflicts = Vec::new();
        for row in rows {
            let mut trial = schema.clone();
            match trial.merge_rows(std::iter::once(row)) {
                Ok(()) => schema = trial,
                Err(conflict) => conflicts.push(conflict),
            }
        }
        (schema, conflicts)
    }

    /// Widen this schema with more rows.
    pub fn merge_rows<'a>(
        &mut self,
        rows: impl IntoIterator<Item = &'a Value>,
    ) -> Result<(), SchemaConflictError> {
        inference::infer_rows(self, rows, &[], &[])
    }

    /// Record one observation of `name`, merging it into any existing column.
    ///
    /// The first observation fixes the column's nested path.
    pub fn observe(
        &mut self,
        name: &str,
        observed: JsonType,
        nested_path: &[String],
    ) -> Result<(), SchemaConflictError> {
        match self.columns.get_mut(name) {
            Some(column) => {
                let existing = column.json_type;
                column.json_type = merge(existing, observed).ok_or_else(|| SchemaConflictError {
                    column: name.to_string(),
                    existing,
                    observed,
                })?;
            }
            None => {
                self.columns.insert(
                    name.to_string(),
                    Column {
                        name: name.to_string(),
                        json_type: observed,
                        nested_path: nested_path.to_vec(),
                    },
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Columns in name order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Root-level columns that hold a value of their own (anything but a
    /// plain object, whose properties are listed separately).
    pub fn leaf_names(&self) -> Vec<String> {
        self.columns
            .values()
            .filter(|c| c.depth() == 0 && c.json_type != JsonType::Object)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.columns
                .values()
                .map(|c| {
                    let description = Value::object([
                        ("type", Value::from(c.json_type.name())),
                        (
                            "nested_path",
                            Value::Array(c.nested_path.iter().map(|p| Value::from(p.as_str())).collect()),
                        ),
                    ]);
                    (c.name.clone(), description)
                })
                .collect(),
        )
    }
}
