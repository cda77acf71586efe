//! # Queries
//!
//! A [`Query`] is the validated, canonical form of a raw JSON query. It is
//! produced once by [`normalize`] against a container's schema and never
//! mutated afterwards.
//!
//! ```text
//! {
//!     "from": "bugs",
//!     "select": ["bug_id", {"name": "n", "value": "comments", "aggregate": "count"}],
//!     "edges" | "groupby": ["product"],
//!     "where": {"eq": {"status": "open"}},
//!     "sort": {"value": "bug_id", "sort": -1},
//!     "window": [{"name": "running", "value": "votes", "aggregate": "sum", "range": {"min": -2, "max": 1}}],
//!     "limit": 100,
//!     "format": "list" | "table" | "cube"
//! }
//! ```
pub mod normalize;

use std::fmt;
use std::sync::Arc;

pub use normalize::normalize;

use crate::{ast::Expr, error::Error, parser::parse, path::split_field, schema::Schema, value::Value};

/// Row cap a query reports when it names no `limit`. The in-memory
/// container only truncates on an explicit `limit`.
pub const DEFAULT_LIMIT: usize = 10;

/// A malformed query shape, rejected before any row is touched.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `edges` and `groupby` in the same query
    BothEdgesAndGroupby,

    /// `limit` that is not a non-negative integer
    InvalidLimit(String),

    /// A selected or grouped variable lives inside a nested array
    TooDeep { var: String },

    /// A clause with an unusable shape
    InvalidClause { clause: String, reason: String },

    /// An aggregate name with no registered accumulator
    UnknownAggregate(String),

    /// A `format` other than list, table or cube
    UnknownFormat(String),

    /// A window range whose lower bound exceeds its upper bound
    InvalidRange { min: i64, max: i64 },
}

impl ValidationError {
    pub(crate) fn clause(clause: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidClause {
            clause: clause.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::BothEdgesAndGroupby => {
                write!(f, "You can not use both the `groupby` and `edges` clauses in the same query")
            }
            ValidationError::InvalidLimit(limit) => {
                write!(f, "Expecting limit >= 0, got {}", limit)
            }
            ValidationError::TooDeep { var } => write!(
                f,
                "Variable '{}' is inside a nested array and can not be queried from the row root",
                var
            ),
            ValidationError::InvalidClause { clause, reason } => {
                write!(f, "Invalid `{}` clause: {}", clause, reason)
            }
            ValidationError::UnknownAggregate(name) => write!(f, "Unknown aggregate: '{}'", name),
            ValidationError::UnknownFormat(name) => {
                write!(f, "Unknown format: '{}' (expecting list, table or cube)", name)
            }
            ValidationError::InvalidRange { min, max } => {
                write!(f, "Window range min ({}) is greater than max ({})", min, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// One projected column.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    pub name: String,
    pub value: Expr,
    /// Registered aggregate name, or `"none"`
    pub aggregate: String,
}

impl SelectClause {
    pub fn is_aggregate(&self) -> bool {
        self.aggregate != "none"
    }
}

/// A single select projects each row to a bare value; a list select
/// projects each row to an object keyed by clause name.
#[derive(Debug, Clone, PartialEq)]
pub enum Select {
    Single(SelectClause),
    List(Vec<SelectClause>),
}

impl Select {
    pub fn clauses(&self) -> &[SelectClause] {
        match self {
            Select::Single(clause) => std::slice::from_ref(clause),
            Select::List(clauses) => clauses,
        }
    }

    /// A single, non-aggregated select of the whole row.
    pub fn is_identity(&self) -> bool {
        matches!(self, Select::Single(clause) if clause.value.is_identity() && !clause.is_aggregate())
    }
}

/// A named part of an edge domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub name: String,
    pub where_clause: Expr,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Domain {
    pub key: Option<String>,
    pub where_clause: Option<Expr>,
    pub partitions: Vec<Partition>,
}

/// A grouping dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub name: String,
    pub value: Option<Expr>,
    pub domain: Domain,
    pub allow_nulls: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Grouping {
    None,
    Edges(Vec<Edge>),
    GroupBy(Vec<Edge>),
}

impl Grouping {
    pub fn edges(&self) -> &[Edge] {
        match self {
            Grouping::None => &[],
            Grouping::Edges(edges) | Grouping::GroupBy(edges) => edges,
        }
    }

    pub fn is_grouped(&self) -> bool {
        !matches!(self, Grouping::None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortClause {
    pub value: Expr,
    /// `1` ascending, `-1` descending
    pub sort: i8,
}

/// Window frame relative to the current row: `[i + min, i + max)`.
/// A missing bound extends to the partition edge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Range {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    /// Field the result is written to
    pub name: String,
    pub value: Expr,
    /// Partition keys
    pub edges: Vec<Edge>,
    /// Order within each partition
    pub sort: Vec<SortClause>,
    /// Registered aggregate; `None` computes `value` per row
    pub aggregate: Option<String>,
    /// `None` frames the whole partition
    pub range: Option<Range>,
    pub where_clause: Expr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    List,
    Table,
    Cube,
}

impl Format {
    pub fn from_name(name: &str) -> Option<Format> {
        match name {
            "list" => Some(Format::List),
            "table" => Some(Format::Table),
            "cube" => Some(Format::Cube),
            _ => None,
        }
    }
}

/// A normalized query, bound to the schema it was validated against.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub(crate) from: Option<String>,
    pub(crate) select: Select,
    pub(crate) grouping: Grouping,
    pub(crate) where_clause: Expr,
    pub(crate) sort: Vec<SortClause>,
    pub(crate) window: Vec<WindowSpec>,
    pub(crate) limit: Option<usize>,
    pub(crate) format: Format,
    pub(crate) schema: Arc<Schema>,
}

impl Query {
    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn select(&self) -> &Select {
        &self.select
    }

    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    pub fn edges(&self) -> Option<&[Edge]> {
        match &self.grouping {
            Grouping::Edges(edges) => Some(edges),
            _ => None,
        }
    }

    pub fn groupby(&self) -> Option<&[Edge]> {
        match &self.grouping {
            Grouping::GroupBy(edges) => Some(edges),
            _ => None,
        }
    }

    pub fn where_clause(&self) -> &Expr {
        &self.where_clause
    }

    pub fn sort(&self) -> &[SortClause] {
        &self.sort
    }

    pub fn window(&self) -> &[WindowSpec] {
        &self.window
    }

    /// The requested row cap, or [`DEFAULT_LIMIT`].
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// The row cap named by the query, if any.
    pub fn explicit_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// True when the query takes the aggregation path.
    pub fn is_aggregate(&self) -> bool {
        self.grouping.is_grouped() || self.select.clauses().iter().any(SelectClause::is_aggregate)
    }

    /// An independent copy; the schema is shared.
    pub fn copy(&self) -> Query {
        self.clone()
    }
}

/// In-place row update: `{"set": {field: value}, "clear": field | [fields], "where": expr}`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    pub set: Vec<(String, Value)>,
    pub clear: Vec<String>,
    pub where_clause: Expr,
}

impl UpdateCommand {
    pub fn from_value(command: &Value) -> Result<UpdateCommand, Error> {
        let Value::Object(map) = command else {
            return Err(ValidationError::clause("update", "expecting an object").into());
        };

        let set = match map.get("set") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(fields)) => fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Some(_) => {
                return Err(ValidationError::clause("set", "expecting a {field: value} object").into());
            }
        };

        let mut clear = Vec::new();
        for field in normalize::listwrap(map.get("clear")) {
            match field {
                Value::String(name) => clear.push(name.clone()),
                other => {
                    return Err(ValidationError::clause(
                        "clear",
                        format!("expecting field names, got {}", other.type_name()),
                    )
                    .into());
                }
            }
        }

        let where_clause = match map.get("where") {
            None | Some(Value::Null) => Expr::always_true(),
            Some(spec) => parse(spec)?,
        };

        Ok(UpdateCommand {
            set,
            clear,
            where_clause,
        })
    }

    /// Apply to one row: clear first, then set.
    pub(crate) fn apply(&self, row: &mut Value) -> Result<(), Error> {
        for field in &self.clear {
            crate::path::set_path(row, &split_field(field), Value::Null)?;
        }
        for (field, value) in &self.set {
            crate::path::set_path(row, &split_field(field), value.clone())?;
        }
        Ok(())
    }
}
