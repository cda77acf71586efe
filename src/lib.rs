//! jx - an in-memory query engine for JSON documents.
//!
//! Rows are loaded into a [`ListContainer`], which infers a [`Schema`] and
//! answers JSON queries: filter, sort, project, group and aggregate, window
//! functions, and list/table/cube output.
//!
//! ```
//! use jx::{Container, ListContainer, Value};
//! use serde_json::json;
//!
//! let rows: Vec<Value> = vec![
//!     json!({"id": 1, "status": "open"}).into(),
//!     json!({"id": 2, "status": "closed"}).into(),
//!     json!({"id": 3, "status": "open"}).into(),
//! ];
//! let bugs = ListContainer::new("bugs", rows).unwrap();
//!
//! let open = bugs
//!     .query(&json!({"select": "id", "where": {"eq": {"status": "open"}}}).into())
//!     .unwrap();
//! assert_eq!(open.as_container().unwrap().rows(), &[Value::Integer(1), Value::Integer(3)]);
//! ```
pub mod ast;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compiler;
pub mod container;
pub mod error;
pub mod format;
pub mod groupby;
pub mod output;
pub mod parser;
pub mod path;
pub mod query;
pub mod schema;
pub mod value;
pub mod window;

pub use ast::{ArithmeticOp, CompareOp, Expr};
pub use compiler::{CompiledExpression, Compiler, ExecutionError, compile, compile_spec, get_all_vars};
pub use container::{Container, ListContainer, QueryOutput};
pub use error::Error;
pub use output::{to_json, to_json_pretty};
pub use parser::{CompilationError, parse};
pub use query::{DEFAULT_LIMIT, Format, Query, UpdateCommand, ValidationError, normalize};
pub use schema::{Column, JsonType, Schema, SchemaConflictError};
pub use value::Value;
