//! # Expression Abstract Syntax Tree
//!
//! Expressions arrive as JSON and are parsed into the tagged [`Expr`] tree
//! defined here. The tree is immutable once built; the compiler turns it
//! into a reusable closure over rows.
//!
//! - **[expressions]** - expression nodes (literals, variables, logic, comparisons)
//! - **[operators]** - comparison and arithmetic operators
//!
//! ## Grammar
//!
//! ```text
//! "field.path"                               variable reference
//! 42, true, null, [1, 2]                     literal values
//! {"literal": "text"}                        explicit literal
//! {"and": [...]}, {"or": [...]}, {"not": e}  logic
//! {"eq": {"field": value}}                   comparison (also neq, gt, gte, lt, lte)
//! {"eq": [lhs, rhs]}                         comparison of two expressions
//! {"in": [needle, haystack]}                 membership
//! {"terms": {"field": [values]}}             membership against a list
//! {"when": c, "then": e1, "else": e2}        conditional
//! {"exists": {"field": name}}                presence (also missing)
//! {"prefix": {"field": "abc"}}               string prefix
//! {"regex": {"field": "^a.*"}}               regular expression
//! {"add": [a, b]}                            arithmetic (also sub, mul, div, mod)
//! {"match_all": {}}                          always true
//! ```
pub mod expressions;
pub mod operators;

pub use expressions::Expr;
pub use operators::{ArithmeticOp, CompareOp};
