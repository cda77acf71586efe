use std::fmt;

use crate::{
    ast::{ArithmeticOp, CompareOp},
    output::to_json,
    value::Value,
};

/// Abstract Syntax Tree node representing a parsed expression.
///
/// Built once by the parser from the JSON expression grammar and never
/// mutated afterwards; the compiler turns it into a reusable closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    ///
    /// # Example
    /// ```text
    /// 42
    /// {"literal": "open"}
    /// ```
    Literal(Value),

    /// Field reference by dotted path. `"."` is the whole row.
    ///
    /// # Example
    /// ```text
    /// "bug.status"
    /// ```
    Variable(String),

    /// Conjunction; an empty list is true
    And(Vec<Expr>),

    /// Disjunction; an empty list is false
    Or(Vec<Expr>),

    /// Negation
    Not(Box<Expr>),

    /// Comparison
    ///
    /// # Examples
    /// ```text
    /// {"gt": {"priority": 2}}
    /// {"eq": ["owner", "reporter"]}
    /// ```
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Membership test; a scalar haystack is a one-element sequence
    ///
    /// # Example
    /// ```text
    /// {"in": ["status", ["new", "open"]]}
    /// ```
    In {
        needle: Box<Expr>,
        haystack: Box<Expr>,
    },

    /// `when`/`then`/`else`
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// True when the field holds a non-empty value
    ///
    /// # Example
    /// ```text
    /// {"exists": {"field": "assigned_to"}}
    /// ```
    Exists(String),

    /// Negation of `Exists`
    Missing(String),

    /// String prefix match on a field
    Prefix { field: String, prefix: String },

    /// Regular expression match on a field
    Regex { field: String, pattern: String },

    /// Binary arithmetic; null in, null out
    ///
    /// # Example
    /// ```text
    /// {"sub": ["closed", "opened"]}
    /// ```
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn always_true() -> Expr {
        Expr::Literal(Value::Boolean(true))
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self, Expr::Literal(Value::Boolean(true)))
    }

    pub fn variable(name: impl Into<String>) -> Expr {
        Expr::Variable(name.into())
    }

    /// True for the whole-row reference `"."`.
    pub fn is_identity(&self) -> bool {
        matches!(self, Expr::Variable(name) if name == ".")
    }

    /// Canonical JSON form. Parsing it yields an equal expression.
    pub fn to_value(&self) -> Value {
        match self {
            Expr::Literal(v @ (Value::String(_) | Value::Object(_))) => {
                Value::object([("literal", v.clone())])
            }
            Expr::Literal(v) => v.clone(),
            Expr::Variable(name) => Value::String(name.clone()),
            Expr::And(terms) => Value::object([("and", list(terms))]),
            Expr::Or(terms) => Value::object([("or", list(terms))]),
            Expr::Not(term) => Value::object([("not", term.to_value())]),
            Expr::Compare { op, left, right } => {
                Value::object([(op.name(), Value::Array(vec![left.to_value(), right.to_value()]))])
            }
            Expr::In { needle, haystack } => Value::object([(
                "in",
                Value::Array(vec![needle.to_value(), haystack.to_value()]),
            )]),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => Value::object([
                ("when", test.to_value()),
                ("then", then.to_value()),
                ("else", otherwise.to_value()),
            ]),
            Expr::Exists(field) => {
                Value::object([("exists", Value::object([("field", Value::from(field.as_str()))]))])
            }
            Expr::Missing(field) => {
                Value::object([("missing", Value::object([("field", Value::from(field.as_str()))]))])
            }
            Expr::Prefix { field, prefix } => Value::object([(
                "prefix",
                Value::object([(field.as_str(), Value::from(prefix.as_str()))]),
            )]),
            Expr::Regex { field, pattern } => Value::object([(
                "regex",
                Value::object([(field.as_str(), Value::from(pattern.as_str()))]),
            )]),
            Expr::Arithmetic { op, left, right } => {
                Value::object([(op.name(), Value::Array(vec![left.to_value(), right.to_value()]))])
            }
        }
    }
}

fn list(terms: &[Expr]) -> Value {
    Value::Array(terms.iter().map(Expr::to_value).collect())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_json(&self.to_value()))
    }
}
