use std::collections::BTreeMap;
use std::fmt;

use crate::{
    ast::{ArithmeticOp, CompareOp, Expr},
    value::Value,
};

/// A malformed JSON expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CompilationError {
    /// The operator key is not part of the grammar
    UnknownOperator(String),

    /// The operator got the wrong number or kind of operands
    Arity {
        operator: String,
        expected: &'static str,
    },

    /// The operand has the right arity but an unusable shape
    InvalidOperand { operator: String, reason: String },

    /// A `regex` pattern that does not compile
    InvalidPattern { pattern: String, reason: String },
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilationError::UnknownOperator(op) => write!(f, "Unknown operator: '{}'", op),
            CompilationError::Arity { operator, expected } => {
                write!(f, "Operator '{}' expects {}", operator, expected)
            }
            CompilationError::InvalidOperand { operator, reason } => {
                write!(f, "Invalid operand for '{}': {}", operator, reason)
            }
            CompilationError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid pattern '{}': {}", pattern, reason)
            }
        }
    }
}

impl std::error::Error for CompilationError {}

/// Parse a JSON expression into an [`Expr`].
///
/// Bare strings are variable references, other scalars and arrays are
/// literals, and objects name an operator.
///
/// ```
/// use jx::{parse, Expr, Value};
///
/// let spec: Value = serde_json::json!({"gt": {"a": 1}}).into();
/// let expr = parse(&spec).unwrap();
/// assert_eq!(expr.to_string(), r#"{"gt":["a",1]}"#);
///
/// assert_eq!(parse(&Value::from("a.b")).unwrap(), Expr::variable("a.b"));
/// ```
pub fn parse(spec: &Value) -> Result<Expr, CompilationError> {
    match spec {
        Value::String(name) if name == "*" => Ok(Expr::variable(".")),
        Value::String(name) => Ok(Expr::variable(name.as_str())),
        Value::Object(map) => parse_operator(map),
        literal => Ok(Expr::Literal(literal.clone())),
    }
}

fn parse_operator(map: &BTreeMap<String, Value>) -> Result<Expr, CompilationError> {
    if map.contains_key("when") {
        return parse_conditional(map);
    }

    let mut entries = map.iter();
    let (op, operand) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => {
            return Err(CompilationError::InvalidOperand {
                operator: "{}".to_string(),
                reason: "empty expression object".to_string(),
            });
        }
        (Some(_), Some(_)) => {
            return Err(CompilationError::InvalidOperand {
                operator: map.keys().cloned().collect::<Vec<_>>().join(", "),
                reason: "expected exactly one operator per expression object".to_string(),
            });
        }
    };

    if let Some(cmp) = CompareOp::from_name(op) {
        return parse_comparison(op, cmp, operand);
    }
    if let Some(arith) = ArithmeticOp::from_name(op) {
        let (left, right) = parse_pair(op, operand)?;
        return Ok(Expr::Arithmetic {
            op: arith,
            left: Box::new(left),
            right: Box::new(right),
        });
    }

    match op.as_str() {
        "literal" => Ok(Expr::Literal(operand.clone())),
        "match_all" => Ok(Expr::always_true()),
        "and" => Ok(Expr::And(parse_list(op, operand)?)),
        "or" => Ok(Expr::Or(parse_list(op, operand)?)),
        "not" => Ok(Expr::Not(Box::new(parse(operand)?))),
        "in" => parse_in(op, operand),
        "terms" => {
            let (field, values) = single_field(op, operand)?;
            if !matches!(values, Value::Array(_)) {
                return Err(CompilationError::InvalidOperand {
                    operator: op.clone(),
                    reason: format!("expected a list of values for '{}'", field),
                });
            }
            Ok(Expr::In {
                needle: Box::new(Expr::variable(field)),
                haystack: Box::new(Expr::Literal(values.clone())),
            })
        }
        "exists" => Ok(Expr::Exists(field_operand(op, operand)?)),
        "missing" => Ok(Expr::Missing(field_operand(op, operand)?)),
        "prefix" => {
            let (field, prefix) = single_field(op, operand)?;
            Ok(Expr::Prefix {
                field: field.to_string(),
                prefix: string_operand(op, prefix)?,
            })
        }
        "regex" => {
            let (field, pattern) = single_field(op, operand)?;
            Ok(Expr::Regex {
                field: field.to_string(),
                pattern: string_operand(op, pattern)?,
            })
        }
        other => Err(CompilationError::UnknownOperator(other.to_string())),
    }
}

/// `{"eq": {"a": 1, "b": 2}}` is the conjunction of the per-field tests;
/// `{"eq": [lhs, rhs]}` compares two expressions.
fn parse_comparison(op: &str, cmp: CompareOp, operand: &Value) -> Result<Expr, CompilationError> {
    match operand {
        Value::Array(_) => {
            let (left, right) = parse_pair(op, operand)?;
            Ok(Expr::Compare {
                op: cmp,
                left: Box::new(left),
                right: Box::new(right),
            })
        }
        Value::Object(fields) if !fields.is_empty() => {
            // neq over several fields negates the whole conjunction
            let per_field = if cmp == CompareOp::Neq { CompareOp::Eq } else { cmp };
            let mut terms: Vec<Expr> = fields
                .iter()
                .map(|(field, value)| Expr::Compare {
                    op: per_field,
                    left: Box::new(Expr::variable(field.as_str())),
                    right: Box::new(Expr::Literal(value.clone())),
                })
                .collect();
            let conjunction = if terms.len() == 1 {
                terms.remove(0)
            } else {
                Expr::And(terms)
            };
            if cmp == CompareOp::Neq {
                Ok(match conjunction {
                    Expr::Compare { left, right, .. } => Expr::Compare {
                        op: CompareOp::Neq,
                        left,
                        right,
                    },
                    other => Expr::Not(Box::new(other)),
                })
            } else {
                Ok(conjunction)
            }
        }
        _ => Err(CompilationError::Arity {
            operator: op.to_string(),
            expected: "a {field: value} object or a [lhs, rhs] pair",
        }),
    }
}

fn parse_in(op: &str, operand: &Value) -> Result<Expr, CompilationError> {
    match operand {
        Value::Object(_) => {
            let (field, values) = single_field(op, operand)?;
            Ok(Expr::In {
                needle: Box::new(Expr::variable(field)),
                haystack: Box::new(Expr::Literal(values.clone())),
            })
        }
        _ => {
            let (needle, haystack) = parse_pair(op, operand)?;
            Ok(Expr::In {
                needle: Box::new(needle),
                haystack: Box::new(haystack),
            })
        }
    }
}

fn parse_conditional(map: &BTreeMap<String, Value>) -> Result<Expr, CompilationError> {
    if let Some(extra) = map.keys().find(|k| !matches!(k.as_str(), "when" | "then" | "else")) {
        return Err(CompilationError::InvalidOperand {
            operator: "when".to_string(),
            reason: format!("unexpected key '{}' next to when/then/else", extra),
        });
    }

    let test = map.get("when").map(parse).transpose()?;
    let then = map.get("then").map(parse).transpose()?;
    let (Some(test), Some(then)) = (test, then) else {
        return Err(CompilationError::Arity {
            operator: "when".to_string(),
            expected: "a 'then' clause",
        });
    };
    let otherwise = match map.get("else") {
        Some(spec) => parse(spec)?,
        None => Expr::Literal(Value::Null),
    };

    Ok(Expr::Conditional {
        test: Box::new(test),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

fn parse_list(op: &str, operand: &Value) -> Result<Vec<Expr>, CompilationError> {
    match operand {
        Value::Array(items) => items.iter().map(parse).collect(),
        _ => Err(CompilationError::Arity {
            operator: op.to_string(),
            expected: "a list of expressions",
        }),
    }
}

fn parse_pair(op: &str, operand: &Value) -> Result<(Expr, Expr), CompilationError> {
    match operand {
        Value::Array(items) if items.len() == 2 => Ok((parse(&items[0])?, parse(&items[1])?)),
        _ => Err(CompilationError::Arity {
            operator: op.to_string(),
            expected: "exactly two operands",
        }),
    }
}

/// The `{field: value}` shape used by terms/prefix/regex.
fn single_field<'a>(op: &str, operand: &'a Value) -> Result<(&'a str, &'a Value), CompilationError> {
    match operand {
        Value::Object(fields) if fields.len() == 1 => {
            let (field, value) = fields.iter().next().ok_or_else(|| CompilationError::Arity {
                operator: op.to_string(),
                expected: "a single {field: value} pair",
            })?;
            Ok((field.as_str(), value))
        }
        _ => Err(CompilationError::Arity {
            operator: op.to_string(),
            expected: "a single {field: value} pair",
        }),
    }
}

/// `"name"` or `{"field": "name"}`.
fn field_operand(op: &str, operand: &Value) -> Result<String, CompilationError> {
    match operand {
        Value::String(name) => Ok(name.clone()),
        Value::Object(fields) => match (fields.get("field"), fields.len()) {
            (Some(Value::String(name)), 1) => Ok(name.clone()),
            _ => Err(CompilationError::InvalidOperand {
                operator: op.to_string(),
                reason: "expected {\"field\": name}".to_string(),
            }),
        },
        _ => Err(CompilationError::Arity {
            operator: op.to_string(),
            expected: "a field name",
        }),
    }
}

fn string_operand(op: &str, value: &Value) -> Result<String, CompilationError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CompilationError::InvalidOperand {
            operator: op.to_string(),
            reason: format!("expected a string, got {}", value.type_name()),
        })
}
