use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use regex::Regex;
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use tracing::debug;

use crate::{
    ast::{ArithmeticOp, CompareOp, Expr},
    parser::{CompilationError, parse},
    path::{get_path, split_field},
    value::Value,
};

/// Errors raised while evaluating a compiled expression against a row.
///
/// Missing fields are not errors (they read as null); these are raised for
/// structurally invalid access only.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Type mismatch or invalid operation for the given type
    TypeError(String),

    /// Invalid field access, e.g. reading a field of a scalar
    AccessError(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::TypeError(msg) => write!(f, "Type error: {}", msg),
            ExecutionError::AccessError(msg) => write!(f, "Access error: {}", msg),
        }
    }
}

impl std::error::Error for ExecutionError {}

type RowFn = dyn Fn(&Value) -> Result<Value, ExecutionError> + Send + Sync;

/// An expression compiled into a pure function over rows.
///
/// Cloning is cheap and clones share the compiled closure, so a compiled
/// expression can be handed to any number of threads.
#[derive(Clone)]
pub struct CompiledExpression {
    expr: Arc<Expr>,
    func: Arc<RowFn>,
}

impl CompiledExpression {
    /// Evaluate against one row.
    pub fn eval(&self, row: &Value) -> Result<Value, ExecutionError> {
        (self.func)(row)
    }

    /// Evaluate as a predicate; null and false reject the row.
    pub fn test(&self, row: &Value) -> Result<bool, ExecutionError> {
        Ok(self.eval(row)?.is_truthy())
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// True when both handles point at the same compiled closure.
    pub fn same_compilation(&self, other: &CompiledExpression) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledExpression")
            .field(&self.expr.to_string())
            .finish()
    }
}

/// Compiles expressions, caching one closure per distinct expression.
#[derive(Default)]
pub struct Compiler {
    cache: RwLock<HashMap<String, CompiledExpression>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `expr`, reusing the cached closure if this expression was
    /// compiled before.
    pub fn compile(&self, expr: &Expr) -> Result<CompiledExpression, CompilationError> {
        let key = expr.to_string();
        if let Some(hit) = self.cache.read().get(&key) {
            return Ok(hit.clone());
        }

        debug!(expression = %key, "compiling expression");
        let compiled = CompiledExpression {
            expr: Arc::new(expr.clone()),
            func: build(expr)?,
        };
        // another thread may have won the race; keep whichever landed first
        Ok(self.cache.write().entry(key).or_insert(compiled).clone())
    }

    /// Parse and compile a JSON expression.
    pub fn compile_spec(&self, spec: &Value) -> Result<CompiledExpression, CompilationError> {
        self.compile(&parse(spec)?)
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

static COMPILER: LazyLock<Compiler> = LazyLock::new(Compiler::new);

/// Compile with the process-wide cache.
///
/// ```
/// use jx::{compile, parse, Value};
///
/// let expr = parse(&serde_json::json!({"gt": {"a": 1}}).into()).unwrap();
/// let predicate = compile(&expr).unwrap();
///
/// let row: Value = serde_json::json!({"a": 2}).into();
/// assert!(predicate.test(&row).unwrap());
/// assert!(!predicate.test(&Value::Null).unwrap());
/// ```
pub fn compile(expr: &Expr) -> Result<CompiledExpression, CompilationError> {
    COMPILER.compile(expr)
}

/// Parse and compile with the process-wide cache.
pub fn compile_spec(spec: &Value) -> Result<CompiledExpression, CompilationError> {
    COMPILER.compile_spec(spec)
}

/// Every variable the expression reads, found without evaluating it.
/// The whole-row reference `"."` is not a variable.
pub fn get_all_vars(expr: &Expr) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    collect_vars(expr, &mut vars);
    vars
}

fn collect_vars(expr: &Expr, vars: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Variable(name) => {
            if name != "." {
                vars.insert(name.clone());
            }
        }
        Expr::And(terms) | Expr::Or(terms) => {
            terms.iter().for_each(|t| collect_vars(t, vars));
        }
        Expr::Not(term) => collect_vars(term, vars),
        Expr::Compare { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
            collect_vars(left, vars);
            collect_vars(right, vars);
        }
        Expr::In { needle, haystack } => {
            collect_vars(needle, vars);
            collect_vars(haystack, vars);
        }
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            collect_vars(test, vars);
            collect_vars(then, vars);
            collect_vars(otherwise, vars);
        }
        Expr::Exists(field)
        | Expr::Missing(field)
        | Expr::Prefix { field, .. }
        | Expr::Regex { field, .. } => {
            vars.insert(field.clone());
        }
    }
}

fn build(expr: &Expr) -> Result<Arc<RowFn>, CompilationError> {
    let func: Arc<RowFn> = match expr {
        Expr::Literal(value) => {
            let value = value.clone();
            row_fn(move |_| Ok(value.clone()))
        }
        Expr::Variable(name) => {
            let path = split_field(name);
            row_fn(move |row| get_path(row, &path))
        }
        Expr::And(terms) => {
            let terms = build_all(terms)?;
            row_fn(move |row| {
                for term in &terms {
                    if !term(row)?.is_truthy() {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            })
        }
        Expr::Or(terms) => {
            let terms = build_all(terms)?;
            row_fn(move |row| {
                for term in &terms {
                    if term(row)?.is_truthy() {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            })
        }
        Expr::Not(term) => {
            let term = build(term)?;
            row_fn(move |row| Ok(Value::Boolean(!term(row)?.is_truthy())))
        }
        Expr::Compare { op, left, right } => {
            let op = *op;
            let (left, right) = (build(left)?, build(right)?);
            row_fn(move |row| Ok(Value::Boolean(compare(op, &left(row)?, &right(row)?))))
        }
        Expr::In { needle, haystack } => {
            let (needle, haystack) = (build(needle)?, build(haystack)?);
            row_fn(move |row| Ok(Value::Boolean(contains(&needle(row)?, &haystack(row)?))))
        }
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            let (test, then, otherwise) = (build(test)?, build(then)?, build(otherwise)?);
            row_fn(move |row| {
                if test(row)?.is_truthy() {
                    then(row)
                } else {
                    otherwise(row)
                }
            })
        }
        Expr::Exists(field) => {
            let path = split_field(field);
            row_fn(move |row| Ok(Value::Boolean(!get_path(row, &path)?.is_missing())))
        }
        Expr::Missing(field) => {
            let path = split_field(field);
            row_fn(move |row| Ok(Value::Boolean(get_path(row, &path)?.is_missing())))
        }
        Expr::Prefix { field, prefix } => {
            let path = split_field(field);
            let prefix = prefix.clone();
            row_fn(move |row| {
                let value = get_path(row, &path)?;
                Ok(Value::Boolean(any_string(&value, |s| s.starts_with(prefix.as_str()))))
            })
        }
        Expr::Regex { field, pattern } => {
            let path = split_field(field);
            let regex = Regex::new(pattern).map_err(|e| CompilationError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            row_fn(move |row| {
                let value = get_path(row, &path)?;
                Ok(Value::Boolean(any_string(&value, |s| regex.is_match(s))))
            })
        }
        Expr::Arithmetic { op, left, right } => {
            let op = *op;
            let (left, right) = (build(left)?, build(right)?);
            row_fn(move |row| arithmetic(op, &left(row)?, &right(row)?))
        }
    };
    Ok(func)
}

/// Pins the closure signature so `?` and the row lifetime infer correctly.
fn row_fn<F>(f: F) -> Arc<RowFn>
where
    F: Fn(&Value) -> Result<Value, ExecutionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn build_all(terms: &[Expr]) -> Result<Vec<Arc<RowFn>>, CompilationError> {
    terms.iter().map(build).collect()
}

/// Comparison with multi-value semantics: an array on the left matches when
/// any element matches. Values of different shapes never compare.
fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    if op == CompareOp::Neq {
        return !compare(CompareOp::Eq, left, right);
    }

    if let Value::Array(items) = left
        && !matches!(right, Value::Array(_))
    {
        return items.iter().any(|item| compare(op, item, right));
    }

    match op {
        CompareOp::Eq => left.equals(right),
        _ => left.compare(right).is_some_and(|ordering| op.holds(ordering)),
    }
}

/// `needle in haystack`, where a scalar haystack is a one-element sequence
/// and an array needle matches when any of its elements is present.
fn contains(needle: &Value, haystack: &Value) -> bool {
    match (needle, haystack) {
        (Value::Array(items), _) => items.iter().any(|item| contains(item, haystack)),
        (_, Value::Null) => false,
        (_, Value::Array(items)) => items.iter().any(|item| needle.equals(item)),
        (_, scalar) => needle.equals(scalar),
    }
}

fn any_string(value: &Value, test: impl Fn(&str) -> bool) -> bool {
    match value {
        Value::String(s) => test(s),
        Value::Array(items) => items.iter().any(|item| item.as_str().is_some_and(&test)),
        _ => false,
    }
}

/// Arithmetic over numbers.
///
/// Integer pairs stay integers where the result is exact. Mixed pairs go
/// through decimal arithmetic so `0.1 + 2` is `2.1` and whole results come
/// back as integers. Null operands and division by zero give null.
fn arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> Result<Value, ExecutionError> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => Ok(integer_arithmetic(op, *a, *b)),
        (Value::Float(a), Value::Float(b)) => Ok(float_arithmetic(op, *a, *b)),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            if let Some(ad) = to_decimal(left)
                && let Some(bd) = to_decimal(right)
            {
                if bd.is_zero() && matches!(op, ArithmeticOp::Divide | ArithmeticOp::Modulo) {
                    return Ok(Value::Null);
                }
                let rd = match op {
                    ArithmeticOp::Add => ad.checked_add(bd),
                    ArithmeticOp::Subtract => ad.checked_sub(bd),
                    ArithmeticOp::Multiply => ad.checked_mul(bd),
                    ArithmeticOp::Divide => ad.checked_div(bd),
                    ArithmeticOp::Modulo => ad.checked_rem(bd),
                };
                if let Some(rd) = rd {
                    if rd.is_integer()
                        && let Some(r) = rd.to_i64()
                    {
                        return Ok(Value::Integer(r));
                    } else if let Some(r) = rd.to_f64() {
                        return Ok(Value::Float(r));
                    }
                }
            }
            let (a, b) = (left.as_float().unwrap_or(f64::NAN), right.as_float().unwrap_or(f64::NAN));
            Ok(float_arithmetic(op, a, b))
        }
        (a, b) => Err(ExecutionError::TypeError(format!(
            "Cannot {} {} and {}",
            op.name(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn integer_arithmetic(op: ArithmeticOp, a: i64, b: i64) -> Value {
    let exact = match op {
        ArithmeticOp::Add => a.checked_add(b),
        ArithmeticOp::Subtract => a.checked_sub(b),
        ArithmeticOp::Multiply => a.checked_mul(b),
        ArithmeticOp::Divide if b == 0 => return Value::Null,
        // exact division stays an integer
        ArithmeticOp::Divide if a.checked_rem(b) == Some(0) => a.checked_div(b),
        ArithmeticOp::Divide => return Value::Float(a as f64 / b as f64),
        ArithmeticOp::Modulo if b == 0 => return Value::Null,
        ArithmeticOp::Modulo => a.checked_rem(b),
    };
    match exact {
        Some(n) => Value::Integer(n),
        None => float_arithmetic(op, a as f64, b as f64),
    }
}

fn float_arithmetic(op: ArithmeticOp, a: f64, b: f64) -> Value {
    let result = match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Subtract => a - b,
        ArithmeticOp::Multiply => a * b,
        ArithmeticOp::Divide | ArithmeticOp::Modulo if b == 0.0 => return Value::Null,
        ArithmeticOp::Divide => a / b,
        ArithmeticOp::Modulo => a % b,
    };
    Value::Float(result)
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Integer(n) => Decimal::from_i64(*n),
        Value::Float(n) => Decimal::from_f64(*n),
        _ => None,
    }
}
