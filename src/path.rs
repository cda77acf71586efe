use crate::{compiler::ExecutionError, value::Value};

/// A field path: the names walked from the row root down to a value.
///
/// The dotted name `"user.address.city"` becomes
/// `["user", "address", "city"]`. The whole row (`"."`) is the empty path.
pub type Path = Vec<String>;

/// Split a dotted field name into its path segments.
///
/// A literal dot inside a field name is written `\.`.
///
/// ```
/// use jx::path::split_field;
///
/// assert_eq!(split_field("a.b"), vec!["a", "b"]);
/// assert_eq!(split_field(r"version\.major"), vec!["version.major"]);
/// assert!(split_field(".").is_empty());
/// ```
pub fn split_field(field: &str) -> Path {
    if field == "." || field.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = field.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    segments.push(current);
    segments.retain(|s| !s.is_empty());
    segments
}

/// Inverse of [`split_field`].
pub fn join_field(path: &[String]) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    path.iter()
        .map(|s| s.replace('.', "\\."))
        .collect::<Vec<_>>()
        .join(".")
}

/// Read the value at `path`.
///
/// Missing fields (and fields below a null) read as null. Reading through an
/// array collects the field from every element, which is how multi-valued
/// columns surface. Reading a field of a scalar is an access error.
pub fn get_path(current: &Value, path: &[String]) -> Result<Value, ExecutionError> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(current.clone());
    };

    match current {
        Value::Null => Ok(Value::Null),
        Value::Object(map) => match map.get(head) {
            Some(child) => get_path(child, rest),
            None => Ok(Value::Null),
        },
        Value::Array(items) => {
            let mut collected = Vec::new();
            for item in items {
                match get_path(item, path)? {
                    Value::Null => {}
                    Value::Array(inner) => collected.extend(inner),
                    other => collected.push(other),
                }
            }
            if collected.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Array(collected))
            }
        }
        other => Err(ExecutionError::AccessError(format!(
            "Cannot read field '{}' of {}",
            head,
            other.type_name()
        ))),
    }
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Null intermediates are replaced by objects; scalar or array
/// intermediates are an access error.
pub fn set_path(current: &mut Value, path: &[String], value: Value) -> Result<(), ExecutionError> {
    let Some((head, rest)) = path.split_first() else {
        *current = value;
        return Ok(());
    };

    if current.is_null() {
        *current = Value::Object(Default::default());
    }

    match current {
        Value::Object(map) => {
            if rest.is_empty() {
                map.insert(head.clone(), value);
                Ok(())
            } else {
                let child = map.entry(head.clone()).or_insert(Value::Null);
                set_path(child, rest, value)
            }
        }
        other => Err(ExecutionError::AccessError(format!(
            "Cannot set field '{}' on {}",
            head,
            other.type_name()
        ))),
    }
}
