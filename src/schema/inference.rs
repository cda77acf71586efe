use crate::{
    path::join_field,
    schema::{JsonType, Schema, SchemaConflictError, merge},
    value::Value,
};

/// Scan `rows` and widen `schema` with every leaf observed.
///
/// `prefix` is the path of the object the rows live in, `nested_path` the
/// chain of enclosing arrays (outermost first).
pub(crate) fn infer_rows<'a>(
    schema: &mut Schema,
    rows: impl IntoIterator<Item = &'a Value>,
    prefix: &[String],
    nested_path: &[String],
) -> Result<(), SchemaConflictError> {
    for row in rows {
        match row {
            Value::Null => {}
            Value::Object(map) => {
                for (name, value) in map {
                    let mut full = prefix.to_vec();
                    full.push(name.clone());
                    infer_field(schema, &full, value, nested_path)?;
                }
            }
            other => schema.observe(&join_field(prefix), JsonType::of(other), nested_path)?,
        }
    }
    Ok(())
}

fn infer_field(
    schema: &mut Schema,
    full: &[String],
    value: &Value,
    nested_path: &[String],
) -> Result<(), SchemaConflictError> {
    let name = join_field(full);

    match value {
        Value::Array(items) => {
            let element_type = element_type(&name, items)?;
            if !element_type.is_structured() {
                // array of scalars: a multi-valued column at this depth
                return schema.observe(&name, element_type, nested_path);
            }

            schema.observe(&name, JsonType::Nested, nested_path)?;
            let mut deeper = nested_path.to_vec();
            deeper.push(name);
            let objects = items.iter().filter(|item| matches!(item, Value::Object(_)));
            infer_rows(schema, objects, full, &deeper)
        }
        Value::Object(_) => {
            schema.observe(&name, JsonType::Object, nested_path)?;
            infer_rows(schema, std::iter::once(value), full, nested_path)
        }
        scalar => schema.observe(&name, JsonType::of(scalar), nested_path),
    }
}

/// Merged type of all elements; empty arrays stay `undefined`.
fn element_type(name: &str, items: &[Value]) -> Result<JsonType, SchemaConflictError> {
    let mut merged = JsonType::Undefined;
    for item in items {
        let existing = merged;
        let observed = JsonType::of(item);
        merged = merge(existing, observed).ok_or_else(|| SchemaConflictError {
            column: name.to_string(),
            existing,
            observed,
        })?;
    }
    Ok(merged)
}
