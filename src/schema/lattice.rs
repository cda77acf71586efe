use std::fmt;

use crate::value::Value;

/// The shape a column has been observed to hold.
///
/// Declaration order matters: among the numeric scalars it is the widening
/// order `boolean < integer < long < float < double`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JsonType {
    /// No value observed yet (null, or an empty array)
    Undefined,
    Boolean,
    /// Integer that fits in 32 bits
    Integer,
    /// Integer that needs 64 bits
    Long,
    Float,
    Double,
    String,
    /// A single object; its properties are columns of their own
    Object,
    /// An array of objects (a repeated group)
    Nested,
}

impl JsonType {
    pub const ALL: [JsonType; 9] = [
        JsonType::Undefined,
        JsonType::Boolean,
        JsonType::Integer,
        JsonType::Long,
        JsonType::Float,
        JsonType::Double,
        JsonType::String,
        JsonType::Object,
        JsonType::Nested,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JsonType::Undefined => "undefined",
            JsonType::Boolean => "boolean",
            JsonType::Integer => "integer",
            JsonType::Long => "long",
            JsonType::Float => "float",
            JsonType::Double => "double",
            JsonType::String => "string",
            JsonType::Object => "object",
            JsonType::Nested => "nested",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, JsonType::Undefined | JsonType::Object | JsonType::Nested)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, JsonType::Object | JsonType::Nested)
    }

    /// Classify a single value. Arrays classify as `nested`; callers that
    /// want multi-valued scalar columns classify the elements instead.
    pub fn of(value: &Value) -> JsonType {
        match value {
            Value::Null => JsonType::Undefined,
            Value::Boolean(_) => JsonType::Boolean,
            Value::Integer(n) if i32::try_from(*n).is_ok() => JsonType::Integer,
            Value::Integer(_) => JsonType::Long,
            Value::Float(_) => JsonType::Double,
            Value::String(_) => JsonType::String,
            Value::Object(_) => JsonType::Object,
            Value::Array(_) => JsonType::Nested,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Combine two observed shapes of the same column.
///
/// Returns `None` when a scalar meets a structured type: a column can not be
/// both. Callers must report that as a schema conflict.
///
/// ```
/// use jx::schema::{merge, JsonType};
///
/// assert_eq!(merge(JsonType::Integer, JsonType::Double), Some(JsonType::Double));
/// assert_eq!(merge(JsonType::Long, JsonType::Float), Some(JsonType::Double));
/// assert_eq!(merge(JsonType::Integer, JsonType::String), Some(JsonType::String));
/// assert_eq!(merge(JsonType::Integer, JsonType::Object), None);
/// ```
pub fn merge(a: JsonType, b: JsonType) -> Option<JsonType> {
    use JsonType::*;

    match (a, b) {
        (Undefined, t) | (t, Undefined) => Some(t),
        (Object, Object) => Some(Object),
        (Object | Nested, Object | Nested) => Some(Nested),
        (Object | Nested, _) | (_, Object | Nested) => None,
        (String, _) | (_, String) => Some(String),
        // 64-bit integers do not fit a 32-bit float mantissa
        (Long, Float) | (Float, Long) => Some(Double),
        (a, b) => Some(a.max(b)),
    }
}
