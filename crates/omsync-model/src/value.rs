//! Dynamic object-model values.
//!
//! Values are [`serde_json::Value`]: a closed tagged union of null, bool,
//! number, text, array and object. Objects keep first-seen key order.

pub use serde_json::{Map, Value};

/// Follow `path` through nested objects.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, segment| current.as_object()?.get(*segment))
}

/// Read a sequence counter.
pub fn as_counter(value: &Value) -> Option<i64> {
    value.as_i64()
}

/// `null`, `{}` and `[]` carry no data.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
