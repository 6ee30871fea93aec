use crate::value::Value;

/// Deep-merge `incoming` into `existing`.
///
/// - object × object: union of keys; keys in `incoming` are merged
///   recursively, keys only in `existing` pass through.
/// - array × array: merged index by index up to the longer length, a
///   missing side counting as `null`. Arrays never shrink: trailing cached
///   elements survive until overwritten.
/// - anything else: `incoming` wins unless it is `null`.
///
/// Replacing a value wholesale is `merge(Value::Null, incoming)`.
pub fn merge(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (key, value) in patch {
                let current = base.get_mut(&key).map(Value::take).unwrap_or(Value::Null);
                base.insert(key, merge(current, value));
            }
            Value::Object(base)
        }
        (Value::Array(base), Value::Array(patch)) => {
            let len = base.len().max(patch.len());
            let mut base = base.into_iter();
            let mut patch = patch.into_iter();
            let merged = (0..len)
                .map(|_| {
                    merge(
                        base.next().unwrap_or(Value::Null),
                        patch.next().unwrap_or(Value::Null),
                    )
                })
                .collect();
            Value::Array(merged)
        }
        (existing, Value::Null) => existing,
        (_, incoming) => incoming,
    }
}
