// ============================================================================
// observable-collections - JSON Helpers
// Name-based field access, cloning and merging through serde
// ============================================================================
//
// The collections prefer closures (key extractors, sort keys) and the `Merge`
// trait. These helpers back the name-based variants for values that only
// offer `Serialize`/`Deserialize`.
// ============================================================================

use std::cmp::Ordering;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use crate::core::error::Result;

/// Deep clone through a JSON round trip.
///
/// ```
/// use observable_collections::json::clone_json;
///
/// let original = vec![1, 2, 3];
/// let copy: Vec<i32> = clone_json(&original).unwrap();
/// assert_eq!(copy, original);
/// ```
pub fn clone_json<T>(source: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    Ok(serde_json::from_value(serde_json::to_value(source)?)?)
}

/// Copy every field `source` serializes onto `target`.
///
/// Fields the source omits when serializing (for example through
/// `skip_serializing_if`) keep the target's value.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use observable_collections::json::merge_json;
///
/// #[derive(Serialize, Deserialize, Debug, PartialEq)]
/// struct Device {
///     id: u32,
///     #[serde(skip_serializing_if = "Option::is_none")]
///     name: Option<String>,
///     online: bool,
/// }
///
/// let mut stored = Device { id: 1, name: Some("core".into()), online: false };
/// let update = Device { id: 1, name: None, online: true };
///
/// merge_json(&mut stored, &update).unwrap();
/// assert_eq!(stored, Device { id: 1, name: Some("core".into()), online: true });
/// ```
pub fn merge_json<T>(target: &mut T, source: &T) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(&*target)?;
    match (&mut merged, serde_json::to_value(source)?) {
        (Value::Object(fields), Value::Object(incoming)) => {
            for (name, value) in incoming {
                fields.insert(name, value);
            }
        }
        (slot, incoming) => *slot = incoming,
    }
    *target = serde_json::from_value(merged)?;
    Ok(())
}

/// Read the field `name` from the serialized form of `value`.
///
/// Returns `None` when the value does not serialize to an object or the
/// object has no such field. A present field holding `null` comes back as
/// `Some(Value::Null)`.
pub fn field_value<T>(value: &T, name: &str) -> Result<Option<Value>>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(value)? {
        Value::Object(mut fields) => Ok(fields.remove(name)),
        _ => Ok(None),
    }
}

/// Natural ordering over JSON values.
///
/// Values of different kinds order as null < bool < number < string < array
/// < object. Arrays compare element-wise, objects compare equal.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => Ordering::Equal,
        _ => rank(a).cmp(&rank(b)),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    let a = x.as_f64().unwrap_or(f64::NAN);
    let b = y.as_f64().unwrap_or(f64::NAN);
    a.total_cmp(&b)
}

// =============================================================================
// TESTS
// =============================================================================
