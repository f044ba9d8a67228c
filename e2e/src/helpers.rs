use log::*;
use serde_json::Value;

/// True if every field in `part` is present in `complete` with the same value. Arrays must match element by element.
///
/// Panics if either string is not JSON. Only meant for test assertions.
pub fn json_is_subset_of(part: &str, complete: &str) -> bool {
    let part: Value = serde_json::from_str(part).expect("Invalid JSON in expected value");
    let complete: Value = serde_json::from_str(complete).expect("Invalid JSON in response");
    value_is_subset_of(&part, &complete)
}

pub fn value_is_subset_of(part: &Value, complete: &Value) -> bool {
    match (part, complete) {
        (Value::Null, _) => true,
        (Value::Object(fields), _) => fields.iter().all(|(key, value)| match complete.get(key) {
            Some(actual) => {
                let ok = value_is_subset_of(value, actual);
                if !ok {
                    error!("Field {key}: expected {value}, got {actual}");
                }
                ok
            },
            None => {
                error!("Field {key} is missing");
                false
            },
        }),
        (Value::Array(expected), Value::Array(actual)) => {
            if expected.len() != actual.len() {
                error!("Expected {} elements, got {}", expected.len(), actual.len());
                return false;
            }
            expected.iter().zip(actual).all(|(p, c)| value_is_subset_of(p, c))
        },
        (Value::Array(_), _) => {
            error!("Expected an array, got {complete}");
            false
        },
        // Money is serialized as a float, so 250 and 250.0 are the same amount
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => part == complete,
    }
}
