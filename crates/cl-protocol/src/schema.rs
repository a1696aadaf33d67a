//! Structural schema comparison
//!
//! The server announces its data schema in `Identify`; a member may only join
//! if its own schema has the same shape. Object key order is irrelevant,
//! array order is not.

use serde_json::{Number, Value};

/// Compare two schema descriptors structurally
///
/// Values of different JSON types never match. Objects match when they have
/// the same number of keys and every key matches recursively; arrays match
/// element by element. Numbers compare by value, so `1` matches `1.0`.
pub fn schema_matches(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter().all(|(key, value)| {
                    r.get(key)
                        .is_some_and(|other| schema_matches(value, other))
                })
        }
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| schema_matches(a, b))
        }
        (Value::Number(l), Value::Number(r)) => numbers_equal(l, r),
        _ => left == right,
    }
}

fn numbers_equal(l: &Number, r: &Number) -> bool {
    if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (l.as_u64(), r.as_u64()) {
        return a == b;
    }
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn symmetric(a: &Value, b: &Value) -> bool {
        let forward = schema_matches(a, b);
        assert_eq!(forward, schema_matches(b, a), "asymmetric for {} / {}", a, b);
        forward
    }

    #[test]
    fn test_reordered_keys_match() {
        let a = json!({"users": {"name": "string", "age": "number"}, "v": 1});
        let b = json!({"v": 1, "users": {"age": "number", "name": "string"}});
        assert!(symmetric(&a, &b));
    }

    #[test]
    fn test_key_count_mismatch() {
        let a = json!({"v": 1});
        let b = json!({"v": 1, "extra": null});
        assert!(!symmetric(&a, &b));

        let nested_a = json!({"t": {"a": 1}});
        let nested_b = json!({"t": {"a": 1, "b": 2}});
        assert!(!symmetric(&nested_a, &nested_b));
    }

    #[test]
    fn test_same_count_different_keys() {
        assert!(!symmetric(&json!({"a": 1}), &json!({"b": 1})));
    }

    #[test]
    fn test_type_mismatch_at_depth() {
        let a = json!({"t": {"a": [1, 2]}});
        let b = json!({"t": {"a": {"0": 1, "1": 2}}});
        assert!(!symmetric(&a, &b));
        assert!(!symmetric(&json!("1"), &json!(1)));
        assert!(!symmetric(&json!(null), &json!(false)));
    }

    #[test]
    fn test_arrays_are_ordered() {
        assert!(symmetric(&json!([1, "a", true]), &json!([1, "a", true])));
        assert!(!symmetric(&json!([1, 2]), &json!([2, 1])));
        assert!(!symmetric(&json!([1]), &json!([1, 1])));
    }

    #[test]
    fn test_number_equality() {
        assert!(symmetric(&json!(1), &json!(1.0)));
        assert!(!symmetric(&json!(1), &json!(2)));
        assert!(symmetric(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!symmetric(&json!(-1), &json!(u64::MAX)));
    }
}
