//! Helpers for working with database values.
//!
//! Database values are plain [`serde_json::Value`]s using the wire encoding
//! for priorities: a leaf with a priority is stored as
//! `{".value": v, ".priority": p}` and a map with a priority carries a
//! `".priority"` entry alongside its children.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::path::Path;

pub const PRIORITY_KEY: &str = ".priority";
pub const VALUE_KEY: &str = ".value";

/// In many places values are passed by reference and a null value needs to be
/// returned when a child is missing. Referencing this static avoids creating
/// temporaries in those cases.
pub static NULL_VARIANT: Value = Value::Null;

pub fn is_priority_key(key: &str) -> bool {
    key == PRIORITY_KEY
}

/// The value portion of a variant, unwrapping the `".value"` envelope a
/// priority-carrying leaf uses.
pub fn get_variant_value(variant: &Value) -> &Value {
    match variant.as_object().and_then(|map| map.get(VALUE_KEY)) {
        Some(value) => value,
        None => variant,
    }
}

fn get_variant_value_mut(variant: &mut Value) -> &mut Value {
    // Two-phase lookup to satisfy the borrow checker.
    let has_value_key = variant
        .as_object()
        .map(|map| map.contains_key(VALUE_KEY))
        .unwrap_or(false);
    if has_value_key {
        variant
            .as_object_mut()
            .and_then(|map| map.get_mut(VALUE_KEY))
            .expect("checked above")
    } else {
        variant
    }
}

/// The priority of a variant, or null if it has none.
pub fn get_variant_priority(variant: &Value) -> &Value {
    variant
        .as_object()
        .and_then(|map| map.get(PRIORITY_KEY))
        .unwrap_or(&NULL_VARIANT)
}

/// True if the effective value holds no children (scalars, and nulls wrapped
/// in a priority envelope).
pub fn variant_is_leaf(variant: &Value) -> bool {
    let value = get_variant_value(variant);
    !(value.is_object() || value.is_array())
}

/// True if the variant holds no data. A map whose only entry is a priority is
/// considered empty.
pub fn variant_is_empty(variant: &Value) -> bool {
    let value = get_variant_value(variant);
    match value {
        Value::Null => true,
        Value::Array(arr) => arr.is_empty(),
        Value::Object(map) => {
            map.is_empty() || (map.len() == 1 && map.contains_key(PRIORITY_KEY))
        }
        _ => false,
    }
}

fn variant_get_immediate_child<'a>(variant: &'a Value, key: &str) -> &'a Value {
    if is_priority_key(key) {
        return get_variant_priority(variant);
    }
    if variant_is_leaf(variant) {
        return &NULL_VARIANT;
    }
    variant
        .as_object()
        .and_then(|map| map.get(key))
        .unwrap_or(&NULL_VARIANT)
}

/// The child of a variant at a path, following the Firebase convention of
/// returning null (rather than failing) when the path does not exist.
pub fn variant_get_child<'a>(variant: &'a Value, path: &Path) -> &'a Value {
    let mut current = variant;
    for segment in path.segments() {
        if variant_is_leaf(current) {
            return if is_priority_key(segment) {
                get_variant_priority(current)
            } else {
                &NULL_VARIANT
            };
        }
        current = variant_get_immediate_child(current, segment);
    }
    current
}

pub fn variant_get_child_key<'a>(variant: &'a Value, key: &str) -> &'a Value {
    variant_get_child(variant, &Path::new(key))
}

/// Update the child of a variant at a path, creating intermediate maps as
/// needed and pruning maps that become empty. Writing a null deletes the
/// child; writing to a `".priority"` segment combines the priority into the
/// target.
pub fn variant_update_child(variant: &mut Value, path: &Path, value: &Value) {
    update_child_segments(variant, path.segments(), value);
}

pub fn variant_update_child_key(variant: &mut Value, key: &str, value: &Value) {
    variant_update_child(variant, &Path::new(key), value);
}

fn update_child_segments(variant: &mut Value, segments: &[String], value: &Value) {
    let Some(front) = segments.first() else {
        *variant = value.clone();
        return;
    };
    let rest = &segments[1..];

    if variant.is_null() {
        if is_priority_key(front) {
            combine_value_and_priority_in_place(variant, value);
            return;
        }
        let mut child = Value::Null;
        update_child_segments(&mut child, rest, value);
        if variant_is_empty(&child) {
            return;
        }
        let mut map = Map::new();
        map.insert(front.clone(), child);
        *variant = Value::Object(map);
    } else if variant_is_leaf(variant) || !variant.is_object() {
        if variant_is_empty(value) && !is_priority_key(front) {
            // A deep delete below a leaf changes nothing.
        } else if is_priority_key(front) {
            combine_value_and_priority_in_place(variant, value);
        } else {
            if !variant.is_object() {
                *variant = Value::Object(Map::new());
            }
            let map = variant.as_object_mut().expect("object ensured above");
            map.remove(VALUE_KEY);
            let mut child = map.remove(front.as_str()).unwrap_or(Value::Null);
            update_child_segments(&mut child, rest, value);
            if !variant_is_empty(&child) {
                map.insert(front.clone(), child);
            }
            if variant_is_empty(variant) {
                *variant = Value::Null;
            }
        }
    } else if is_priority_key(front) {
        combine_value_and_priority_in_place(variant, value);
    } else {
        let map = variant.as_object_mut().expect("non-leaf maps are objects");
        let mut child = map.remove(front.as_str()).unwrap_or(Value::Null);
        update_child_segments(&mut child, rest, value);
        if !variant_is_empty(&child) {
            map.insert(front.clone(), child);
        }
        if variant_is_empty(variant) {
            *variant = Value::Null;
        }
    }
}

/// The variant at `path`, or `None` if any step of the path is missing. Unlike
/// [`variant_get_child`] this distinguishes "absent" from "present but null".
pub fn get_internal_variant<'a>(variant: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = variant;
    for segment in path.segments() {
        current = get_internal_variant_key(current, segment)?;
    }
    Some(current)
}

pub fn get_internal_variant_key<'a>(variant: &'a Value, key: &str) -> Option<&'a Value> {
    let variant = if is_priority_key(key) {
        variant
    } else {
        get_variant_value(variant)
    };
    variant.as_object()?.get(key)
}

/// The variant at `path`, created (along with any intermediate maps) if it
/// does not exist.
pub fn make_variant_at_path<'a>(variant: &'a mut Value, path: &Path) -> &'a mut Value {
    let mut current = variant;
    for segment in path.segments() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("object ensured above");
        // A map with children no longer represents a wrapped leaf.
        map.remove(VALUE_KEY);
        current = map.entry(segment.clone()).or_insert(Value::Null);
    }
    current
}

pub fn set_variant_at_path(variant: &mut Value, path: &Path, value: &Value) {
    let target = make_variant_at_path(variant, path);
    if target.is_object() {
        if value.is_object() {
            let target_map = target.as_object_mut().expect("checked above");
            target_map.remove(VALUE_KEY);
            for (key, entry) in value.as_object().expect("checked above") {
                target_map.insert(key.clone(), entry.clone());
            }
        } else {
            *get_variant_value_mut(target) = value.clone();
        }
    } else {
        *target = value.clone();
    }
}

fn combine_value_and_priority_in_place(value: &mut Value, priority: &Value) {
    if variant_is_empty(value) {
        *value = Value::Null;
    } else if variant_is_empty(priority) {
        prune_priorities(value, false);
    } else {
        if !value.is_object() {
            let mut map = Map::new();
            map.insert(VALUE_KEY.to_string(), value.take());
            *value = Value::Object(map);
        }
        value
            .as_object_mut()
            .expect("object ensured above")
            .insert(PRIORITY_KEY.to_string(), priority.clone());
    }
}

/// Merge a value and a priority into the wire encoding. Null values swallow
/// the priority; null priorities strip one.
pub fn combine_value_and_priority(value: &Value, priority: &Value) -> Value {
    let mut result = value.clone();
    combine_value_and_priority_in_place(&mut result, priority);
    result
}

/// Remove the priority from a variant, unwrapping the `".value"` envelope if
/// one is present. With `recursive` the children are processed too.
pub fn prune_priorities(variant: &mut Value, recursive: bool) {
    if let Some(map) = variant.as_object_mut() {
        if let Some(value) = map.remove(VALUE_KEY) {
            *variant = value;
        } else {
            map.remove(PRIORITY_KEY);
        }
        if recursive {
            if let Some(map) = variant.as_object_mut() {
                for (_, child) in map.iter_mut() {
                    prune_priorities(child, true);
                }
            }
        }
    }
}

/// The children of a variant's effective value, skipping the special
/// `".priority"` entry.
pub fn get_effective_children(variant: &Value) -> Vec<(&String, &Value)> {
    let mut children = Vec::new();
    if let Some(map) = get_variant_value(variant).as_object() {
        for (key, child) in map {
            if !is_priority_key(key) && !key.as_str().eq(VALUE_KEY) {
                children.push((key, child));
            }
        }
    }
    children
}

pub fn count_effective_children(variant: &Value) -> usize {
    match get_variant_value(variant).as_object() {
        Some(map) => {
            map.len()
                - usize::from(map.contains_key(PRIORITY_KEY))
                - usize::from(map.contains_key(VALUE_KEY))
        }
        None => 0,
    }
}

/// Compare two child keys the way the database orders them: keys that parse
/// as integers sort numerically before all other keys.
pub fn child_key_compare(left: &str, right: &str) -> Ordering {
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => left.cmp(right),
    }
}

/// Compare two values by the database's type precedence
/// (null < bool < number < string < container), then within a type. Maps are
/// not ordered relative to each other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let value_a = get_variant_value(a);
    let value_b = get_variant_value(b);

    fn precedence(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    let precedence_a = precedence(value_a);
    let precedence_b = precedence(value_b);
    if precedence_a != precedence_b {
        return precedence_a.cmp(&precedence_b);
    }

    match (value_a, value_b) {
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Number(l), Value::Number(r)) => {
            if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
                l.cmp(&r)
            } else {
                let l = l.as_f64().unwrap_or(f64::NAN);
                let r = r.as_f64().unwrap_or(f64::NAN);
                l.partial_cmp(&r).unwrap_or(Ordering::Equal)
            }
        }
        (Value::String(l), Value::String(r)) => l.cmp(r),
        _ => Ordering::Equal,
    }
}

pub fn compare_priorities(a: &Value, b: &Value) -> Ordering {
    compare_values(get_variant_priority(a), get_variant_priority(b))
}

/// Deep equivalence with numeric coercion: `1` and `1.0` are equivalent, and
/// so are two maps whose entries are pairwise equivalent.
pub fn variants_are_equivalent(a: &Value, b: &Value) -> bool {
    if compare_values(a, b) != Ordering::Equal || compare_priorities(a, b) != Ordering::Equal {
        return false;
    }
    if let (Some(map_a), Some(map_b)) = (a.as_object(), b.as_object()) {
        if map_a.len() != map_b.len() {
            return false;
        }
        for ((key_a, value_a), (key_b, value_b)) in map_a.iter().zip(map_b.iter()) {
            if key_a != key_b || !variants_are_equivalent(value_a, value_b) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_child_returns_null_for_missing_paths() {
        let value = json!({"a": {"b": 1}});
        assert_eq!(variant_get_child(&value, &Path::new("a/b")), &json!(1));
        assert_eq!(variant_get_child(&value, &Path::new("a/x")), &Value::Null);
        assert_eq!(variant_get_child(&value, &Path::new("a/b/c")), &Value::Null);
        assert_eq!(variant_get_child(&value, &Path::root()), &value);
    }

    #[test]
    fn get_child_reads_priorities() {
        let leaf = json!({".value": 10, ".priority": 3});
        assert_eq!(variant_get_child(&leaf, &Path::new(".priority")), &json!(3));
        let map = json!({"a": 1, ".priority": "high"});
        assert_eq!(
            variant_get_child(&map, &Path::new(".priority")),
            &json!("high")
        );
    }

    #[test]
    fn update_child_builds_intermediate_maps() {
        let mut value = Value::Null;
        variant_update_child(&mut value, &Path::new("a/b/c"), &json!(1));
        assert_eq!(value, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn update_child_with_null_deletes_and_prunes() {
        let mut value = json!({"a": {"b": 1}, "z": 2});
        variant_update_child(&mut value, &Path::new("a/b"), &Value::Null);
        assert_eq!(value, json!({"z": 2}));

        let mut value = json!({"a": {"b": 1}});
        variant_update_child(&mut value, &Path::new("a/b"), &Value::Null);
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn update_child_replaces_leaves() {
        let mut value = json!("scalar");
        variant_update_child(&mut value, &Path::new("a"), &json!(1));
        assert_eq!(value, json!({"a": 1}));

        // Deleting below a leaf is a no-op.
        let mut value = json!("scalar");
        variant_update_child(&mut value, &Path::new("a"), &Value::Null);
        assert_eq!(value, json!("scalar"));
    }

    #[test]
    fn update_child_sets_priority_on_leaf() {
        let mut value = json!(42);
        variant_update_child(&mut value, &Path::new(".priority"), &json!(7));
        assert_eq!(value, json!({".value": 42, ".priority": 7}));

        variant_update_child(&mut value, &Path::new(".priority"), &Value::Null);
        assert_eq!(value, json!(42));
    }

    #[test]
    fn priority_on_empty_value_stays_null() {
        let mut value = Value::Null;
        variant_update_child(&mut value, &Path::new(".priority"), &json!(7));
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn internal_variant_distinguishes_absent_from_null() {
        let value = json!({"a": {"b": 1}});
        assert!(get_internal_variant(&value, &Path::new("a/b")).is_some());
        assert!(get_internal_variant(&value, &Path::new("a/x")).is_none());
        assert!(get_internal_variant(&value, &Path::new("x")).is_none());
    }

    #[test]
    fn make_variant_at_path_creates_maps() {
        let mut value = Value::Null;
        *make_variant_at_path(&mut value, &Path::new("a/b")) = json!(5);
        assert_eq!(value, json!({"a": {"b": 5}}));
    }

    #[test]
    fn leaf_and_empty_predicates() {
        assert!(variant_is_leaf(&json!(1)));
        assert!(variant_is_leaf(&json!({".value": 1, ".priority": 2})));
        assert!(!variant_is_leaf(&json!({"a": 1})));

        assert!(variant_is_empty(&Value::Null));
        assert!(variant_is_empty(&json!({})));
        assert!(variant_is_empty(&json!({".priority": 1})));
        assert!(!variant_is_empty(&json!({"a": 1})));
        assert!(!variant_is_empty(&json!(0)));
    }

    #[test]
    fn combine_value_and_priority_wraps_leaves() {
        assert_eq!(
            combine_value_and_priority(&json!(1), &json!("p")),
            json!({".value": 1, ".priority": "p"})
        );
        assert_eq!(
            combine_value_and_priority(&json!({"a": 1}), &json!(2)),
            json!({"a": 1, ".priority": 2})
        );
        assert_eq!(combine_value_and_priority(&Value::Null, &json!(2)), Value::Null);
        assert_eq!(combine_value_and_priority(&json!(1), &Value::Null), json!(1));
    }

    #[test]
    fn effective_children_skip_special_keys() {
        let value = json!({"a": 1, "b": 2, ".priority": 3});
        let children = get_effective_children(&value);
        assert_eq!(children.len(), 2);
        assert_eq!(count_effective_children(&value), 2);
        assert_eq!(count_effective_children(&json!({".value": 1, ".priority": 3})), 0);
        assert_eq!(count_effective_children(&json!(10)), 0);
    }

    #[test]
    fn child_keys_sort_numerically_before_strings() {
        assert_eq!(child_key_compare("2", "10"), Ordering::Less);
        assert_eq!(child_key_compare("10", "abc"), Ordering::Less);
        assert_eq!(child_key_compare("abc", "abd"), Ordering::Less);
        assert_eq!(child_key_compare("5", "5"), Ordering::Equal);
    }

    #[test]
    fn value_comparison_follows_type_precedence() {
        assert_eq!(compare_values(&Value::Null, &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(10), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!("z"), &json!({"a": 1})), Ordering::Less);
        assert_eq!(compare_values(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
        assert_eq!(
            compare_values(&json!({"a": 1}), &json!({"b": 2})),
            Ordering::Equal
        );
    }

    #[test]
    fn equivalence_coerces_numbers() {
        assert!(variants_are_equivalent(&json!(1), &json!(1.0)));
        assert!(variants_are_equivalent(
            &json!({"a": 1, "b": {"c": 2}}),
            &json!({"a": 1.0, "b": {"c": 2}})
        ));
        assert!(!variants_are_equivalent(&json!({"a": 1}), &json!({"a": 2})));
        assert!(!variants_are_equivalent(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!variants_are_equivalent(
            &json!({".value": 1, ".priority": 1}),
            &json!({".value": 1, ".priority": 2})
        ));
    }
}
