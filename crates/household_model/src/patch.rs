//! JSON merge-patch helpers for partial updates
//!
//! Partial updates travel as JSON objects containing only the changed
//! fields. Applying one follows RFC 7396: objects merge recursively, `null`
//! removes a key and any other value replaces it.

use serde_json::{Map, Value};

/// Apply `patch` onto `target` in place
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Combine two successive patches into one equivalent patch.
///
/// Returns `None` when no single merge patch has the same effect on every
/// document: the first patch sets a key to a non-object and the second sets
/// it to an object, which applied at once would merge into whatever object
/// the document already held there.
pub fn compose_patches(first: &Value, second: &Value) -> Option<Value> {
    let (Value::Object(a), Value::Object(b)) = (first, second) else {
        return Some(second.clone());
    };

    let mut out = a.clone();
    for (key, value) in b {
        let merged = match (out.get(key), value) {
            (Some(prev @ Value::Object(_)), Value::Object(_)) => compose_patches(prev, value)?,
            (Some(_), Value::Object(_)) => return None,
            _ => value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    Some(Value::Object(out))
}

/// Append `next` to a journaled update payload.
///
/// The payload stays a single patch while the two compose, and otherwise
/// becomes an ordered array of patches for [`apply_patches`].
pub fn chain_patches(payload: &Value, next: &Value) -> Value {
    let mut patches = match payload {
        Value::Array(patches) => patches.clone(),
        single => vec![single.clone()],
    };
    match patches.last().and_then(|last| compose_patches(last, next)) {
        Some(composed) => {
            if let Some(last) = patches.last_mut() {
                *last = composed;
            }
        }
        None => patches.push(next.clone()),
    }

    if patches.len() == 1 {
        patches.remove(0)
    } else {
        Value::Array(patches)
    }
}

/// Apply a journaled update payload: one patch, or an array applied in order
pub fn apply_patches(target: &mut Value, payload: &Value) {
    match payload {
        Value::Array(patches) => {
            for patch in patches {
                merge_patch(target, patch);
            }
        }
        patch => merge_patch(target, patch),
    }
}

/// Patch that turns `from` into `to`.
///
/// Returns an empty object when the two documents are equal.
pub fn diff_patch(from: &Value, to: &Value) -> Value {
    match (from, to) {
        (Value::Object(a), Value::Object(b)) => {
            let mut out = Map::new();
            for key in a.keys() {
                if !b.contains_key(key) {
                    out.insert(key.clone(), Value::Null);
                }
            }
            for (key, value) in b {
                match a.get(key) {
                    Some(prev) if prev == value => {}
                    Some(prev @ Value::Object(_)) if value.is_object() => {
                        out.insert(key.clone(), diff_patch(prev, value));
                    }
                    _ => {
                        out.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(out)
        }
        _ => to.clone(),
    }
}

/// Whether applying `patch` would leave any document unchanged
pub fn is_empty_patch(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}

/// Top-level field names touched by a patch
pub fn patched_fields(patch: &Value) -> Vec<String> {
    match patch {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch_replaces_and_removes() {
        let mut doc = json!({ "name": "Ficus", "species": "F. lyrata", "tags": ["a"] });
        merge_patch(&mut doc, &json!({ "name": "Fig", "species": null }));
        assert_eq!(doc, json!({ "name": "Fig", "tags": ["a"] }));
    }

    #[test]
    fn test_merge_patch_nested_objects() {
        let mut doc = json!({ "meta": { "a": 1, "b": 2 } });
        merge_patch(&mut doc, &json!({ "meta": { "b": 3 } }));
        assert_eq!(doc, json!({ "meta": { "a": 1, "b": 3 } }));
    }

    #[test]
    fn test_merge_patch_non_object_patch_replaces() {
        let mut doc = json!({ "a": 1 });
        merge_patch(&mut doc, &json!([1, 2]));
        assert_eq!(doc, json!([1, 2]));
    }

    #[test]
    fn test_compose_patches_keeps_both_changes() {
        let first = json!({ "name": "Fig", "meta": { "a": 1 } });
        let second = json!({ "description": "Bright light", "meta": { "b": 2 } });
        let composed = compose_patches(&first, &second).unwrap();

        let mut sequential = json!({ "name": "Ficus" });
        merge_patch(&mut sequential, &first);
        merge_patch(&mut sequential, &second);

        let mut at_once = json!({ "name": "Ficus" });
        merge_patch(&mut at_once, &composed);

        assert_eq!(sequential, at_once);
    }

    #[test]
    fn test_object_after_scalar_does_not_compose() {
        let first = json!({ "meta": null });
        let second = json!({ "meta": { "b": 2, "c": null } });
        assert!(compose_patches(&first, &second).is_none());
        assert!(compose_patches(&json!({ "meta": 1 }), &second).is_none());
        assert!(compose_patches(&json!({ "x": { "meta": 1 } }), &json!({ "x": second })).is_none());
    }

    #[test]
    fn test_chained_patches_replace_nested_object() {
        let first = json!({ "name": "Fig", "meta": null });
        let second = json!({ "meta": { "b": 2, "c": null } });
        let payload = chain_patches(&first, &second);
        assert_eq!(payload, json!([first, second]));

        let mut sequential = json!({ "name": "Ficus", "meta": { "a": 1 } });
        merge_patch(&mut sequential, &first);
        merge_patch(&mut sequential, &second);

        let mut chained = json!({ "name": "Ficus", "meta": { "a": 1 } });
        apply_patches(&mut chained, &payload);
        assert_eq!(chained, sequential);
        assert_eq!(chained, json!({ "name": "Fig", "meta": { "b": 2 } }));

        // A later composable patch folds into the tail
        let payload = chain_patches(&payload, &json!({ "name": "Fig tree" }));
        assert_eq!(payload.as_array().map(Vec::len), Some(2));
        assert_eq!(payload[1]["name"], "Fig tree");
    }

    #[test]
    fn test_chain_patches_stays_single_when_composable() {
        let payload = chain_patches(&json!({ "name": "Fig" }), &json!({ "species": "F. carica" }));
        assert_eq!(payload, json!({ "name": "Fig", "species": "F. carica" }));
    }

    #[test]
    fn test_patched_fields() {
        let mut fields = patched_fields(&json!({ "name": "Fig", "updatedAt": "x" }));
        fields.sort();
        assert_eq!(fields, vec!["name".to_string(), "updatedAt".to_string()]);
    }

    #[test]
    fn test_diff_patch_minimal() {
        let from = json!({ "name": "Ficus", "species": "F. lyrata", "meta": { "a": 1, "b": 2 } });
        let to = json!({ "name": "Fig", "meta": { "a": 1, "b": 3 } });
        assert_eq!(
            diff_patch(&from, &to),
            json!({ "name": "Fig", "species": null, "meta": { "b": 3 } })
        );
        assert!(is_empty_patch(&diff_patch(&to, &to)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn flat_object() -> impl Strategy<Value = Value> {
            prop::collection::btree_map("[a-d]", "[a-z]{0,3}", 0..4)
                .prop_map(|m| serde_json::to_value(m).unwrap())
        }

        proptest! {
            #[test]
            fn compose_matches_sequential_application(
                base in flat_object(),
                first in flat_object(),
                second in flat_object(),
            ) {
                let mut sequential = base.clone();
                merge_patch(&mut sequential, &first);
                merge_patch(&mut sequential, &second);

                let mut at_once = base;
                // Flat string values always compose
                let composed = compose_patches(&first, &second);
                prop_assert!(composed.is_some());
                merge_patch(&mut at_once, &composed.unwrap_or_default());

                prop_assert_eq!(sequential, at_once);
            }

            #[test]
            fn diff_then_apply_reaches_target(from in flat_object(), to in flat_object()) {
                let mut doc = from.clone();
                merge_patch(&mut doc, &diff_patch(&from, &to));
                prop_assert_eq!(doc, to);
            }
        }
    }
}
