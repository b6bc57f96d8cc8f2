//! Deep overlay of annotation values
//!
//! Maps merge key by key and recurse; any other layer value (scalar, list,
//! null) replaces what was there. Lists are never concatenated.

use cairn_core::{Value, Values};
use serde_json::Map;

/// Overlay `layer` onto `target`. The layer wins on every scalar or list.
pub fn overlay_value(target: &mut Value, layer: Value) {
    match layer {
        Value::Object(map) => overlay_object(target, map),
        Value::Array(_) | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            *target = layer;
        }
    }
}

fn overlay_object(target: &mut Value, map: Map<String, Value>) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target_map) = target else {
        return;
    };
    for (key, value) in map {
        match target_map.get_mut(&key) {
            Some(existing) => overlay_value(existing, value),
            None => {
                target_map.insert(key, value);
            }
        }
    }
}

/// Overlay an annotation map onto another, key by key.
pub fn overlay_values(target: &mut Values, layer: Values) {
    for (key, value) in layer {
        match target.get_mut(&key) {
            Some(existing) => overlay_value(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_maps_recurse_and_later_wins() {
        let mut target = json!({ "a": { "x": 1, "y": 2 }, "b": "keep" });
        overlay_value(&mut target, json!({ "a": { "y": 3, "z": 4 } }));
        assert_eq!(target, json!({ "a": { "x": 1, "y": 3, "z": 4 }, "b": "keep" }));
    }

    #[test]
    fn test_lists_replace() {
        let mut target = json!({ "values": ["a", "b"] });
        overlay_value(&mut target, json!({ "values": ["c"] }));
        assert_eq!(target, json!({ "values": ["c"] }));
    }

    #[test]
    fn test_map_over_scalar() {
        let mut target = json!("scalar");
        overlay_value(&mut target, json!({ "k": true }));
        assert_eq!(target, json!({ "k": true }));
    }

    #[test]
    fn test_overlay_values() {
        let mut target: Values = [("label".to_string(), json!("Old")), ("keep".to_string(), json!(1))]
            .into_iter()
            .collect();
        let layer: Values = [("label".to_string(), json!("New"))].into_iter().collect();
        overlay_values(&mut target, layer);
        assert_eq!(target["label"], json!("New"));
        assert_eq!(target["keep"], json!(1));
    }
}
