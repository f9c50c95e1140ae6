//! Deep merge of JSON documents
//!
//! Objects merge key by key; anything else is replaced wholesale by the
//! override, including arrays.

use serde_json::{Map, Value};

/// Merge `overrides` onto `base`, returning a new document.
///
/// Neither input is modified. Keys only present in `base` are kept, keys only
/// present in `overrides` are added.
pub fn merge(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            Value::Object(merge_maps(base, overrides))
        }
        _ => overrides.clone(),
    }
}

/// Object-level merge used by the injector, which holds overrides as a map
pub fn merge_maps(base: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut result = base.clone();

    for (key, value) in overrides {
        let merged = match (result.get(key), value) {
            (Some(existing @ Value::Object(_)), Value::Object(_)) => merge(existing, value),
            _ => value.clone(),
        };
        result.insert(key.clone(), merged);
    }

    result
}
