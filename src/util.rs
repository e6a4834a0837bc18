//! Generic value conversion shared by every resource.
//!
//! Resources map between typed configuration models and JSON-shaped API
//! payloads. The helpers here cover both directions plus the flattened
//! dotted-key form used for diffing and for reconciling observed remote
//! state against the desired configuration.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::types::AttributeChange;

/// Flatten a JSON value into a dotted-key map of leaves.
///
/// Objects are recursed into; arrays and scalars are leaves. Null leaves are
/// dropped, so an absent key and an explicit null compare as equal. A literal
/// dotted key (`"index.number_of_shards"`) and the equivalent nested object
/// flatten to the same entry, which is exactly what settings reconciliation
/// relies on.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&path, val, out);
            }
        }
        Value::Null => {}
        leaf => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), leaf.clone());
            }
        }
    }
}

/// Rebuild a nested JSON object from a dotted-key map.
pub fn unflatten(map: &BTreeMap<String, Value>) -> Value {
    let mut root = Map::new();
    for (path, value) in map {
        let parts: Vec<&str> = path.split('.').collect();
        insert_path(&mut root, &parts, value);
    }
    Value::Object(root)
}

fn insert_path(obj: &mut Map<String, Value>, parts: &[&str], value: &Value) {
    match parts {
        [] => {}
        [leaf] => {
            obj.insert((*leaf).to_string(), value.clone());
        }
        [head, rest @ ..] => {
            let child = obj
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            // A shorter path may have claimed this node as a leaf; the
            // deeper structure wins.
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
    }
}

/// Diff two states in flattened form.
///
/// `prior = None` means a create: every planned leaf is an addition.
pub fn diff_flattened(prior: Option<&Value>, planned: &Value) -> Vec<AttributeChange> {
    let before = prior.map(flatten).unwrap_or_default();
    let after = flatten(planned);

    let mut changes = Vec::new();
    for (path, value) in &after {
        match before.get(path) {
            None => changes.push(AttributeChange::added(path, value.clone())),
            Some(prev) if prev != value => {
                changes.push(AttributeChange::modified(path, prev.clone(), value.clone()));
            }
            Some(_) => {}
        }
    }
    for (path, value) in &before {
        if !after.contains_key(path) {
            changes.push(AttributeChange::removed(path, value.clone()));
        }
    }
    changes
}

/// Drop observed leaves whose dotted path is absent from the desired value.
///
/// Remote APIs decorate objects with server-computed fields (uuids, creation
/// dates, resolved defaults). Keeping only the desired paths suppresses that
/// drift noise without a general diff/patch engine.
pub fn prune_undeclared(observed: &Value, desired: &Value) -> Value {
    let desired_keys = flatten(desired);
    let mut kept = flatten(observed);
    kept.retain(|path, _| desired_keys.contains_key(path));
    unflatten(&kept)
}

/// Semantic equality for JSON-normalized string attributes.
///
/// Two strings are equal when they parse to the same JSON value, regardless
/// of whitespace or key order. Unparseable input falls back to string
/// comparison.
pub fn normalized_eq(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<Value>(a),
        serde_json::from_str::<Value>(b),
    ) {
        (Ok(va), Ok(vb)) => va == vb,
        _ => a == b,
    }
}

/// Deserialize a state/config value into a typed model.
pub fn to_struct<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(value)?)
}

/// Serialize a typed model back into a state/config value.
pub fn from_struct<T: serde::Serialize>(model: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(model)?)
}

/// Fetch a required string attribute from a state value.
pub fn require_str<'a>(state: &'a Value, key: &str) -> Result<&'a str, ProviderError> {
    state
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Validation(format!("missing required attribute '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_recurses_objects_and_keeps_arrays_as_leaves() {
        let value = json!({
            "index": {
                "number_of_shards": "1",
                "lifecycle": {"name": "logs"}
            },
            "aliases": ["a", "b"],
            "empty": null
        });
        let flat = flatten(&value);

        assert_eq!(flat.get("index.number_of_shards"), Some(&json!("1")));
        assert_eq!(flat.get("index.lifecycle.name"), Some(&json!("logs")));
        assert_eq!(flat.get("aliases"), Some(&json!(["a", "b"])));
        assert!(!flat.contains_key("empty"));
    }

    #[test]
    fn dotted_literal_and_nested_flatten_identically() {
        let dotted = json!({"index.number_of_shards": "1"});
        let nested = json!({"index": {"number_of_shards": "1"}});
        assert_eq!(flatten(&dotted), flatten(&nested));
    }

    #[test]
    fn unflatten_round_trip() {
        let value = json!({
            "properties": {
                "message": {"type": "text"},
                "ts": {"type": "date"}
            }
        });
        assert_eq!(unflatten(&flatten(&value)), value);
    }

    #[test]
    fn diff_reports_added_modified_removed() {
        let prior = json!({"name": "a", "description": "old", "gone": true});
        let planned = json!({"name": "a", "description": "new", "fresh": 1});

        let changes = diff_flattened(Some(&prior), &planned);
        let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
        assert!(paths.contains(&"description"));
        assert!(paths.contains(&"fresh"));
        assert!(paths.contains(&"gone"));
        assert!(!paths.contains(&"name"));
    }

    #[test]
    fn diff_on_create_is_all_additions() {
        let planned = json!({"name": "a", "settings": {"k": "v"}});
        let changes = diff_flattened(None, &planned);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.before.is_none()));
    }

    #[test]
    fn diff_treats_null_as_absent() {
        let prior = json!({"name": "a", "description": null});
        let planned = json!({"name": "a"});
        assert!(diff_flattened(Some(&prior), &planned).is_empty());
    }

    #[test]
    fn prune_drops_server_computed_leaves() {
        let desired = json!({
            "index": {"number_of_shards": "1"}
        });
        let observed = json!({
            "index": {
                "number_of_shards": "1",
                "uuid": "gen-123",
                "creation_date": "1700000000"
            }
        });

        assert_eq!(prune_undeclared(&observed, &desired), desired);
    }

    #[test]
    fn normalized_eq_ignores_layout() {
        assert!(normalized_eq(
            r#"{"a": 1, "b": [2, 3]}"#,
            r#"{ "b":[2,3], "a": 1 }"#
        ));
        assert!(!normalized_eq(r#"{"a": 1}"#, r#"{"a": 2}"#));
        // Non-JSON falls back to plain comparison.
        assert!(normalized_eq("raw", "raw"));
        assert!(!normalized_eq("raw", "other"));
    }

    #[test]
    fn struct_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Model {
            name: String,
            enabled: bool,
        }

        let model = Model {
            name: "x".to_string(),
            enabled: true,
        };
        let value = from_struct(&model).unwrap();
        assert_eq!(value, json!({"name": "x", "enabled": true}));
        assert_eq!(to_struct::<Model>(value).unwrap(), model);
    }

    #[test]
    fn require_str_errors_on_missing() {
        let state = json!({"name": "idx"});
        assert_eq!(require_str(&state, "name").unwrap(), "idx");
        assert!(require_str(&state, "id").is_err());
    }
}
