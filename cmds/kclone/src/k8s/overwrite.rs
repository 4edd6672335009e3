//! Merging a partial `spec` onto an object before it is created.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::selection::OverwriteSpec;

/// Keys never copied from an overwrite, at any depth.
pub const RESERVED_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

fn is_reserved(key: &str) -> bool {
	RESERVED_KEYS.contains(&key)
}

/// Merge `source` into `target`.
///
/// Maps on both sides merge key by key; any other pairing replaces the target
/// value, so arrays, scalars and `null` overwrite outright.
pub fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
	for (key, value) in source {
		if is_reserved(key) {
			continue;
		}
		let Value::Object(incoming) = value else {
			target.insert(key.clone(), value.clone());
			continue;
		};
		if let Some(Value::Object(existing)) = target.get_mut(key) {
			deep_merge(existing, incoming);
			continue;
		}
		let mut fresh = Map::new();
		deep_merge(&mut fresh, incoming);
		target.insert(key.clone(), Value::Object(fresh));
	}
}

/// Merge `overwrite` onto the `spec` of a JSON object, creating `spec` if absent.
///
/// Other top-level fields are left alone. Does nothing if `object` is not a map.
pub fn apply_overwrite(object: &mut Value, overwrite: &OverwriteSpec) {
	let Some(fields) = object.as_object_mut() else {
		return;
	};
	let spec = fields
		.entry("spec")
		.or_insert_with(|| Value::Object(Map::new()));
	if !spec.is_object() {
		*spec = Value::Object(Map::new());
	}
	if let Value::Object(spec) = spec {
		deep_merge(spec, overwrite);
	}
}

/// Apply an overwrite to a typed object by round-tripping it through JSON.
pub fn overwrite_resource<K>(object: &K, overwrite: &OverwriteSpec) -> Result<K, serde_json::Error>
where
	K: Serialize + DeserializeOwned,
{
	let mut value = serde_json::to_value(object)?;
	apply_overwrite(&mut value, overwrite);
	serde_json::from_value(value)
}
