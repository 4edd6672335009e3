//! Helper functions for mock Kubernetes responses.

use serde_json::{json, Value};
use wiremock::ResponseTemplate;

/// A `Status` failure response as the API server sends it.
pub fn status_response(code: u16, reason: &str, message: &str) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	}))
}

pub fn list_response(items: Vec<Value>) -> ResponseTemplate {
	ResponseTemplate::new(200).set_body_json(json!({
		"kind": "List",
		"apiVersion": "v1",
		"metadata": {"resourceVersion": "1"},
		"items": items
	}))
}

/// Split a request path into its collection path and, for single-object
/// requests, the object name.
///
/// Under the `/api/v1` or `/apis/<group>/<version>` root, collection paths
/// have an odd number of segments (`pods`, `namespaces/x/pods`) and object
/// paths an even number (`pods/a`, `namespaces/x/pods/a`).
///
/// ```text
/// /api/v1/namespaces/default/configmaps/cfg -> (/api/v1/namespaces/default/configmaps, Some(cfg))
/// /apis/apps/v1/namespaces/default/deployments -> (/apis/apps/v1/namespaces/default/deployments, None)
/// /api/v1/namespaces/shop -> (/api/v1/namespaces, Some(shop))
/// ```
pub fn parse_resource_path(path: &str) -> (String, Option<String>) {
	let path = path.trim_end_matches('/');
	let root_segments = if path.starts_with("/apis/") { 3 } else { 2 };
	let segments = path.split('/').filter(|s| !s.is_empty()).count();
	let below_root = segments.saturating_sub(root_segments);

	if below_root > 0 && below_root % 2 == 0 {
		if let Some((collection, name)) = path.rsplit_once('/') {
			return (collection.to_string(), Some(name.to_string()));
		}
	}
	(path.to_string(), None)
}

/// Plural resource name: the last segment of a collection path.
pub fn plural_of(collection: &str) -> &str {
	collection.rsplit('/').next().unwrap_or(collection)
}
