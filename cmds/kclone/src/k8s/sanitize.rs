//! Stripping cluster-assigned state from objects read out of a cluster.
//!
//! An object read from the source carries identity and bookkeeping that the
//! destination API server refuses (or would misinterpret) on create. Only the
//! name, labels and annotations survive; the namespace is rewritten.

use k8s_openapi::{
	api::{
		apps::v1::Deployment,
		core::v1::{ConfigMap, PersistentVolume, PersistentVolumeClaim, Secret, Service},
	},
	apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::Resource;

use crate::selection::ResourceKind;

/// Reduce metadata to `{name, namespace, labels, annotations}`.
pub fn sanitize_metadata(meta: &mut ObjectMeta, namespace: Option<&str>) {
	*meta = ObjectMeta {
		name: meta.name.take(),
		namespace: namespace.map(str::to_owned),
		labels: meta.labels.take(),
		annotations: meta.annotations.take(),
		..ObjectMeta::default()
	};
}

/// A kind that kclone copies between namespaces.
pub trait MigratedResource: Resource<DynamicType = ()> {
	const KIND: ResourceKind;

	/// Drop `status` and any spec fields the destination cluster must assign.
	fn clear_cluster_state(&mut self);

	/// Prepare the object for creation in `namespace`.
	fn sanitize(&mut self, namespace: &str) {
		sanitize_metadata(self.meta_mut(), Some(namespace));
		self.clear_cluster_state();
	}
}

impl MigratedResource for ConfigMap {
	const KIND: ResourceKind = ResourceKind::ConfigMap;

	fn clear_cluster_state(&mut self) {}
}

impl MigratedResource for Secret {
	const KIND: ResourceKind = ResourceKind::Secret;

	fn clear_cluster_state(&mut self) {}
}

impl MigratedResource for Service {
	const KIND: ResourceKind = ResourceKind::Service;

	fn clear_cluster_state(&mut self) {
		self.status = None;
		// Cluster IPs are allocated per cluster.
		if let Some(spec) = self.spec.as_mut() {
			spec.cluster_ip = None;
			spec.cluster_ips = None;
		}
	}
}

impl MigratedResource for Deployment {
	const KIND: ResourceKind = ResourceKind::Deployment;

	fn clear_cluster_state(&mut self) {
		self.status = None;
	}
}

impl MigratedResource for PersistentVolumeClaim {
	const KIND: ResourceKind = ResourceKind::PersistentVolumeClaim;

	fn clear_cluster_state(&mut self) {
		self.status = None;
	}
}

/// Prepare a claim for the destination.
///
/// `volumeName` is dropped so the destination provisioner binds a fresh volume,
/// unless the caller binds the claim to a volume it created itself.
pub fn sanitize_claim(claim: &mut PersistentVolumeClaim, namespace: &str, keep_volume_name: bool) {
	claim.sanitize(namespace);
	if !keep_volume_name {
		if let Some(spec) = claim.spec.as_mut() {
			spec.volume_name = None;
		}
	}
	claim.status = None;
}

/// Prepare a cluster-scoped volume to be re-created under `new_name`.
///
/// The claim reference is cleared so a new claim can bind to it.
pub fn sanitize_volume(volume: &mut PersistentVolume, new_name: &str) {
	sanitize_metadata(&mut volume.metadata, None);
	volume.metadata.name = Some(new_name.to_string());
	volume.status = None;
	if let Some(spec) = volume.spec.as_mut() {
		spec.claim_ref = None;
	}
}

#[cfg(test)]
mod tests {
	use k8s_openapi::api::core::v1::{HostPathVolumeSource, ObjectReference};
	use rstest::rstest;
	use serde::de::DeserializeOwned;
	use serde_json::{json, Value};

	use super::*;

	const SYSTEM_FIELDS: [&str; 7] = [
		"uid",
		"resourceVersion",
		"creationTimestamp",
		"selfLink",
		"generation",
		"ownerReferences",
		"managedFields",
	];

	/// Build a typed object as the API server would return it.
	fn fetched<K: DeserializeOwned>(api_version: &str, kind: &str, name: &str, body: Value) -> K {
		let mut manifest = json!({
			"apiVersion": api_version,
			"kind": kind,
			"metadata": {
				"name": name,
				"namespace": "source",
				"uid": "0b9f6c1e-1234",
				"resourceVersion": "42",
				"creationTimestamp": "2024-01-01T00:00:00Z",
				"selfLink": "/api/v1/namespaces/source/x",
				"generation": 3,
				"ownerReferences": [{
					"apiVersion": "v1",
					"kind": "Pod",
					"name": "owner",
					"uid": "5678"
				}],
				"managedFields": [{"manager": "kubectl", "operation": "Apply"}],
				"labels": {"app": "web"},
				"annotations": {"note": "keep"}
			}
		});
		if let (Some(target), Value::Object(extra)) = (manifest.as_object_mut(), body) {
			target.extend(extra);
		}
		serde_json::from_value(manifest).unwrap()
	}

	fn service_with_ip() -> Service {
		fetched(
			"v1",
			"Service",
			"svc-a",
			json!({
				"spec": {"clusterIP": "10.0.0.5", "clusterIPs": ["10.0.0.5"], "type": "ClusterIP"},
				"status": {"loadBalancer": {}}
			}),
		)
	}

	fn deployment() -> Deployment {
		fetched(
			"apps/v1",
			"Deployment",
			"dep-a",
			json!({
				"spec": {"replicas": 2, "selector": {"matchLabels": {"app": "web"}}, "template": {}},
				"status": {"replicas": 2}
			}),
		)
	}

	fn bound_claim() -> PersistentVolumeClaim {
		fetched(
			"v1",
			"PersistentVolumeClaim",
			"data",
			json!({
				"spec": {"storageClassName": "standard", "volumeName": "pv-1"},
				"status": {"phase": "Bound"}
			}),
		)
	}

	fn sanitized_value<K: MigratedResource + serde::Serialize>(mut object: K) -> Value {
		object.sanitize("dest");
		serde_json::to_value(&object).unwrap()
	}

	#[rstest]
	#[case::config_map(sanitized_value(fetched::<ConfigMap>("v1", "ConfigMap", "cfg-a", json!({"data": {"k": "v"}}))))]
	#[case::secret(sanitized_value(fetched::<Secret>("v1", "Secret", "sec-a", json!({}))))]
	#[case::service(sanitized_value(service_with_ip()))]
	#[case::deployment(sanitized_value(deployment()))]
	#[case::claim(sanitized_value(bound_claim()))]
	fn test_sanitize_strips_system_fields(#[case] value: Value) {
		let meta = value.get("metadata").and_then(Value::as_object).unwrap();
		for field in SYSTEM_FIELDS {
			assert!(!meta.contains_key(field), "{field} survived sanitize");
		}
		assert_eq!(meta.get("namespace").and_then(Value::as_str), Some("dest"));
		assert!(value.get("status").is_none());
	}

	#[test]
	fn test_sanitize_keeps_name_labels_annotations() {
		let mut cm: ConfigMap = fetched("v1", "ConfigMap", "cfg-a", json!({"data": {"k": "v"}}));
		cm.sanitize("dest");

		assert_eq!(cm.metadata.name.as_deref(), Some("cfg-a"));
		assert_eq!(cm.metadata.labels.as_ref().unwrap()["app"], "web");
		assert_eq!(cm.metadata.annotations.as_ref().unwrap()["note"], "keep");
		assert_eq!(cm.data.as_ref().unwrap()["k"], "v");
	}

	#[test]
	fn test_sanitize_empty_metadata() {
		let mut secret = Secret::default();
		secret.sanitize("dest");
		assert_eq!(secret.metadata.namespace.as_deref(), Some("dest"));
		assert_eq!(secret.metadata.name, None);
		assert_eq!(secret.metadata.labels, None);
	}

	#[test]
	fn test_sanitize_service_drops_cluster_ips_only() {
		let mut svc = service_with_ip();
		svc.sanitize("dest");

		let spec = svc.spec.unwrap();
		assert_eq!(spec.cluster_ip, None);
		assert_eq!(spec.cluster_ips, None);
		assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
	}

	#[test]
	fn test_sanitize_leaves_other_specs_alone() {
		let before = deployment();
		let mut after = before.clone();
		after.sanitize("dest");
		assert_eq!(after.spec, before.spec);
	}

	#[test]
	fn test_sanitize_is_idempotent() {
		let mut once = service_with_ip();
		once.sanitize("dest");
		let mut twice = once.clone();
		twice.sanitize("other");

		assert_eq!(twice.metadata.namespace.as_deref(), Some("other"));
		twice.metadata.namespace = once.metadata.namespace.clone();
		assert_eq!(once, twice);
	}

	#[test]
	fn test_sanitize_claim_drops_volume_name() {
		let mut claim = bound_claim();
		sanitize_claim(&mut claim, "dest", false);
		let spec = claim.spec.unwrap();
		assert_eq!(spec.volume_name, None);
		assert_eq!(spec.storage_class_name.as_deref(), Some("standard"));
		assert_eq!(claim.status, None);
	}

	#[test]
	fn test_sanitize_claim_keeps_volume_name_on_request() {
		let mut claim = bound_claim();
		sanitize_claim(&mut claim, "dest", true);
		assert_eq!(claim.spec.unwrap().volume_name.as_deref(), Some("pv-1"));
		assert_eq!(claim.status, None);
	}

	#[test]
	fn test_sanitize_volume() {
		let mut volume: PersistentVolume = fetched(
			"v1",
			"PersistentVolume",
			"pv-1",
			json!({
				"spec": {
					"storageClassName": "manual",
					"claimRef": {"name": "data", "namespace": "source"},
					"hostPath": {"path": "/mnt/data"}
				},
				"status": {"phase": "Bound"}
			}),
		);
		sanitize_volume(&mut volume, "migrated-pv-1-1");

		assert_eq!(volume.metadata.name.as_deref(), Some("migrated-pv-1-1"));
		assert_eq!(volume.metadata.namespace, None);
		assert_eq!(volume.metadata.uid, None);
		assert_eq!(volume.status, None);
		let spec = volume.spec.unwrap();
		assert_eq!(spec.claim_ref, None::<ObjectReference>);
		assert_eq!(
			spec.host_path,
			Some(HostPathVolumeSource {
				path: "/mnt/data".to_string(),
				type_: None,
			})
		);
	}
}
