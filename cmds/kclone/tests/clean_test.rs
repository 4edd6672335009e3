//! Integration tests for Cleaner using HTTP mock server.

use assert_matches::assert_matches;
use k8s_mock::HttpMockK8sServer;
use kclone::{
	clean::Cleaner,
	k8s::client::ClusterEndpoint,
	report::{Action, MemoryReporter, Outcome},
	selection::{ResourceKind, ResourceSelection},
};
use serde_json::{json, Value};

fn object(api_version: &str, kind: &str, name: &str) -> Value {
	json!({
		"apiVersion": api_version,
		"kind": kind,
		"metadata": {"name": name, "namespace": "shop"}
	})
}

fn deleted(kind: ResourceKind, name: &str) -> Outcome {
	Outcome::Deleted {
		kind,
		name: name.to_string(),
	}
}

#[tokio::test]
async fn test_deletes_consumers_first() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![
			object("v1", "Secret", "credentials"),
			object("v1", "ConfigMap", "settings"),
			object("v1", "PersistentVolumeClaim", "data"),
			object("v1", "Service", "web"),
			object("apps/v1", "Deployment", "web"),
			object("v1", "ConfigMap", "untouched"),
		])
		.build()
		.start()
		.await;
	let endpoint = ClusterEndpoint::connect_with_kubeconfig(Some("mock-context"), server.kubeconfig())
		.await
		.unwrap();
	let selection = ResourceSelection::new()
		.with(ResourceKind::Secret, ["credentials"])
		.unwrap()
		.with(ResourceKind::ConfigMap, ["settings"])
		.unwrap()
		.with(ResourceKind::PersistentVolumeClaim, ["data"])
		.unwrap()
		.with(ResourceKind::Service, ["web"])
		.unwrap()
		.with(ResourceKind::Deployment, ["web"])
		.unwrap();
	let reporter = MemoryReporter::new();

	let report = Cleaner::new(endpoint, &reporter)
		.clean_resources("shop", &selection)
		.await;

	assert_eq!(
		reporter.outcomes(),
		vec![
			deleted(ResourceKind::Deployment, "web"),
			deleted(ResourceKind::Service, "web"),
			deleted(ResourceKind::PersistentVolumeClaim, "data"),
			deleted(ResourceKind::ConfigMap, "settings"),
			deleted(ResourceKind::Secret, "credentials"),
		]
	);
	assert!(!report.has_failures());
	assert_eq!(
		server.paths_of("DELETE").await,
		vec![
			"/apis/apps/v1/namespaces/shop/deployments/web",
			"/api/v1/namespaces/shop/services/web",
			"/api/v1/namespaces/shop/persistentvolumeclaims/data",
			"/api/v1/namespaces/shop/configmaps/settings",
			"/api/v1/namespaces/shop/secrets/credentials",
		]
	);
	assert_eq!(server.names("/api/v1/namespaces/shop/configmaps"), vec!["untouched"]);
}

#[tokio::test]
async fn test_missing_object_is_a_failure() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![object("v1", "Secret", "credentials")])
		.build()
		.start()
		.await;
	let endpoint = ClusterEndpoint::connect_with_kubeconfig(Some("mock-context"), server.kubeconfig())
		.await
		.unwrap();
	let selection = ResourceSelection::new()
		.with(ResourceKind::ConfigMap, ["gone"])
		.unwrap()
		.with(ResourceKind::Secret, ["credentials"])
		.unwrap();
	let reporter = MemoryReporter::new();

	let report = Cleaner::new(endpoint, &reporter)
		.clean_resources("shop", &selection)
		.await;

	let outcomes = reporter.outcomes();
	assert_eq!(outcomes.len(), 2);
	assert_matches!(
		&outcomes[0],
		Outcome::Failed { kind: ResourceKind::ConfigMap, name, action: Action::Delete, message }
			if name == "gone" && message.contains("not found")
	);
	assert_eq!(outcomes[1], deleted(ResourceKind::Secret, "credentials"));
	assert!(report.has_failures());
}

#[tokio::test]
async fn test_empty_selection_deletes_nothing() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![object("v1", "ConfigMap", "settings")])
		.build()
		.start()
		.await;
	let endpoint = ClusterEndpoint::connect_with_kubeconfig(Some("mock-context"), server.kubeconfig())
		.await
		.unwrap();
	let reporter = MemoryReporter::new();

	let report = Cleaner::new(endpoint, &reporter)
		.clean_resources("shop", &ResourceSelection::new())
		.await;

	assert!(report.outcomes.is_empty());
	assert!(server.paths_of("DELETE").await.is_empty());
}
