//! Integration tests for ClusterEndpoint using HTTP mock server.

use assert_matches::assert_matches;
use k8s_mock::HttpMockK8sServer;
use kclone::{
	k8s::client::{ClusterEndpoint, ConnectionError},
	selection::ResourceKind,
};
use serde_json::json;

#[tokio::test]
async fn test_connect_reads_server_version() {
	let server = HttpMockK8sServer::builder().build().start().await;

	let endpoint = ClusterEndpoint::connect_with_kubeconfig(Some("mock-context"), server.kubeconfig())
		.await
		.expect("connection should succeed");

	assert_eq!(endpoint.context(), "mock-context");
	assert_eq!(endpoint.server_version().major, "1");
	assert_eq!(endpoint.server_version().git_version, "v1.31.0");
}

#[tokio::test]
async fn test_connect_uses_current_context() {
	let server = HttpMockK8sServer::builder().build().start().await;

	let endpoint = ClusterEndpoint::connect_with_kubeconfig(None, server.kubeconfig_with_context("staging"))
		.await
		.expect("connection should succeed");

	assert_eq!(endpoint.context(), "staging");
}

#[tokio::test]
async fn test_connect_unknown_context() {
	let server = HttpMockK8sServer::builder().build().start().await;

	let result = ClusterEndpoint::connect_with_kubeconfig(Some("prod"), server.kubeconfig()).await;

	assert_matches!(result, Err(ConnectionError::ContextNotFound(name)) if name == "prod");
}

#[tokio::test]
async fn test_list_names() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![
			json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cfg-b", "namespace": "shop"}}),
			json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cfg-a", "namespace": "shop"}}),
			json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "elsewhere", "namespace": "other"}}),
			json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "web", "namespace": "shop"}}),
		])
		.build()
		.start()
		.await;
	let endpoint = ClusterEndpoint::connect_with_kubeconfig(Some("mock-context"), server.kubeconfig())
		.await
		.unwrap();

	assert_eq!(
		endpoint.list_names(ResourceKind::ConfigMap, "shop").await.unwrap(),
		vec!["cfg-a", "cfg-b"]
	);
	assert_eq!(
		endpoint.list_names(ResourceKind::Deployment, "shop").await.unwrap(),
		vec!["web"]
	);
	assert!(endpoint
		.list_names(ResourceKind::Secret, "shop")
		.await
		.unwrap()
		.is_empty());
}

#[tokio::test]
async fn test_namespace_names() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "shop"}})])
		.build()
		.start()
		.await;
	let endpoint = ClusterEndpoint::connect_with_kubeconfig(Some("mock-context"), server.kubeconfig())
		.await
		.unwrap();

	assert_eq!(endpoint.namespace_names().await.unwrap(), vec!["default", "shop"]);
}
