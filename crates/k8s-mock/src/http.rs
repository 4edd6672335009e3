//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This provides a real HTTP server that can be used with actual kubeconfig-based
//! connections, so the code under test builds its client exactly as it would
//! against a cluster.

use std::{
	collections::HashMap,
	sync::{Arc, PoisonError, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	discovery::MockDiscovery,
	helpers::{list_response, parse_resource_path, plural_of, status_response},
};

/// Objects keyed by (collection path, name).
pub type SharedResources = Arc<RwLock<HashMap<(String, String), Value>>>;

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Objects present when the server starts, as raw manifests. The server
	/// derives API paths from apiVersion/kind.
	#[builder(default)]
	resources: Vec<Value>,
	/// Object names whose create is refused with 403 Forbidden.
	#[builder(default)]
	reject_create: Vec<String>,
	/// `status.phase` given to every pod created through the API.
	#[builder(into, default = "Running".to_string())]
	pod_phase: String,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	resources: SharedResources,
}

/// One request seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let discovery = MockDiscovery::default();

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut resources = HashMap::new();
		for manifest in self.resources {
			if let Some(key) = api_path_for_manifest(&manifest, &discovery) {
				trace!(api_path = %key.0, name = %key.1, "Registered resource");
				resources.insert(key, manifest);
			}
		}
		resources
			.entry(("/api/v1/namespaces".to_string(), "default".to_string()))
			.or_insert_with(|| {
				json!({
					"apiVersion": "v1",
					"kind": "Namespace",
					"metadata": {"name": "default"}
				})
			});

		let shared_resources = Arc::new(RwLock::new(resources));
		let behavior = Arc::new(Behavior {
			reject_create: self.reject_create,
			pod_phase: self.pod_phase,
		});

		mount_version(&server).await;
		mount_resources(&server, &shared_resources, &behavior).await;

		RunningHttpMockK8sServer {
			server,
			resources: shared_resources,
		}
	}
}

struct Behavior {
	reject_create: Vec<String>,
	pod_phase: String,
}

/// Derive the (collection path, name) key for a manifest.
fn api_path_for_manifest(manifest: &Value, discovery: &MockDiscovery) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest.pointer("/metadata/namespace").and_then(Value::as_str);

	let path = discovery.collection_path(api_version, kind, namespace)?;
	Some((path, name))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Current state of one object, if it exists.
	///
	/// `collection` is the list path, e.g. `/api/v1/namespaces/shop/configmaps`.
	pub fn resource(&self, collection: &str, name: &str) -> Option<Value> {
		self.resources
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&(collection.to_string(), name.to_string()))
			.cloned()
	}

	/// Sorted names of the objects under a collection path.
	pub fn names(&self, collection: &str) -> Vec<String> {
		let mut names: Vec<_> = self
			.resources
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.keys()
			.filter(|(path, _)| path == collection)
			.map(|(_, name)| name.clone())
			.collect();
		names.sort();
		names
	}

	/// Every request received so far, in arrival order.
	pub async fn requests(&self) -> Vec<RecordedRequest> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.map(|req| RecordedRequest {
				method: req.method.as_str().to_string(),
				path: req.url.path().to_string(),
			})
			.collect()
	}

	/// Requests with the given method, as paths.
	pub async fn paths_of(&self, http_method: &str) -> Vec<String> {
		self.requests()
			.await
			.into_iter()
			.filter(|r| r.method == http_method)
			.map(|r| r.path)
			.collect()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-08-13T00:00:00Z",
			"goVersion": "go1.22.5",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_resources(server: &MockServer, resources: &SharedResources, behavior: &Arc<Behavior>) {
	let post_resources = resources.clone();
	let post_behavior = behavior.clone();
	let get_resources = resources.clone();
	let delete_resources = resources.clone();

	Mock::given(method("POST"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let collection = req.url.path().trim_end_matches('/').to_string();
			let mut body: Value = match serde_json::from_slice(&req.body) {
				Ok(body) => body,
				Err(e) => return status_response(400, "BadRequest", &e.to_string()),
			};
			let name = body
				.pointer("/metadata/name")
				.and_then(Value::as_str)
				.unwrap_or("")
				.to_string();
			let plural = plural_of(&collection).to_string();

			if post_behavior.reject_create.contains(&name) {
				return status_response(
					403,
					"Forbidden",
					&format!("{plural} \"{name}\" is forbidden: rejected by admission policy"),
				);
			}

			let mut resources = post_resources.write().unwrap_or_else(PoisonError::into_inner);
			let key = (collection, name.clone());
			if resources.contains_key(&key) {
				return status_response(409, "AlreadyExists", &format!("{plural} \"{name}\" already exists"));
			}

			if plural == "pods" {
				body["status"] = json!({"phase": post_behavior.pod_phase.as_str()});
			}
			let is_dry_run = req.url.query_pairs().any(|(k, _)| k == "dryRun");
			if !is_dry_run {
				resources.insert(key, body.clone());
			}
			ResponseTemplate::new(201).set_body_json(body)
		})
		.mount(server)
		.await;

	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let resources = get_resources.read().unwrap_or_else(PoisonError::into_inner);
			match parse_resource_path(req.url.path()) {
				(collection, Some(name)) => {
					let plural = plural_of(&collection).to_string();
					match resources.get(&(collection, name.clone())) {
						Some(object) => ResponseTemplate::new(200).set_body_json(object),
						None => status_response(404, "NotFound", &format!("{plural} \"{name}\" not found")),
					}
				}
				(collection, None) => {
					let mut items: Vec<_> = resources
						.iter()
						.filter(|((path, _), _)| *path == collection)
						.collect();
					items.sort_by(|a, b| a.0 .1.cmp(&b.0 .1));
					list_response(items.into_iter().map(|(_, v)| v.clone()).collect())
				}
			}
		})
		.mount(server)
		.await;

	Mock::given(method("DELETE"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let (collection, Some(name)) = parse_resource_path(req.url.path()) else {
				return status_response(405, "MethodNotAllowed", "collection delete is not supported");
			};
			let plural = plural_of(&collection).to_string();
			let mut resources = delete_resources.write().unwrap_or_else(PoisonError::into_inner);
			match resources.remove(&(collection, name.clone())) {
				Some(object) => ResponseTemplate::new(200).set_body_json(object),
				None => status_response(404, "NotFound", &format!("{plural} \"{name}\" not found")),
			}
		})
		.mount(server)
		.await;
}
