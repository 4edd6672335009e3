//! The resource kinds the mock server knows how to route.

/// Kinds served by the mock, with their URL segments.
pub struct MockDiscovery {
	pub resources: Vec<MockApiResource>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self {
			resources: vec![
				MockApiResource::namespaced("v1", "configmaps", "ConfigMap"),
				MockApiResource::namespaced("v1", "secrets", "Secret"),
				MockApiResource::namespaced("v1", "services", "Service"),
				MockApiResource::namespaced("v1", "pods", "Pod"),
				MockApiResource::namespaced("v1", "persistentvolumeclaims", "PersistentVolumeClaim"),
				MockApiResource::cluster_scoped("v1", "persistentvolumes", "PersistentVolume"),
				MockApiResource::cluster_scoped("v1", "namespaces", "Namespace"),
				MockApiResource::namespaced("apps/v1", "deployments", "Deployment"),
			],
		}
	}
}

impl MockDiscovery {
	pub fn find(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		self.resources
			.iter()
			.find(|r| r.api_version == api_version && r.kind == kind)
	}

	/// Collection path for a kind, e.g. `/apis/apps/v1/namespaces/shop/deployments`.
	///
	/// Namespaced kinds without a namespace land in `default`.
	pub fn collection_path(&self, api_version: &str, kind: &str, namespace: Option<&str>) -> Option<String> {
		let resource = self.find(api_version, kind)?;
		let root = if api_version.contains('/') {
			format!("/apis/{api_version}")
		} else {
			format!("/api/{api_version}")
		};
		Some(if resource.namespaced {
			format!(
				"{root}/namespaces/{}/{}",
				namespace.unwrap_or("default"),
				resource.name
			)
		} else {
			format!("{root}/{}", resource.name)
		})
	}
}

/// A mock API resource definition.
pub struct MockApiResource {
	pub api_version: String,
	/// Plural name used in URLs.
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
}

impl MockApiResource {
	pub fn namespaced(api_version: &str, name: &str, kind: &str) -> Self {
		Self {
			api_version: api_version.to_string(),
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: true,
		}
	}

	pub fn cluster_scoped(api_version: &str, name: &str, kind: &str) -> Self {
		Self {
			namespaced: false,
			..Self::namespaced(api_version, name, kind)
		}
	}
}
