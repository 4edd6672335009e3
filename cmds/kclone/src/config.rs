//! Configuration file support for kclone
//!
//! A `.kclone.yaml` file (YAML or JSON) can hold a catalog of known clusters,
//! namespaces and resources, per-resource spec overwrites, and settings for the
//! PVC data copy. kclone searches from the working directory upward to the
//! filesystem root unless a path is given explicitly.

use std::{
	fs,
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
	k8s::transfer::WorkerSettings,
	selection::{OverwriteMap, OverwriteSpec, ResourceKind},
};

/// The name of the config file kclone looks for
pub const CONFIG_FILE_NAME: &str = ".kclone.yaml";

/// Environment variable pointing at a config file
pub const CONFIG_ENV_VAR: &str = "KCLONE_CONFIG";

/// Root configuration structure for .kclone.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KcloneConfig {
	/// Known kubeconfig contexts
	#[serde(default)]
	pub clusters: Vec<NamedEntry>,

	/// Known namespaces per context
	#[serde(default)]
	pub namespaces: IndexMap<String, Vec<NamedEntry>>,

	/// Known resources per namespace
	#[serde(default)]
	pub resources: IndexMap<String, NamespaceResources>,

	#[serde(default)]
	pub migration: MigrationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedEntry {
	pub name: String,
}

/// A resource entry in the catalog, optionally with a spec overwrite.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
	pub name: String,

	#[serde(default)]
	pub overwrite_spec: Option<OverwriteSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceResources {
	#[serde(default)]
	pub config_maps: Vec<ResourceEntry>,
	#[serde(default)]
	pub secrets: Vec<ResourceEntry>,
	#[serde(default)]
	pub services: Vec<ResourceEntry>,
	#[serde(default)]
	pub deployments: Vec<ResourceEntry>,
	#[serde(default)]
	pub persistent_volume_claims: Vec<ResourceEntry>,
}

impl NamespaceResources {
	pub fn entries(&self, kind: ResourceKind) -> &[ResourceEntry] {
		match kind {
			ResourceKind::ConfigMap => &self.config_maps,
			ResourceKind::Secret => &self.secrets,
			ResourceKind::Service => &self.services,
			ResourceKind::Deployment => &self.deployments,
			ResourceKind::PersistentVolumeClaim => &self.persistent_volume_claims,
		}
	}
}

/// PVC data copy settings as written in the file; unset fields take defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
	#[serde(default)]
	pub manual_storage_class: Option<String>,
	#[serde(default)]
	pub worker_image: Option<String>,
	#[serde(default)]
	pub mount_path: Option<String>,
	#[serde(default)]
	pub poll_interval_secs: Option<u64>,
	#[serde(default)]
	pub poll_attempts: Option<u32>,
	#[serde(default)]
	pub kubectl: Option<PathBuf>,
}

/// Run-scoped settings for a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
	/// Storage class whose bound volumes are cloned instead of re-provisioned
	pub manual_storage_class: String,
	pub worker: WorkerSettings,
	/// `kubectl` binary used for the data copy
	pub kubectl: PathBuf,
}

impl Default for MigrationSettings {
	fn default() -> Self {
		Self {
			manual_storage_class: "manual".to_string(),
			worker: WorkerSettings {
				image: "alpine:latest".to_string(),
				mount_path: "/data".to_string(),
				poll_interval: Duration::from_secs(1),
				poll_attempts: 60,
			},
			kubectl: PathBuf::from("kubectl"),
		}
	}
}

impl MigrationConfig {
	/// Fill unset fields from the defaults.
	pub fn settings(&self) -> MigrationSettings {
		let defaults = MigrationSettings::default();
		MigrationSettings {
			manual_storage_class: self
				.manual_storage_class
				.clone()
				.unwrap_or(defaults.manual_storage_class),
			worker: WorkerSettings {
				image: self.worker_image.clone().unwrap_or(defaults.worker.image),
				mount_path: self.mount_path.clone().unwrap_or(defaults.worker.mount_path),
				poll_interval: self
					.poll_interval_secs
					.map_or(defaults.worker.poll_interval, Duration::from_secs),
				poll_attempts: self.poll_attempts.unwrap_or(defaults.worker.poll_attempts),
			},
			kubectl: self.kubectl.clone().unwrap_or(defaults.kubectl),
		}
	}
}

fn non_empty(names: Vec<String>) -> Option<Vec<String>> {
	(!names.is_empty()).then_some(names)
}

impl KcloneConfig {
	/// Load config from an explicit path, `$KCLONE_CONFIG`, or by searching
	/// upward from `start_dir`.
	pub fn resolve(explicit: Option<&Path>, start_dir: &Path) -> Result<Option<Self>> {
		if let Some(path) = explicit {
			return Self::load_from_file(path).map(Some);
		}
		if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
			return Self::load_from_file(Path::new(&path)).map(Some);
		}
		Self::load_from_directory(start_dir)
	}

	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>> {
		if let Some(config_path) = find_config_file(start_dir) {
			tracing::debug!(path = %config_path.display(), "using config file");
			let config = Self::load_from_file(&config_path)?;
			Ok(Some(config))
		} else {
			Ok(None)
		}
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		let config: KcloneConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;
		Ok(config)
	}

	/// Cluster names from the catalog, or `None` to ask the kubeconfig.
	pub fn cluster_names(&self) -> Option<Vec<String>> {
		non_empty(self.clusters.iter().map(|c| c.name.clone()).collect())
	}

	/// Namespace names known for a cluster, or `None` to ask the API.
	pub fn namespace_names(&self, cluster: &str) -> Option<Vec<String>> {
		let entries = self.namespaces.get(cluster)?;
		non_empty(entries.iter().map(|n| n.name.clone()).collect())
	}

	/// Resource names of a kind known for a namespace, or `None` to ask the API.
	pub fn resource_names(&self, namespace: &str, kind: ResourceKind) -> Option<Vec<String>> {
		let entries = self.resources.get(namespace)?.entries(kind);
		non_empty(entries.iter().map(|r| r.name.clone()).collect())
	}

	/// Spec overwrites declared for resources of a namespace, keyed by kind
	/// and name.
	pub fn overwrites(&self, namespace: &str) -> OverwriteMap {
		let mut overwrites = OverwriteMap::new();
		let Some(resources) = self.resources.get(namespace) else {
			return overwrites;
		};
		for kind in ResourceKind::ALL {
			for entry in resources.entries(kind) {
				if let Some(spec) = &entry.overwrite_spec {
					overwrites.insert(kind, entry.name.clone(), spec.clone());
				}
			}
		}
		overwrites
	}
}

/// Load an overwrite file: a map of resource name to partial spec, applied to
/// every selected kind with that name.
pub fn load_overwrite_file(path: &Path) -> Result<OverwriteMap> {
	let content = fs::read_to_string(path)
		.with_context(|| format!("failed to read overwrite file: {}", path.display()))?;
	let entries: IndexMap<String, OverwriteSpec> = serde_yaml_with_quirks::from_str(&content)
		.with_context(|| format!("failed to parse overwrite file: {}", path.display()))?;

	let mut overwrites = OverwriteMap::new();
	for (name, spec) in entries {
		overwrites.insert_any_kind(name, spec);
	}
	Ok(overwrites)
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let mut current = start_dir.to_path_buf();

	// Canonicalize if possible to handle relative paths
	if let Ok(canonical) = current.canonicalize() {
		current = canonical;
	}

	loop {
		let config_path = current.join(CONFIG_FILE_NAME);
		if config_path.exists() {
			return Some(config_path);
		}

		match current.parent() {
			Some(parent) if parent != current => current = parent.to_path_buf(),
			_ => break,
		}
	}

	None
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use serde_json::json;
	use tempfile::TempDir;

	use super::*;

	const CATALOG: &str = indoc! {"
		clusters:
		  - name: prod
		  - name: staging
		namespaces:
		  prod:
		    - name: shop
		  staging: []
		resources:
		  shop:
		    configMaps:
		      - name: cfg-a
		    deployments:
		      - name: dep-a
		        overwriteSpec:
		          replicas: 1
		          template:
		            spec:
		              nodeSelector:
		                disk: ssd
		    persistentVolumeClaims:
		      - name: data
		migration:
		  pollIntervalSecs: 2
		  workerImage: busybox:1.36
	"};

	fn write_config(dir: &Path, content: &str) -> PathBuf {
		let path = dir.join(CONFIG_FILE_NAME);
		fs::write(&path, content).unwrap();
		path
	}

	#[test]
	fn test_find_config_in_parent_dir() {
		let temp = TempDir::new().unwrap();
		let config_path = write_config(temp.path(), "{}");

		let subdir = temp.path().join("subdir");
		fs::create_dir(&subdir).unwrap();

		let found = find_config_file(&subdir);
		// Compare file names only to avoid canonicalization issues on macOS
		assert!(found.is_some());
		assert_eq!(found.unwrap().file_name(), config_path.file_name());
	}

	#[test]
	fn test_no_config_found() {
		let temp = TempDir::new().unwrap();
		assert!(find_config_file(temp.path()).is_none());
		assert!(KcloneConfig::load_from_directory(temp.path()).unwrap().is_none());
	}

	#[test]
	fn test_load_catalog() {
		let temp = TempDir::new().unwrap();
		let path = write_config(temp.path(), CATALOG);
		let config = KcloneConfig::load_from_file(&path).unwrap();

		assert_eq!(config.cluster_names(), Some(vec!["prod".to_string(), "staging".to_string()]));
		assert_eq!(config.namespace_names("prod"), Some(vec!["shop".to_string()]));
		assert_eq!(config.namespace_names("staging"), None);
		assert_eq!(config.namespace_names("dev"), None);
		assert_eq!(
			config.resource_names("shop", ResourceKind::ConfigMap),
			Some(vec!["cfg-a".to_string()])
		);
		assert_eq!(config.resource_names("shop", ResourceKind::Secret), None);
		assert_eq!(config.resource_names("other", ResourceKind::ConfigMap), None);
	}

	#[test]
	fn test_catalog_overwrites() {
		let temp = TempDir::new().unwrap();
		let path = write_config(temp.path(), CATALOG);
		let config = KcloneConfig::load_from_file(&path).unwrap();

		let overwrites = config.overwrites("shop");
		assert_eq!(overwrites.len(), 1);
		assert_eq!(
			overwrites
				.get(ResourceKind::Deployment, "dep-a")
				.cloned()
				.map(serde_json::Value::Object),
			Some(json!({"replicas": 1, "template": {"spec": {"nodeSelector": {"disk": "ssd"}}}}))
		);
		assert_eq!(overwrites.get(ResourceKind::Service, "dep-a"), None);
		assert!(config.overwrites("other").is_empty());
	}

	#[test]
	fn test_catalog_overwrites_for_same_named_kinds() {
		let temp = TempDir::new().unwrap();
		let path = write_config(
			temp.path(),
			indoc! {"
				resources:
				  shop:
				    services:
				      - name: web
				        overwriteSpec:
				          type: NodePort
				    deployments:
				      - name: web
				        overwriteSpec:
				          selector:
				            matchLabels:
				              app: web2
			"},
		);
		let overwrites = KcloneConfig::load_from_file(&path).unwrap().overwrites("shop");

		assert_eq!(overwrites.len(), 2);
		assert_eq!(
			overwrites.get(ResourceKind::Service, "web").map(|s| s["type"].clone()),
			Some(json!("NodePort"))
		);
		assert_eq!(
			overwrites
				.get(ResourceKind::Deployment, "web")
				.map(|s| s["selector"]["matchLabels"]["app"].clone()),
			Some(json!("web2"))
		);
	}

	#[test]
	fn test_migration_settings() {
		let temp = TempDir::new().unwrap();
		let path = write_config(temp.path(), CATALOG);
		let settings = KcloneConfig::load_from_file(&path).unwrap().migration.settings();

		assert_eq!(settings.worker.image, "busybox:1.36");
		assert_eq!(settings.worker.poll_interval, Duration::from_secs(2));
		assert_eq!(settings.worker.poll_attempts, 60);
		assert_eq!(settings.worker.mount_path, "/data");
		assert_eq!(settings.manual_storage_class, "manual");
		assert_eq!(settings.kubectl, PathBuf::from("kubectl"));
	}

	#[test]
	fn test_load_config_empty_object() {
		let temp = TempDir::new().unwrap();
		let path = write_config(temp.path(), "{}");

		let config = KcloneConfig::load_from_file(&path).unwrap();
		assert_eq!(config.cluster_names(), None);
		assert_eq!(config.migration.settings(), MigrationSettings::default());
	}

	#[test]
	fn test_load_config_json() {
		let temp = TempDir::new().unwrap();
		let path = write_config(
			temp.path(),
			r#"{"clusters": [{"name": "kind-a"}], "migration": {"pollAttempts": 5}}"#,
		);

		let config = KcloneConfig::load_from_file(&path).unwrap();
		assert_eq!(config.cluster_names(), Some(vec!["kind-a".to_string()]));
		assert_eq!(config.migration.settings().worker.poll_attempts, 5);
	}

	#[test]
	fn test_load_config_invalid() {
		let temp = TempDir::new().unwrap();
		let path = write_config(temp.path(), "clusters: 5");

		let err = KcloneConfig::load_from_file(&path).unwrap_err();
		assert!(err.to_string().contains("failed to parse config file"));
	}

	#[test]
	fn test_resolve_explicit_path() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("custom.yaml");
		fs::write(&path, "clusters: [{name: only}]").unwrap();

		let config = KcloneConfig::resolve(Some(&path), temp.path()).unwrap().unwrap();
		assert_eq!(config.cluster_names(), Some(vec!["only".to_string()]));
	}

	#[test]
	fn test_load_overwrite_file() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("overwrites.yaml");
		fs::write(
			&path,
			indoc! {"
				dep-a:
				  replicas: 2
				svc-a:
				  type: NodePort
			"},
		)
		.unwrap();

		let overwrites = load_overwrite_file(&path).unwrap();
		assert_eq!(overwrites.len(), 2);
		assert_eq!(
			overwrites.get(ResourceKind::Deployment, "dep-a").map(|s| s["replicas"].clone()),
			Some(json!(2))
		);
		assert_eq!(
			overwrites.get(ResourceKind::Service, "svc-a").map(|s| s["type"].clone()),
			Some(json!("NodePort"))
		);
	}
}
