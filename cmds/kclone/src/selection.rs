//! Resource kinds and the per-run selection of names to migrate or delete.

use std::{collections::HashMap, fmt};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Partial `spec` merged onto a sanitized object before it is created.
pub type OverwriteSpec = serde_json::Map<String, serde_json::Value>;

/// Overwrite specs for one run.
///
/// Catalog entries belong to one kind, so a Service and a Deployment sharing a
/// name keep separate specs. Entries from an overwrite file are keyed by name
/// alone, apply to every kind with that name and take precedence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverwriteMap {
	by_kind: HashMap<(ResourceKind, String), OverwriteSpec>,
	by_name: HashMap<String, OverwriteSpec>,
}

impl OverwriteMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the spec for one resource of one kind.
	pub fn insert(&mut self, kind: ResourceKind, name: impl Into<String>, spec: OverwriteSpec) {
		self.by_kind.insert((kind, name.into()), spec);
	}

	/// Set the spec for every resource called `name`, whatever its kind.
	pub fn insert_any_kind(&mut self, name: impl Into<String>, spec: OverwriteSpec) {
		self.by_name.insert(name.into(), spec);
	}

	/// Fold `other` in; its entries replace same-keyed ones.
	pub fn extend(&mut self, other: OverwriteMap) {
		self.by_kind.extend(other.by_kind);
		self.by_name.extend(other.by_name);
	}

	pub fn get(&self, kind: ResourceKind, name: &str) -> Option<&OverwriteSpec> {
		self.by_name
			.get(name)
			.or_else(|| self.by_kind.get(&(kind, name.to_string())))
	}

	pub fn len(&self) -> usize {
		self.by_kind.len() + self.by_name.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// The resource kinds kclone knows how to copy and delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
	ConfigMap,
	Secret,
	Service,
	Deployment,
	PersistentVolumeClaim,
}

impl ResourceKind {
	pub const ALL: [ResourceKind; 5] = [
		ResourceKind::ConfigMap,
		ResourceKind::Secret,
		ResourceKind::Service,
		ResourceKind::Deployment,
		ResourceKind::PersistentVolumeClaim,
	];

	/// Creation order for the kinds handled without a data phase.
	///
	/// ConfigMaps and Secrets come first since workloads may reference them,
	/// Services before Deployments. Nothing waits for readiness in between.
	pub const MIGRATION_ORDER: [ResourceKind; 4] = [
		ResourceKind::ConfigMap,
		ResourceKind::Secret,
		ResourceKind::Service,
		ResourceKind::Deployment,
	];

	/// Deletion order: consumers go before the things they reference.
	pub const DELETION_ORDER: [ResourceKind; 5] = [
		ResourceKind::Deployment,
		ResourceKind::Service,
		ResourceKind::PersistentVolumeClaim,
		ResourceKind::ConfigMap,
		ResourceKind::Secret,
	];

	/// Kubernetes kind name.
	pub fn as_str(self) -> &'static str {
		match self {
			ResourceKind::ConfigMap => "ConfigMap",
			ResourceKind::Secret => "Secret",
			ResourceKind::Service => "Service",
			ResourceKind::Deployment => "Deployment",
			ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
		}
	}

	/// Key used for this kind in the catalog file.
	pub fn catalog_key(self) -> &'static str {
		match self {
			ResourceKind::ConfigMap => "configMaps",
			ResourceKind::Secret => "secrets",
			ResourceKind::Service => "services",
			ResourceKind::Deployment => "deployments",
			ResourceKind::PersistentVolumeClaim => "persistentVolumeClaims",
		}
	}
}

impl fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
	#[error("empty {0} name in selection")]
	EmptyName(ResourceKind),
}

/// Names chosen for one run, per kind.
///
/// Names keep their insertion order and are unique within a kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSelection {
	names: IndexMap<ResourceKind, IndexSet<String>>,
}

impl ResourceSelection {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add names for a kind, consuming and returning the selection.
	pub fn with<I, S>(mut self, kind: ResourceKind, names: I) -> Result<Self, SelectionError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		for name in names {
			self.insert(kind, name)?;
		}
		Ok(self)
	}

	/// Add one name. Returns `false` if it was already selected.
	pub fn insert(&mut self, kind: ResourceKind, name: impl Into<String>) -> Result<bool, SelectionError> {
		let name = name.into();
		if name.trim().is_empty() {
			return Err(SelectionError::EmptyName(kind));
		}
		Ok(self.names.entry(kind).or_default().insert(name))
	}

	/// Selected names of a kind, in insertion order.
	pub fn names(&self, kind: ResourceKind) -> impl Iterator<Item = &str> + '_ {
		self.names
			.get(&kind)
			.into_iter()
			.flat_map(|names| names.iter().map(String::as_str))
	}

	pub fn count(&self, kind: ResourceKind) -> usize {
		self.names.get(&kind).map_or(0, IndexSet::len)
	}

	pub fn total(&self) -> usize {
		self.names.values().map(IndexSet::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.total() == 0
	}
}
