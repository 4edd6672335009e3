//! Per-kind copy and delete handlers.
//!
//! A handler moves one named object of its kind: read from the source,
//! sanitize, apply the optional overwrite, create in the destination. Errors
//! never escape a handler; they become an [`Outcome`].

use std::{fmt::Debug, marker::PhantomData};

use async_trait::async_trait;
use k8s_openapi::{
	api::{
		apps::v1::Deployment,
		core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service},
	},
	NamespaceResourceScope,
};
use kube::{
	api::{DeleteParams, PostParams},
	Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::instrument;

use super::{
	api_message,
	client::ClusterEndpoint,
	is_already_exists,
	overwrite::overwrite_resource,
	sanitize::MigratedResource,
};
use crate::{
	report::{Action, Outcome},
	selection::{OverwriteSpec, ResourceKind},
};

/// Errors from copying or deleting a single object.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("{kind} '{name}' already exists")]
	AlreadyExists { kind: ResourceKind, name: String },

	#[error("reading {kind} {name}")]
	Read {
		kind: ResourceKind,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("creating {kind} {name}")]
	Create {
		kind: ResourceKind,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("deleting {kind} {name}")]
	Delete {
		kind: ResourceKind,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("applying overwrite to {kind} {name}")]
	Overwrite {
		kind: ResourceKind,
		name: String,
		#[source]
		source: serde_json::Error,
	},
}

impl HandlerError {
	/// Text for the failure outcome, preferring the API server's own message.
	pub fn message(&self) -> String {
		match self {
			HandlerError::Read { source, .. }
			| HandlerError::Create { source, .. }
			| HandlerError::Delete { source, .. } => api_message(source),
			HandlerError::Overwrite { source, .. } => source.to_string(),
			HandlerError::AlreadyExists { .. } => self.to_string(),
		}
	}
}

/// Bounds shared by every namespaced kind kclone handles.
pub trait NamespacedObject:
	MigratedResource
	+ Resource<Scope = NamespaceResourceScope>
	+ Clone
	+ Debug
	+ Serialize
	+ DeserializeOwned
	+ Send
	+ Sync
	+ 'static
{
}

impl<K> NamespacedObject for K where
	K: MigratedResource
		+ Resource<Scope = NamespaceResourceScope>
		+ Clone
		+ Debug
		+ Serialize
		+ DeserializeOwned
		+ Send
		+ Sync
		+ 'static
{
}

/// Copies objects of one kind from a source to a destination namespace.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
	fn kind(&self) -> ResourceKind;

	async fn migrate(
		&self,
		name: &str,
		source_namespace: &str,
		dest_namespace: &str,
		overwrite: Option<&OverwriteSpec>,
	) -> Outcome;
}

/// Deletes objects of one kind by name.
#[async_trait]
pub trait DeleteHandler: Send + Sync {
	fn kind(&self) -> ResourceKind;

	async fn delete(&self, name: &str, namespace: &str) -> Outcome;
}

/// [`ResourceHandler`] for a typed kind.
pub struct KindHandler<K> {
	source: ClusterEndpoint,
	dest: ClusterEndpoint,
	_kind: PhantomData<fn() -> K>,
}

impl<K: NamespacedObject> KindHandler<K> {
	pub fn new(source: ClusterEndpoint, dest: ClusterEndpoint) -> Self {
		Self {
			source,
			dest,
			_kind: PhantomData,
		}
	}

	async fn copy(
		&self,
		name: &str,
		source_namespace: &str,
		dest_namespace: &str,
		overwrite: Option<&OverwriteSpec>,
	) -> Result<(), HandlerError> {
		let mut object = self
			.source
			.namespaced::<K>(source_namespace)
			.get(name)
			.await
			.map_err(|e| HandlerError::Read {
				kind: K::KIND,
				name: name.to_string(),
				source: Box::new(e),
			})?;

		object.sanitize(dest_namespace);
		if let Some(overwrite) = overwrite {
			object = overwrite_resource(&object, overwrite).map_err(|source| HandlerError::Overwrite {
				kind: K::KIND,
				name: name.to_string(),
				source,
			})?;
		}

		match self
			.dest
			.namespaced::<K>(dest_namespace)
			.create(&PostParams::default(), &object)
			.await
		{
			Ok(_) => Ok(()),
			Err(e) if is_already_exists(&e) => Err(HandlerError::AlreadyExists {
				kind: K::KIND,
				name: name.to_string(),
			}),
			Err(e) => Err(HandlerError::Create {
				kind: K::KIND,
				name: name.to_string(),
				source: Box::new(e),
			}),
		}
	}
}

#[async_trait]
impl<K: NamespacedObject> ResourceHandler for KindHandler<K> {
	fn kind(&self) -> ResourceKind {
		K::KIND
	}

	#[instrument(skip(self, overwrite), fields(kind = %K::KIND))]
	async fn migrate(
		&self,
		name: &str,
		source_namespace: &str,
		dest_namespace: &str,
		overwrite: Option<&OverwriteSpec>,
	) -> Outcome {
		let result = self.copy(name, source_namespace, dest_namespace, overwrite).await;
		migration_outcome(K::KIND, name, result)
	}
}

/// Map the result of copying one object to its outcome.
pub fn migration_outcome(kind: ResourceKind, name: &str, result: Result<(), HandlerError>) -> Outcome {
	let name = name.to_string();
	match result {
		Ok(()) => Outcome::Migrated { kind, name },
		Err(HandlerError::AlreadyExists { .. }) => Outcome::Skipped { kind, name },
		Err(err) => Outcome::Failed {
			kind,
			name,
			action: Action::Migrate,
			message: err.message(),
		},
	}
}

/// [`DeleteHandler`] for a typed kind.
pub struct KindDeleter<K> {
	endpoint: ClusterEndpoint,
	_kind: PhantomData<fn() -> K>,
}

impl<K: NamespacedObject> KindDeleter<K> {
	pub fn new(endpoint: ClusterEndpoint) -> Self {
		Self {
			endpoint,
			_kind: PhantomData,
		}
	}
}

#[async_trait]
impl<K: NamespacedObject> DeleteHandler for KindDeleter<K> {
	fn kind(&self) -> ResourceKind {
		K::KIND
	}

	#[instrument(skip(self), fields(kind = %K::KIND))]
	async fn delete(&self, name: &str, namespace: &str) -> Outcome {
		let result = self
			.endpoint
			.namespaced::<K>(namespace)
			.delete(name, &DeleteParams::default())
			.await;
		match result {
			Ok(_) => Outcome::Deleted {
				kind: K::KIND,
				name: name.to_string(),
			},
			Err(e) => {
				let err = HandlerError::Delete {
					kind: K::KIND,
					name: name.to_string(),
					source: Box::new(e),
				};
				Outcome::Failed {
					kind: K::KIND,
					name: name.to_string(),
					action: Action::Delete,
					message: err.message(),
				}
			}
		}
	}
}

/// Copy handlers for the kinds without a data phase, in creation order.
pub fn migration_handlers(source: &ClusterEndpoint, dest: &ClusterEndpoint) -> Vec<Box<dyn ResourceHandler>> {
	ResourceKind::MIGRATION_ORDER
		.into_iter()
		.filter_map(|kind| migration_handler_for(kind, source, dest))
		.collect()
}

/// Copy handler for `kind`, or `None` for kinds that need the data phase.
pub fn migration_handler_for(
	kind: ResourceKind,
	source: &ClusterEndpoint,
	dest: &ClusterEndpoint,
) -> Option<Box<dyn ResourceHandler>> {
	let (source, dest) = (source.clone(), dest.clone());
	Some(match kind {
		ResourceKind::ConfigMap => Box::new(KindHandler::<ConfigMap>::new(source, dest)),
		ResourceKind::Secret => Box::new(KindHandler::<Secret>::new(source, dest)),
		ResourceKind::Service => Box::new(KindHandler::<Service>::new(source, dest)),
		ResourceKind::Deployment => Box::new(KindHandler::<Deployment>::new(source, dest)),
		ResourceKind::PersistentVolumeClaim => return None,
	})
}

/// Delete handlers for every kind, in deletion order.
pub fn delete_handlers(endpoint: &ClusterEndpoint) -> Vec<Box<dyn DeleteHandler>> {
	ResourceKind::DELETION_ORDER
		.into_iter()
		.map(|kind| delete_handler_for(kind, endpoint))
		.collect()
}

pub fn delete_handler_for(kind: ResourceKind, endpoint: &ClusterEndpoint) -> Box<dyn DeleteHandler> {
	let endpoint = endpoint.clone();
	match kind {
		ResourceKind::ConfigMap => Box::new(KindDeleter::<ConfigMap>::new(endpoint)),
		ResourceKind::Secret => Box::new(KindDeleter::<Secret>::new(endpoint)),
		ResourceKind::Service => Box::new(KindDeleter::<Service>::new(endpoint)),
		ResourceKind::Deployment => Box::new(KindDeleter::<Deployment>::new(endpoint)),
		ResourceKind::PersistentVolumeClaim => Box::new(KindDeleter::<PersistentVolumeClaim>::new(endpoint)),
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_outcome_for_success_and_conflict() {
		assert_eq!(
			migration_outcome(ResourceKind::Secret, "sec-a", Ok(())),
			Outcome::Migrated {
				kind: ResourceKind::Secret,
				name: "sec-a".to_string(),
			}
		);

		let conflict = HandlerError::AlreadyExists {
			kind: ResourceKind::Secret,
			name: "sec-a".to_string(),
		};
		assert_matches!(
			migration_outcome(ResourceKind::Secret, "sec-a", Err(conflict)),
			Outcome::Skipped { kind: ResourceKind::Secret, name } if name == "sec-a"
		);
	}

	#[test]
	fn test_outcome_for_overwrite_failure() {
		let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
		let expected = source.to_string();
		let err = HandlerError::Overwrite {
			kind: ResourceKind::Deployment,
			name: "dep-a".to_string(),
			source,
		};
		assert_matches!(
			migration_outcome(ResourceKind::Deployment, "dep-a", Err(err)),
			Outcome::Failed { action: Action::Migrate, message, .. } if message == expected
		);
	}
}
