//! Re-creating a PVC, and its manually provisioned volume, in the destination.

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::PostParams;
use thiserror::Error;
use tracing::instrument;

use super::{
	api_message,
	client::ClusterEndpoint,
	is_already_exists,
	sanitize::{sanitize_claim, sanitize_volume},
};

#[derive(Debug, Error)]
pub enum VolumeError {
	#[error("reading PersistentVolumeClaim {name}: {message}")]
	ReadClaim { name: String, message: String },

	#[error("PersistentVolumeClaim {name} already exists in destination")]
	ClaimExists { name: String },

	#[error("creating PersistentVolumeClaim {name}: {message}")]
	CreateClaim { name: String, message: String },

	#[error("cloning PersistentVolume {name}: {message}")]
	VolumeClone { name: String, message: String },
}

impl VolumeError {
	/// Text for the failure outcome, without the operation prefix.
	pub fn message(&self) -> String {
		match self {
			VolumeError::ReadClaim { message, .. }
			| VolumeError::CreateClaim { message, .. }
			| VolumeError::VolumeClone { message, .. } => message.clone(),
			VolumeError::ClaimExists { .. } => self.to_string(),
		}
	}
}

/// Control-plane half of a PVC migration.
pub struct ClaimMigration<'a> {
	pub source: &'a ClusterEndpoint,
	pub dest: &'a ClusterEndpoint,
	/// Storage class whose volumes are provisioned by hand and must be cloned.
	pub manual_storage_class: &'a str,
}

impl ClaimMigration<'_> {
	/// Create the claim `name` from the source namespace in the destination
	/// namespace.
	///
	/// A claim of the manual class bound to a host-path volume gets a clone of
	/// that volume to bind to. If cloning fails the claim is created unbound
	/// and left to dynamic provisioning.
	#[instrument(skip(self))]
	pub async fn create_claim(
		&self,
		name: &str,
		source_namespace: &str,
		dest_namespace: &str,
		timestamp: u128,
	) -> Result<(), VolumeError> {
		let mut claim = self
			.source
			.namespaced::<PersistentVolumeClaim>(source_namespace)
			.get(name)
			.await
			.map_err(|e| VolumeError::ReadClaim {
				name: name.to_string(),
				message: api_message(&e),
			})?;

		let mut cloned_volume = None;
		if let Some(volume_name) = self.manual_volume(&claim) {
			match self.clone_volume(&volume_name, timestamp).await {
				Ok(Some(new_name)) => {
					tracing::info!(volume = %new_name, "created new PersistentVolume for manual migration");
					cloned_volume = Some(new_name);
				}
				Ok(None) => {
					tracing::debug!(volume = %volume_name, "volume is not host-path backed, not cloning");
				}
				Err(e) => {
					tracing::warn!(
						"Failed to clone PV for manual PVC: {}. Proceeding with dynamic provisioning attempt.",
						e.message()
					);
				}
			}
		}

		sanitize_claim(&mut claim, dest_namespace, cloned_volume.is_some());
		if let (Some(new_name), Some(spec)) = (cloned_volume, claim.spec.as_mut()) {
			spec.volume_name = Some(new_name);
		}

		match self
			.dest
			.namespaced::<PersistentVolumeClaim>(dest_namespace)
			.create(&PostParams::default(), &claim)
			.await
		{
			Ok(_) => {
				tracing::info!(claim = name, namespace = dest_namespace, "PVC created in destination");
				Ok(())
			}
			Err(e) if is_already_exists(&e) => Err(VolumeError::ClaimExists {
				name: name.to_string(),
			}),
			Err(e) => Err(VolumeError::CreateClaim {
				name: name.to_string(),
				message: api_message(&e),
			}),
		}
	}

	/// Name of the volume a manual-class claim is bound to.
	fn manual_volume(&self, claim: &PersistentVolumeClaim) -> Option<String> {
		let spec = claim.spec.as_ref()?;
		if spec.storage_class_name.as_deref() != Some(self.manual_storage_class) {
			return None;
		}
		spec.volume_name.clone().filter(|name| !name.is_empty())
	}

	/// Copy a host-path volume into the destination cluster under a new name.
	///
	/// Returns `None` when the volume has no host path.
	async fn clone_volume(&self, volume_name: &str, timestamp: u128) -> Result<Option<String>, VolumeError> {
		let clone_error = |e: kube::Error| VolumeError::VolumeClone {
			name: volume_name.to_string(),
			message: api_message(&e),
		};

		let mut volume = self
			.source
			.cluster::<PersistentVolume>()
			.get(volume_name)
			.await
			.map_err(clone_error)?;
		if volume.spec.as_ref().and_then(|s| s.host_path.as_ref()).is_none() {
			return Ok(None);
		}

		let new_name = cloned_volume_name(volume_name, timestamp);
		sanitize_volume(&mut volume, &new_name);
		// Binding annotations describe the original volume.
		volume.metadata.annotations = None;
		if let Some(host_path) = volume.spec.as_mut().and_then(|s| s.host_path.as_mut()) {
			host_path.path = format!("{}-migrated-{timestamp}", host_path.path);
		}

		self.dest
			.cluster::<PersistentVolume>()
			.create(&PostParams::default(), &volume)
			.await
			.map_err(clone_error)?;
		Ok(Some(new_name))
	}
}

/// Name for the destination copy of a manually provisioned volume.
pub fn cloned_volume_name(original: &str, timestamp: u128) -> String {
	format!("migrated-{original}-{timestamp}")
}
