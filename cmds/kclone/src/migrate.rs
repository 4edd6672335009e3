//! Migration orchestrator.
//!
//! Kinds without data are copied first in a fixed order, then each selected
//! PVC is re-created and has its contents streamed across. A failure is
//! reported against the one resource it belongs to and the run moves on.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::instrument;

use crate::{
	config::MigrationSettings,
	k8s::{
		client::ClusterEndpoint,
		handlers::migration_handlers,
		transfer::{DataTransfer, StreamCopier},
		volume::{ClaimMigration, VolumeError},
	},
	report::{Action, Outcome, Reporter, RunReport},
	selection::{OverwriteMap, ResourceKind, ResourceSelection},
};

/// Copies selected resources from a source to a destination endpoint.
pub struct Migrator<'a> {
	source: ClusterEndpoint,
	dest: ClusterEndpoint,
	settings: MigrationSettings,
	copier: Box<dyn StreamCopier>,
	reporter: &'a dyn Reporter,
}

impl<'a> Migrator<'a> {
	pub fn new(
		source: ClusterEndpoint,
		dest: ClusterEndpoint,
		settings: MigrationSettings,
		copier: Box<dyn StreamCopier>,
		reporter: &'a dyn Reporter,
	) -> Self {
		Self {
			source,
			dest,
			settings,
			copier,
			reporter,
		}
	}

	/// Migrate every selected resource, each exactly once.
	#[instrument(skip_all, fields(source_namespace = %source_namespace, dest_namespace = %dest_namespace, selected = selection.total()))]
	pub async fn migrate_resources(
		&self,
		source_namespace: &str,
		dest_namespace: &str,
		selection: &ResourceSelection,
		overwrites: Option<&OverwriteMap>,
	) -> RunReport {
		let mut report = RunReport::default();

		for handler in migration_handlers(&self.source, &self.dest) {
			for name in selection.names(handler.kind()) {
				let overwrite = overwrites.and_then(|o| o.get(handler.kind(), name));
				let outcome = handler
					.migrate(name, source_namespace, dest_namespace, overwrite)
					.await;
				self.record(&mut report, outcome);
			}
		}

		for name in selection.names(ResourceKind::PersistentVolumeClaim) {
			let outcome = self.migrate_claim(name, source_namespace, dest_namespace).await;
			self.record(&mut report, outcome);
		}

		report
	}

	fn record(&self, report: &mut RunReport, outcome: Outcome) {
		self.reporter.report(&outcome);
		report.push(outcome);
	}

	/// Create the claim in the destination, then copy its data.
	#[instrument(skip(self))]
	async fn migrate_claim(&self, name: &str, source_namespace: &str, dest_namespace: &str) -> Outcome {
		let kind = ResourceKind::PersistentVolumeClaim;
		let timestamp = unix_millis();

		let claims = ClaimMigration {
			source: &self.source,
			dest: &self.dest,
			manual_storage_class: &self.settings.manual_storage_class,
		};
		match claims
			.create_claim(name, source_namespace, dest_namespace, timestamp)
			.await
		{
			Ok(()) => {}
			Err(VolumeError::ClaimExists { .. }) => {
				return Outcome::Skipped {
					kind,
					name: name.to_string(),
				};
			}
			Err(e) => return failed(kind, name, e.message()),
		}

		tracing::info!(claim = name, "starting data migration");
		let transfer = DataTransfer {
			source: &self.source,
			dest: &self.dest,
			settings: &self.settings.worker,
			copier: self.copier.as_ref(),
		};
		match transfer
			.run(name, source_namespace, dest_namespace, timestamp)
			.await
		{
			Ok(()) => Outcome::Migrated {
				kind,
				name: name.to_string(),
			},
			Err(e) => failed(kind, name, format!("data migration failed: {e}")),
		}
	}
}

fn failed(kind: ResourceKind, name: &str, message: String) -> Outcome {
	Outcome::Failed {
		kind,
		name: name.to_string(),
		action: Action::Migrate,
		message,
	}
}

fn unix_millis() -> u128 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0, |d| d.as_millis())
}
