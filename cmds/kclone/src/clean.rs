//! Deletion orchestrator.

use tracing::instrument;

use crate::{
	k8s::{client::ClusterEndpoint, handlers::delete_handlers},
	report::{Reporter, RunReport},
	selection::ResourceSelection,
};

/// Deletes selected resources from one namespace.
///
/// Consumers are removed before what they reference: Deployments, Services,
/// PVCs, ConfigMaps, then Secrets. A missing object is reported as a failure
/// like any other.
pub struct Cleaner<'a> {
	endpoint: ClusterEndpoint,
	reporter: &'a dyn Reporter,
}

impl<'a> Cleaner<'a> {
	pub fn new(endpoint: ClusterEndpoint, reporter: &'a dyn Reporter) -> Self {
		Self { endpoint, reporter }
	}

	#[instrument(skip_all, fields(namespace = %namespace, selected = selection.total()))]
	pub async fn clean_resources(&self, namespace: &str, selection: &ResourceSelection) -> RunReport {
		let mut report = RunReport::default();
		for handler in delete_handlers(&self.endpoint) {
			for name in selection.names(handler.kind()) {
				let outcome = handler.delete(name, namespace).await;
				self.reporter.report(&outcome);
				report.push(outcome);
			}
		}
		report
	}
}
