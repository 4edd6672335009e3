//! Kubernetes cluster connection management.

use std::{fmt::Debug, time::Duration};

use k8s_openapi::{
	api::{
		apps::v1::Deployment,
		core::v1::{ConfigMap, Namespace, PersistentVolumeClaim, Secret, Service},
	},
	apimachinery::pkg::version::Info,
	NamespaceResourceScope,
};
use kube::{
	api::{Api, ListParams},
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config, Resource,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

use crate::selection::ResourceKind;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your $KUBECONFIG")]
	ContextNotFound(String),

	#[error("no context given and your kubeconfig has no current-context")]
	NoCurrentContext,

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// A client bound to one kubeconfig context.
///
/// The context name travels with the client because the data transfer runs
/// `kubectl` against the same context.
#[derive(Clone)]
pub struct ClusterEndpoint {
	client: Client,
	server_version: Info,
	context: String,
}

impl std::fmt::Debug for ClusterEndpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterEndpoint")
			.field("context", &self.context)
			.field("server_version", &self.server_version)
			.finish_non_exhaustive()
	}
}

impl ClusterEndpoint {
	/// Connect using the kubeconfig from the environment.
	///
	/// `None` selects the kubeconfig's current context.
	#[instrument(skip_all)]
	pub async fn connect(context: Option<&str>) -> Result<Self, ConnectionError> {
		let kubeconfig = Kubeconfig::read()?;
		Self::connect_with_kubeconfig(context, kubeconfig).await
	}

	/// Connect to a context of a provided kubeconfig.
	#[instrument(skip(kubeconfig))]
	pub async fn connect_with_kubeconfig(
		context: Option<&str>,
		kubeconfig: Kubeconfig,
	) -> Result<Self, ConnectionError> {
		let context = match context {
			Some(name) => {
				if !kubeconfig.contexts.iter().any(|c| c.name == name) {
					return Err(ConnectionError::ContextNotFound(name.to_string()));
				}
				name.to_string()
			}
			None => kubeconfig
				.current_context
				.clone()
				.ok_or(ConnectionError::NoCurrentContext)?,
		};

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(context.clone()),
				..Default::default()
			},
		)
		.await?;
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		let server_version = client.apiserver_version().await?;
		tracing::debug!(
			context = %context,
			server_version = %format!("{}.{}", server_version.major, server_version.minor),
			"connected to cluster"
		);

		Ok(Self {
			client,
			server_version,
			context,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	pub fn server_version(&self) -> &Info {
		&self.server_version
	}

	/// Name of the kubeconfig context this endpoint is bound to.
	pub fn context(&self) -> &str {
		&self.context
	}

	/// Typed API for a namespaced kind.
	pub fn namespaced<K>(&self, namespace: &str) -> Api<K>
	where
		K: Resource<Scope = NamespaceResourceScope>,
		<K as Resource>::DynamicType: Default,
	{
		Api::namespaced(self.client.clone(), namespace)
	}

	/// Typed API for a cluster-scoped kind.
	pub fn cluster<K>(&self) -> Api<K>
	where
		K: Resource,
		<K as Resource>::DynamicType: Default,
	{
		Api::all(self.client.clone())
	}

	/// Names of every object of `kind` in `namespace`.
	#[instrument(skip(self))]
	pub async fn list_names(&self, kind: ResourceKind, namespace: &str) -> Result<Vec<String>, kube::Error> {
		match kind {
			ResourceKind::ConfigMap => self.list_names_of::<ConfigMap>(namespace).await,
			ResourceKind::Secret => self.list_names_of::<Secret>(namespace).await,
			ResourceKind::Service => self.list_names_of::<Service>(namespace).await,
			ResourceKind::Deployment => self.list_names_of::<Deployment>(namespace).await,
			ResourceKind::PersistentVolumeClaim => {
				self.list_names_of::<PersistentVolumeClaim>(namespace).await
			}
		}
	}

	/// Names of every namespace in the cluster.
	#[instrument(skip(self))]
	pub async fn namespace_names(&self) -> Result<Vec<String>, kube::Error> {
		let list = self
			.cluster::<Namespace>()
			.list(&ListParams::default())
			.await?;
		Ok(list
			.items
			.into_iter()
			.filter_map(|ns| ns.metadata.name)
			.collect())
	}

	async fn list_names_of<K>(&self, namespace: &str) -> Result<Vec<String>, kube::Error>
	where
		K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
		<K as Resource>::DynamicType: Default,
	{
		let list = self
			.namespaced::<K>(namespace)
			.list(&ListParams::default())
			.await?;
		Ok(list
			.items
			.iter()
			.filter_map(|item| item.meta().name.clone())
			.filter(|name| !name.is_empty())
			.collect())
	}
}

/// Context names in a kubeconfig, in file order.
pub fn context_names(kubeconfig: &Kubeconfig) -> Vec<String> {
	kubeconfig.contexts.iter().map(|c| c.name.clone()).collect()
}
