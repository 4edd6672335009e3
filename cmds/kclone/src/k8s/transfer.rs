//! Copying the contents of a PVC between clusters.
//!
//! One worker pod per side mounts the claim. Once both are running, the files
//! are streamed as a tar archive from the sender to the receiver through two
//! piped `kubectl exec` processes. The pods are deleted whatever happens.

use std::{
	collections::BTreeMap,
	io::{self, Read},
	path::{Path, PathBuf},
	process::{Child, Command, ExitStatus, Stdio},
	thread,
	time::Duration,
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
	Container, PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use thiserror::Error;
use tracing::instrument;

use super::{api_message, client::ClusterEndpoint};

/// Longest name a pod may carry and still be a valid DNS label.
pub const MAX_POD_NAME_LEN: usize = 63;

const WORKER_CONTAINER: &str = "worker";
const DATA_VOLUME: &str = "data";

#[derive(Debug, Error)]
pub enum TransferError {
	#[error("creating pod {name}: {message}")]
	CreatePod { name: String, message: String },

	#[error("reading pod {name}: {message}")]
	ReadPod { name: String, message: String },

	#[error("pod {name} did not start in time")]
	PodStartTimeout { name: String },

	#[error("data transfer failed with exit code {code}")]
	TransferFailure { code: i32 },

	#[error("running kubectl")]
	Spawn(#[source] std::io::Error),
}

/// Which end of the copy a worker pod serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
	Sender,
	Receiver,
}

impl WorkerRole {
	fn as_str(self) -> &'static str {
		match self {
			WorkerRole::Sender => "sender",
			WorkerRole::Receiver => "receiver",
		}
	}
}

/// Name for a worker pod, e.g. `migration-sender-data-1718000000000`.
///
/// The claim segment is shortened when needed to stay within
/// [`MAX_POD_NAME_LEN`].
pub fn worker_pod_name(role: WorkerRole, claim: &str, timestamp: u128) -> String {
	let prefix = format!("migration-{}-", role.as_str());
	let suffix = format!("-{timestamp}");
	let room = MAX_POD_NAME_LEN.saturating_sub(prefix.len() + suffix.len());
	let claim: String = claim.chars().take(room).collect();
	let claim = claim.trim_end_matches(['-', '.']);
	format!("{prefix}{claim}{suffix}")
}

/// A pod that mounts `claim` and idles until it is deleted.
pub fn worker_pod(name: &str, claim: &str, image: &str, mount_path: &str) -> Pod {
	Pod {
		metadata: ObjectMeta {
			name: Some(name.to_string()),
			labels: Some(BTreeMap::from([(
				"app.kubernetes.io/managed-by".to_string(),
				"kclone".to_string(),
			)])),
			..Default::default()
		},
		spec: Some(PodSpec {
			containers: vec![Container {
				name: WORKER_CONTAINER.to_string(),
				image: Some(image.to_string()),
				command: Some(vec![
					"tail".to_string(),
					"-f".to_string(),
					"/dev/null".to_string(),
				]),
				volume_mounts: Some(vec![VolumeMount {
					name: DATA_VOLUME.to_string(),
					mount_path: mount_path.to_string(),
					..Default::default()
				}]),
				..Default::default()
			}],
			volumes: Some(vec![Volume {
				name: DATA_VOLUME.to_string(),
				persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
					claim_name: claim.to_string(),
					read_only: None,
				}),
				..Default::default()
			}]),
			restart_policy: Some("Never".to_string()),
			..Default::default()
		}),
		status: None,
	}
}

/// A worker pod as seen by `kubectl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
	pub context: String,
	pub namespace: String,
	pub name: String,
}

/// Streams the mounted data of one pod into another.
#[async_trait]
pub trait StreamCopier: Send + Sync {
	/// Run the copy and return its exit code; `0` means success.
	async fn stream_copy(&self, source: &PodRef, dest: &PodRef) -> Result<i32, TransferError>;
}

/// [`StreamCopier`] that pipes `kubectl exec ... tar cf -` into
/// `kubectl exec -i ... tar xf -`.
#[derive(Debug, Clone)]
pub struct KubectlTunnel {
	kubectl: PathBuf,
	mount_path: String,
}

impl KubectlTunnel {
	pub fn new(kubectl: impl Into<PathBuf>, mount_path: impl Into<String>) -> Self {
		Self {
			kubectl: kubectl.into(),
			mount_path: mount_path.into(),
		}
	}

	pub fn sender_args(&self, pod: &PodRef) -> Vec<String> {
		[
			"--context",
			pod.context.as_str(),
			"exec",
			pod.name.as_str(),
			"-n",
			pod.namespace.as_str(),
			"--",
			"tar",
			"cf",
			"-",
			"-C",
			self.mount_path.as_str(),
			".",
		]
		.map(str::to_string)
		.into()
	}

	pub fn receiver_args(&self, pod: &PodRef) -> Vec<String> {
		[
			"--context",
			pod.context.as_str(),
			"exec",
			"-i",
			pod.name.as_str(),
			"-n",
			pod.namespace.as_str(),
			"--",
			"tar",
			"xf",
			"-",
			"-C",
			self.mount_path.as_str(),
		]
		.map(str::to_string)
		.into()
	}

	fn run_pipeline(kubectl: &Path, sender_args: &[String], receiver_args: &[String]) -> Result<i32, TransferError> {
		let mut sender = Command::new(kubectl)
			.args(sender_args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(TransferError::Spawn)?;

		let Some(archive) = sender.stdout.take() else {
			let _ = sender.kill();
			let _ = sender.wait();
			return Err(TransferError::Spawn(std::io::Error::other("failed to capture kubectl stdout")));
		};

		let mut receiver = match Command::new(kubectl)
			.args(receiver_args)
			.stdin(Stdio::from(archive))
			.stdout(Stdio::null())
			.stderr(Stdio::piped())
			.spawn()
		{
			Ok(child) => child,
			Err(e) => {
				let _ = sender.kill();
				let _ = sender.wait();
				return Err(TransferError::Spawn(e));
			}
		};

		let sender_stderr = sender.stderr.take().map(collect_in_background);
		let receiver_stderr = receiver.stderr.take().map(collect_in_background);

		let statuses = settle_sender(receiver.wait(), &mut sender);

		for (side, handle) in [("sender", sender_stderr), ("receiver", receiver_stderr)] {
			let Some(output) = handle.and_then(|h| h.join().ok()) else {
				continue;
			};
			if !output.trim().is_empty() {
				tracing::debug!(side, stderr = %output.trim(), "kubectl exec output");
			}
		}

		let (receiver_status, sender_status) = statuses.map_err(TransferError::Spawn)?;
		Ok(pipeline_exit_code(receiver_status, sender_status))
	}
}

/// Reap the sender once the receiver is done.
///
/// If the receiver could not be waited on, the sender is killed first so that
/// no `kubectl` process outlives the pipeline.
fn settle_sender(receiver: io::Result<ExitStatus>, sender: &mut Child) -> io::Result<(ExitStatus, ExitStatus)> {
	match receiver {
		Ok(receiver_status) => Ok((receiver_status, sender.wait()?)),
		Err(e) => {
			let _ = sender.kill();
			let _ = sender.wait();
			Err(e)
		}
	}
}

fn collect_in_background<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
	thread::spawn(move || {
		let mut buf = Vec::new();
		reader.read_to_end(&mut buf).ok();
		String::from_utf8_lossy(&buf).into_owned()
	})
}

/// First non-zero exit code of the receiver, then the sender.
///
/// A process killed by a signal has no code and counts as `-1`.
fn pipeline_exit_code(receiver: ExitStatus, sender: ExitStatus) -> i32 {
	first_failure(receiver.code(), sender.code())
}

fn first_failure(receiver: Option<i32>, sender: Option<i32>) -> i32 {
	[receiver, sender]
		.into_iter()
		.map(|code| code.unwrap_or(-1))
		.find(|code| *code != 0)
		.unwrap_or(0)
}

#[async_trait]
impl StreamCopier for KubectlTunnel {
	#[instrument(skip_all, fields(sender = %source.name, receiver = %dest.name))]
	async fn stream_copy(&self, source: &PodRef, dest: &PodRef) -> Result<i32, TransferError> {
		let kubectl = self.kubectl.clone();
		let sender_args = self.sender_args(source);
		let receiver_args = self.receiver_args(dest);
		tokio::task::spawn_blocking(move || Self::run_pipeline(&kubectl, &sender_args, &receiver_args))
			.await
			.map_err(|e| TransferError::Spawn(std::io::Error::other(e)))?
	}
}

/// Settings for the worker pods and their readiness polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
	pub image: String,
	pub mount_path: String,
	pub poll_interval: Duration,
	pub poll_attempts: u32,
}

/// Runs the data phase for one claim that already exists on both sides.
pub struct DataTransfer<'a> {
	pub source: &'a ClusterEndpoint,
	pub dest: &'a ClusterEndpoint,
	pub settings: &'a WorkerSettings,
	pub copier: &'a dyn StreamCopier,
}

impl DataTransfer<'_> {
	/// Create both worker pods, wait for them, stream the data, then delete
	/// the pods.
	#[instrument(skip(self))]
	pub async fn run(
		&self,
		claim: &str,
		source_namespace: &str,
		dest_namespace: &str,
		timestamp: u128,
	) -> Result<(), TransferError> {
		let sender = PodRef {
			context: self.source.context().to_string(),
			namespace: source_namespace.to_string(),
			name: worker_pod_name(WorkerRole::Sender, claim, timestamp),
		};
		let receiver = PodRef {
			context: self.dest.context().to_string(),
			namespace: dest_namespace.to_string(),
			name: worker_pod_name(WorkerRole::Receiver, claim, timestamp),
		};
		let sender_api: Api<Pod> = self.source.namespaced(source_namespace);
		let receiver_api: Api<Pod> = self.dest.namespaced(dest_namespace);

		let result = self
			.copy_with_workers(claim, &sender_api, &sender, &receiver_api, &receiver)
			.await;

		delete_quietly(&sender_api, &sender.name).await;
		delete_quietly(&receiver_api, &receiver.name).await;

		result
	}

	async fn copy_with_workers(
		&self,
		claim: &str,
		sender_api: &Api<Pod>,
		sender: &PodRef,
		receiver_api: &Api<Pod>,
		receiver: &PodRef,
	) -> Result<(), TransferError> {
		self.create_worker(sender_api, &sender.name, claim).await?;
		self.create_worker(receiver_api, &receiver.name, claim).await?;

		wait_for_running(
			sender_api,
			&sender.name,
			self.settings.poll_interval,
			self.settings.poll_attempts,
		)
		.await?;
		wait_for_running(
			receiver_api,
			&receiver.name,
			self.settings.poll_interval,
			self.settings.poll_attempts,
		)
		.await?;

		tracing::info!(sender = %sender.name, receiver = %receiver.name, "streaming volume data");
		match self.copier.stream_copy(sender, receiver).await? {
			0 => Ok(()),
			code => Err(TransferError::TransferFailure { code }),
		}
	}

	async fn create_worker(&self, api: &Api<Pod>, name: &str, claim: &str) -> Result<(), TransferError> {
		let pod = worker_pod(name, claim, &self.settings.image, &self.settings.mount_path);
		api.create(&PostParams::default(), &pod)
			.await
			.map_err(|e| TransferError::CreatePod {
				name: name.to_string(),
				message: api_message(&e),
			})?;
		Ok(())
	}
}

/// Poll a pod until its phase is `Running`.
///
/// The pod is read at most `attempts` times, `interval` apart.
#[instrument(skip(api))]
pub async fn wait_for_running(
	api: &Api<Pod>,
	name: &str,
	interval: Duration,
	attempts: u32,
) -> Result<(), TransferError> {
	for attempt in 1..=attempts {
		let pod = api.get(name).await.map_err(|e| TransferError::ReadPod {
			name: name.to_string(),
			message: api_message(&e),
		})?;
		let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
		if phase == Some("Running") {
			return Ok(());
		}
		tracing::trace!(attempt, phase = ?phase, "pod not running yet");
		if attempt < attempts {
			tokio::time::sleep(interval).await;
		}
	}
	Err(TransferError::PodStartTimeout {
		name: name.to_string(),
	})
}

async fn delete_quietly(api: &Api<Pod>, name: &str) {
	if let Err(e) = api.delete(name, &DeleteParams::default()).await {
		tracing::debug!(pod = name, error = %api_message(&e), "ignoring worker pod cleanup failure");
	}
}
