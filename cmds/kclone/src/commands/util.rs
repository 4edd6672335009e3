//! Utilities for command handlers.

use std::{
	env,
	future::Future,
	io::{self, ErrorKind, Write},
};

use anyhow::{Context, Result};
use clap::Args;

use crate::{
	config::KcloneConfig,
	k8s::client::ClusterEndpoint,
	selection::{ResourceKind, ResourceSelection},
};

/// Run a command's async body on a fresh multi-threaded runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;
	Ok(runtime.block_on(future))
}

/// Load the config named on the command line, from `$KCLONE_CONFIG`, or found
/// by searching upward from the working directory.
pub fn load_config(explicit: Option<&std::path::Path>) -> Result<Option<KcloneConfig>> {
	let cwd = env::current_dir().context("reading current directory")?;
	KcloneConfig::resolve(explicit, &cwd)
}

/// Ask a yes/no question on stderr; only `y` or `yes` count as yes.
pub fn prompt_confirmation(question: &str) -> Result<bool> {
	eprint!("\n{question} [y/N]: ");
	io::stderr().flush()?;

	let mut input = String::new();
	io::stdin().read_line(&mut input)?;

	let input = input.trim().to_lowercase();
	Ok(input == "y" || input == "yes")
}

/// Resource name flags shared by `migrate` and `clean`.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
	/// ConfigMap to include (repeatable)
	#[arg(long = "config-map", value_name = "NAME")]
	pub config_maps: Vec<String>,

	/// Secret to include (repeatable)
	#[arg(long = "secret", value_name = "NAME")]
	pub secrets: Vec<String>,

	/// Service to include (repeatable)
	#[arg(long = "service", value_name = "NAME")]
	pub services: Vec<String>,

	/// Deployment to include (repeatable)
	#[arg(long = "deployment", value_name = "NAME")]
	pub deployments: Vec<String>,

	/// PersistentVolumeClaim to include (repeatable)
	#[arg(long = "pvc", value_name = "NAME")]
	pub pvcs: Vec<String>,

	/// Include every resource known for the namespace, from the config
	/// catalog when it lists the kind and from the cluster otherwise
	#[arg(long)]
	pub all: bool,
}

impl SelectionArgs {
	fn flag_names(&self, kind: ResourceKind) -> &[String] {
		match kind {
			ResourceKind::ConfigMap => &self.config_maps,
			ResourceKind::Secret => &self.secrets,
			ResourceKind::Service => &self.services,
			ResourceKind::Deployment => &self.deployments,
			ResourceKind::PersistentVolumeClaim => &self.pvcs,
		}
	}

	/// Selection made of the names given as flags.
	pub fn explicit(&self) -> Result<ResourceSelection> {
		let mut selection = ResourceSelection::new();
		for kind in ResourceKind::ALL {
			for name in self.flag_names(kind) {
				selection.insert(kind, name.as_str())?;
			}
		}
		Ok(selection)
	}

	/// Selection from flags, extended with every known resource when `--all`
	/// is set.
	pub async fn resolve(
		&self,
		config: Option<&KcloneConfig>,
		endpoint: &ClusterEndpoint,
		namespace: &str,
	) -> Result<ResourceSelection> {
		let mut selection = self.explicit()?;
		if self.all {
			for kind in ResourceKind::ALL {
				for name in known_names(config, endpoint, namespace, kind).await? {
					selection.insert(kind, name)?;
				}
			}
		}
		Ok(selection)
	}
}

/// Names of `kind` in `namespace`: the catalog's list if it has one,
/// otherwise whatever the cluster has.
pub async fn known_names(
	config: Option<&KcloneConfig>,
	endpoint: &ClusterEndpoint,
	namespace: &str,
	kind: ResourceKind,
) -> Result<Vec<String>> {
	if let Some(names) = config.and_then(|c| c.resource_names(namespace, kind)) {
		return Ok(names);
	}
	endpoint
		.list_names(kind, namespace)
		.await
		.with_context(|| format!("listing {kind}s in namespace {namespace}"))
}

/// Human-readable list of what a run will touch, one kind per line.
pub fn describe_selection(selection: &ResourceSelection, order: &[ResourceKind]) -> String {
	let mut out = String::new();
	for &kind in order {
		if selection.count(kind) == 0 {
			continue;
		}
		let names: Vec<_> = selection.names(kind).collect();
		out.push_str(&format!("  {kind}: {}\n", names.join(", ")));
	}
	out
}

/// A writer wrapper that silently handles broken pipe errors.
///
/// Lets commands exit cleanly when output is piped to a process that closes
/// early (e.g. `kclone list --context prod | head -1`).
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;
	use crate::selection::SelectionError;

	#[test]
	fn test_explicit_selection() {
		let args = SelectionArgs {
			config_maps: vec!["cfg-a".to_string()],
			deployments: vec!["dep-a".to_string(), "dep-b".to_string(), "dep-a".to_string()],
			..Default::default()
		};
		let selection = args.explicit().unwrap();
		assert_eq!(selection.total(), 3);
		assert_eq!(
			selection.names(ResourceKind::Deployment).collect::<Vec<_>>(),
			vec!["dep-a", "dep-b"]
		);
	}

	#[test]
	fn test_explicit_selection_rejects_blank() {
		let args = SelectionArgs {
			pvcs: vec![String::new()],
			..Default::default()
		};
		let err = args.explicit().unwrap_err();
		assert_matches!(
			err.downcast_ref::<SelectionError>(),
			Some(SelectionError::EmptyName(ResourceKind::PersistentVolumeClaim))
		);
	}

	#[test]
	fn test_describe_selection() {
		let selection = ResourceSelection::new()
			.with(ResourceKind::Secret, ["sec-a"])
			.unwrap()
			.with(ResourceKind::Deployment, ["dep-a", "dep-b"])
			.unwrap();

		assert_eq!(
			describe_selection(&selection, &ResourceKind::DELETION_ORDER),
			"  Deployment: dep-a, dep-b\n  Secret: sec-a\n"
		);
	}

	#[test]
	fn test_broken_pipe_guard() {
		struct ClosedPipe;
		impl Write for ClosedPipe {
			fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
				Err(io::Error::from(ErrorKind::BrokenPipe))
			}
			fn flush(&mut self) -> io::Result<()> {
				Err(io::Error::from(ErrorKind::BrokenPipe))
			}
		}

		let mut guard = BrokenPipeGuard::new(ClosedPipe);
		assert_eq!(guard.write(b"abc").unwrap(), 3);
		guard.flush().unwrap();
	}
}
