//! List command handler.
//!
//! Without flags it lists kubeconfig contexts, with `--context` the namespaces
//! of that cluster, and with `--namespace` the resources kclone can select
//! there. The config catalog is consulted first at each level.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use kube::config::Kubeconfig;
use tabwriter::TabWriter;

use super::util::{block_on, known_names, load_config};
use crate::{
	cli::GlobalArgs,
	config::KcloneConfig,
	k8s::client::{context_names, ClusterEndpoint},
	selection::ResourceKind,
};

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
	/// Kubeconfig context to list namespaces or resources of
	#[arg(long)]
	pub context: Option<String>,

	/// Namespace to list resources of (uses the current context if --context is not given)
	#[arg(long)]
	pub namespace: Option<String>,
}

/// Run the list command.
pub fn run<W: Write>(args: ListArgs, global: &GlobalArgs, mut writer: W) -> Result<()> {
	let config = load_config(global.config.as_deref())?;

	if args.context.is_none() && args.namespace.is_none() {
		let contexts = match config.as_ref().and_then(KcloneConfig::cluster_names) {
			Some(names) => names,
			None => context_names(&Kubeconfig::read().context("reading kubeconfig")?),
		};
		for name in contexts {
			writeln!(writer, "{name}")?;
		}
		return Ok(());
	}

	block_on(run_async(args, config, writer))?
}

async fn run_async<W: Write>(args: ListArgs, config: Option<KcloneConfig>, mut writer: W) -> Result<()> {
	let endpoint = ClusterEndpoint::connect(args.context.as_deref())
		.await
		.context("connecting to cluster")?;

	let Some(namespace) = args.namespace else {
		let names = match config
			.as_ref()
			.and_then(|c| c.namespace_names(endpoint.context()))
		{
			Some(names) => names,
			None => endpoint
				.namespace_names()
				.await
				.context("listing namespaces")?,
		};
		for name in names {
			writeln!(writer, "{name}")?;
		}
		return Ok(());
	};

	let mut rows = Vec::new();
	for kind in ResourceKind::ALL {
		let names = known_names(config.as_ref(), &endpoint, &namespace, kind).await?;
		rows.push((kind, names));
	}
	write_resource_table(&mut writer, &rows)?;
	Ok(())
}

/// Write one `KIND  NAME` row per resource.
pub fn write_resource_table<W: Write>(writer: W, rows: &[(ResourceKind, Vec<String>)]) -> std::io::Result<()> {
	let mut tw = TabWriter::new(writer);
	writeln!(tw, "KIND\tNAME")?;
	for (kind, names) in rows {
		for name in names {
			writeln!(tw, "{kind}\t{name}")?;
		}
	}
	tw.flush()
}
