//! Migrate command handler.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::instrument;

use super::util::{block_on, describe_selection, load_config, prompt_confirmation, SelectionArgs};
use crate::{
	cli::GlobalArgs,
	config::{load_overwrite_file, MigrationSettings},
	k8s::{client::ClusterEndpoint, transfer::KubectlTunnel},
	migrate::Migrator,
	report::ConsoleReporter,
	selection::{OverwriteMap, ResourceKind},
};

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
	/// Kubeconfig context to read from (default: current context)
	#[arg(long)]
	pub source_context: Option<String>,

	/// Namespace to read from
	#[arg(long)]
	pub source_namespace: String,

	/// Kubeconfig context to create in (default: current context)
	#[arg(long)]
	pub dest_context: Option<String>,

	/// Namespace to create in
	#[arg(long)]
	pub dest_namespace: String,

	#[command(flatten)]
	pub selection: SelectionArgs,

	/// YAML or JSON map of resource name to partial spec merged before create
	#[arg(long)]
	pub overwrite_file: Option<PathBuf>,

	/// Skip interactive approval
	#[arg(long)]
	pub auto_approve: bool,
}

/// Run the migrate command.
pub fn run<W: Write + Send>(args: MigrateArgs, global: &GlobalArgs, writer: W) -> Result<()> {
	block_on(run_async(args, global, writer))?
}

#[instrument(skip_all, fields(source = %args.source_namespace, dest = %args.dest_namespace))]
async fn run_async<W: Write + Send>(args: MigrateArgs, global: &GlobalArgs, writer: W) -> Result<()> {
	let config = load_config(global.config.as_deref())?;

	let source = ClusterEndpoint::connect(args.source_context.as_deref())
		.await
		.context("connecting to source cluster")?;
	let dest = ClusterEndpoint::connect(args.dest_context.as_deref())
		.await
		.context("connecting to destination cluster")?;

	if source.context() == dest.context() && args.source_namespace == args.dest_namespace {
		anyhow::bail!(
			"source and destination are the same ({}/{})",
			source.context(),
			args.source_namespace
		);
	}

	let selection = args
		.selection
		.resolve(config.as_ref(), &source, &args.source_namespace)
		.await?;
	if selection.is_empty() {
		tracing::info!("nothing selected, nothing to migrate");
		return Ok(());
	}

	let mut overwrites: OverwriteMap = config
		.as_ref()
		.map(|c| c.overwrites(&args.source_namespace))
		.unwrap_or_default();
	if let Some(path) = &args.overwrite_file {
		overwrites.extend(load_overwrite_file(path)?);
	}

	let mut order = ResourceKind::MIGRATION_ORDER.to_vec();
	order.push(ResourceKind::PersistentVolumeClaim);
	eprintln!(
		"Migrating from {}/{} to {}/{}:\n{}",
		source.context(),
		args.source_namespace,
		dest.context(),
		args.dest_namespace,
		describe_selection(&selection, &order)
	);
	if !args.auto_approve && !prompt_confirmation("Proceed with migration?")? {
		eprintln!("Migration cancelled.");
		return Ok(());
	}

	let settings = config
		.as_ref()
		.map_or_else(MigrationSettings::default, |c| c.migration.settings());
	let copier = KubectlTunnel::new(settings.kubectl.clone(), settings.worker.mount_path.clone());
	let reporter = ConsoleReporter::new(writer, global.color);

	let report = Migrator::new(source, dest, settings, Box::new(copier), &reporter)
		.migrate_resources(
			&args.source_namespace,
			&args.dest_namespace,
			&selection,
			Some(&overwrites),
		)
		.await;

	let mut writer = reporter.into_inner();
	writeln!(writer)?;
	report.write_summary(&mut writer)?;

	if report.has_failures() {
		anyhow::bail!("migration finished with failures");
	}
	Ok(())
}
