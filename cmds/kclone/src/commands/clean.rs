//! Clean command handler.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use tracing::instrument;

use super::util::{block_on, describe_selection, load_config, prompt_confirmation, SelectionArgs};
use crate::{
	clean::Cleaner,
	cli::GlobalArgs,
	k8s::client::ClusterEndpoint,
	report::ConsoleReporter,
	selection::ResourceKind,
};

#[derive(Args, Debug, Clone)]
pub struct CleanArgs {
	/// Kubeconfig context to delete from (default: current context)
	#[arg(long)]
	pub context: Option<String>,

	/// Namespace to delete from
	#[arg(long)]
	pub namespace: String,

	#[command(flatten)]
	pub selection: SelectionArgs,

	/// Skip interactive approval
	#[arg(long)]
	pub auto_approve: bool,
}

/// Run the clean command.
pub fn run<W: Write + Send>(args: CleanArgs, global: &GlobalArgs, writer: W) -> Result<()> {
	block_on(run_async(args, global, writer))?
}

#[instrument(skip_all, fields(namespace = %args.namespace))]
async fn run_async<W: Write + Send>(args: CleanArgs, global: &GlobalArgs, writer: W) -> Result<()> {
	let config = load_config(global.config.as_deref())?;

	let endpoint = ClusterEndpoint::connect(args.context.as_deref())
		.await
		.context("connecting to cluster")?;

	let selection = args
		.selection
		.resolve(config.as_ref(), &endpoint, &args.namespace)
		.await?;
	if selection.is_empty() {
		tracing::info!("nothing selected, nothing to delete");
		return Ok(());
	}

	eprintln!(
		"Deleting from {}/{}:\n{}",
		endpoint.context(),
		args.namespace,
		describe_selection(&selection, &ResourceKind::DELETION_ORDER)
	);
	if !args.auto_approve && !prompt_confirmation("Delete these resources?")? {
		eprintln!("Deletion cancelled.");
		return Ok(());
	}

	let reporter = ConsoleReporter::new(writer, global.color);
	let report = Cleaner::new(endpoint, &reporter)
		.clean_resources(&args.namespace, &selection)
		.await;

	let mut writer = reporter.into_inner();
	writeln!(writer)?;
	report.write_summary(&mut writer)?;

	if report.has_failures() {
		anyhow::bail!("clean finished with failures");
	}
	Ok(())
}
