//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::Level;

use crate::{commands, report::ColorMode};

#[derive(Parser)]
#[command(name = "kclone")]
#[command(about = "Copy or delete Kubernetes resources between namespaces and clusters", long_about = None)]
#[command(version = env!("KCLONE_VERSION"))]
pub struct Cli {
	#[command(flatten)]
	pub global: GlobalArgs,

	#[command(subcommand)]
	pub command: Commands,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
	/// Log level: error, warn, info, debug or trace. Overrides RUST_LOG
	#[arg(long, global = true)]
	pub log_level: Option<Level>,

	/// Controls color in outcome lines
	#[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
	pub color: ColorMode,

	/// Config file to use instead of searching for .kclone.yaml (also KCLONE_CONFIG)
	#[arg(long, global = true)]
	pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Copy resources from a source namespace into a destination namespace
	Migrate(commands::migrate::MigrateArgs),

	/// Delete resources from a namespace
	Clean(commands::clean::CleanArgs),

	/// List contexts, namespaces or resources available for selection
	List(commands::list::ListArgs),

	/// Print shell completions
	Completions(commands::complete::CompleteArgs),
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn test_cli_definition() {
		Cli::command().debug_assert();
	}

	#[test]
	fn test_parse_migrate() {
		let cli = Cli::try_parse_from([
			"kclone",
			"migrate",
			"--source-context",
			"prod",
			"--source-namespace",
			"shop",
			"--dest-context",
			"staging",
			"--dest-namespace",
			"shop",
			"--config-map",
			"cfg-a",
			"--pvc",
			"data",
			"--auto-approve",
			"--log-level",
			"debug",
		])
		.unwrap();

		assert_eq!(cli.global.log_level, Some(Level::DEBUG));
		let Commands::Migrate(args) = cli.command else {
			panic!("expected migrate");
		};
		assert_eq!(args.source_context.as_deref(), Some("prod"));
		assert_eq!(args.selection.config_maps, vec!["cfg-a"]);
		assert_eq!(args.selection.pvcs, vec!["data"]);
		assert!(args.auto_approve);
	}

	#[test]
	fn test_migrate_requires_namespaces() {
		let result = Cli::try_parse_from(["kclone", "migrate", "--source-namespace", "a"]);
		assert!(result.is_err());
	}
}
