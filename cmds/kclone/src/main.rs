use anyhow::Result;
use clap::Parser;
use kclone::{
	cli::{Cli, Commands},
	commands::{self, util::BrokenPipeGuard},
	telemetry,
};

fn main() -> Result<()> {
	let cli = Cli::parse();

	let _telemetry = telemetry::init(cli.global.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Migrate(args) => commands::migrate::run(args, &cli.global, stdout),
		Commands::Clean(args) => commands::clean::run(args, &cli.global, stdout),
		Commands::List(args) => commands::list::run(args, &cli.global, stdout),
		Commands::Completions(args) => commands::complete::run(args, stdout),
	}
}
