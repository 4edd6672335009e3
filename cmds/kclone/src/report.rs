//! Per-resource outcomes and the sinks they are reported to.

use std::{
	fmt,
	io::{self, IsTerminal, Write},
	sync::Mutex,
};

use clap::ValueEnum;
use nu_ansi_term::{Color, Style};
use tabwriter::TabWriter;

use crate::selection::ResourceKind;

/// What a run was doing when an outcome was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	Migrate,
	Delete,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Action::Migrate => f.write_str("migrate"),
			Action::Delete => f.write_str("delete"),
		}
	}
}

/// Result of processing one selected resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
	Migrated {
		kind: ResourceKind,
		name: String,
	},
	Deleted {
		kind: ResourceKind,
		name: String,
	},
	/// The destination already had an object with this name.
	Skipped {
		kind: ResourceKind,
		name: String,
	},
	Failed {
		kind: ResourceKind,
		name: String,
		action: Action,
		message: String,
	},
}

impl Outcome {
	pub fn kind(&self) -> ResourceKind {
		match self {
			Outcome::Migrated { kind, .. }
			| Outcome::Deleted { kind, .. }
			| Outcome::Skipped { kind, .. }
			| Outcome::Failed { kind, .. } => *kind,
		}
	}

	pub fn name(&self) -> &str {
		match self {
			Outcome::Migrated { name, .. }
			| Outcome::Deleted { name, .. }
			| Outcome::Skipped { name, .. }
			| Outcome::Failed { name, .. } => name,
		}
	}

	pub fn is_failure(&self) -> bool {
		matches!(self, Outcome::Failed { .. })
	}
}

impl fmt::Display for Outcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Outcome::Migrated { kind, name } => write!(f, "{kind} {name} migrated."),
			Outcome::Deleted { kind, name } => write!(f, "{kind} {name} deleted."),
			Outcome::Skipped { kind, name } => {
				write!(f, "{kind} '{name}' already exists in destination. Skipping.")
			}
			Outcome::Failed {
				kind,
				name,
				action,
				message,
			} => write!(f, "Failed to {action} {kind} {name}: {message}"),
		}
	}
}

/// Sink for resource outcomes.
pub trait Reporter: Send + Sync {
	fn report(&self, outcome: &Outcome);
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
	/// Colorize when stdout is a terminal.
	#[default]
	Auto,
	Always,
	Never,
}

impl ColorMode {
	pub fn should_colorize(self) -> bool {
		match self {
			ColorMode::Auto => io::stdout().is_terminal(),
			ColorMode::Always => true,
			ColorMode::Never => false,
		}
	}
}

/// Writes one line per outcome, with a colored category tag.
pub struct ConsoleReporter<W> {
	writer: Mutex<W>,
	use_color: bool,
}

impl<W: Write + Send> ConsoleReporter<W> {
	pub fn new(writer: W, color: ColorMode) -> Self {
		Self {
			writer: Mutex::new(writer),
			use_color: color.should_colorize(),
		}
	}

	pub fn into_inner(self) -> W {
		self.writer
			.into_inner()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	fn tag(&self, outcome: &Outcome) -> String {
		let (tag, color) = match outcome {
			Outcome::Migrated { .. } | Outcome::Deleted { .. } => ("[SUCCESS]", Color::Green),
			Outcome::Skipped { .. } => ("[SKIPPED]", Color::Yellow),
			Outcome::Failed { .. } => ("[ERROR]", Color::Red),
		};
		if self.use_color {
			Style::new().bold().fg(color).paint(tag).to_string()
		} else {
			tag.to_string()
		}
	}
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
	fn report(&self, outcome: &Outcome) {
		match outcome {
			Outcome::Failed { .. } => tracing::error!(kind = %outcome.kind(), name = outcome.name(), "{outcome}"),
			Outcome::Skipped { .. } => tracing::warn!(kind = %outcome.kind(), name = outcome.name(), "{outcome}"),
			_ => tracing::debug!(kind = %outcome.kind(), name = outcome.name(), "{outcome}"),
		}

		let tag = self.tag(outcome);
		let mut writer = self
			.writer
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner);
		// Console output is best-effort; a closed stdout must not abort the run.
		let _ = writeln!(writer, "{tag} {outcome}");
	}
}

/// Keeps outcomes in memory, in the order they were reported.
#[derive(Default)]
pub struct MemoryReporter {
	outcomes: Mutex<Vec<Outcome>>,
}

impl MemoryReporter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn outcomes(&self) -> Vec<Outcome> {
		self.outcomes
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.clone()
	}
}

impl Reporter for MemoryReporter {
	fn report(&self, outcome: &Outcome) {
		self.outcomes
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.push(outcome.clone());
	}
}

/// Every outcome of one migration or clean run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
	pub outcomes: Vec<Outcome>,
}

impl RunReport {
	pub fn push(&mut self, outcome: Outcome) {
		self.outcomes.push(outcome);
	}

	pub fn has_failures(&self) -> bool {
		self.outcomes.iter().any(Outcome::is_failure)
	}

	fn tally(&self, kind: ResourceKind) -> [usize; 3] {
		let mut counts = [0; 3];
		for outcome in self.outcomes.iter().filter(|o| o.kind() == kind) {
			let slot = match outcome {
				Outcome::Migrated { .. } | Outcome::Deleted { .. } => 0,
				Outcome::Skipped { .. } => 1,
				Outcome::Failed { .. } => 2,
			};
			counts[slot] += 1;
		}
		counts
	}

	/// Write a per-kind table of succeeded, skipped and failed counts.
	pub fn write_summary<W: Write>(&self, writer: W) -> io::Result<()> {
		let mut tw = TabWriter::new(writer);
		writeln!(tw, "KIND\tOK\tSKIPPED\tFAILED")?;
		for kind in ResourceKind::ALL {
			let [ok, skipped, failed] = self.tally(kind);
			if ok + skipped + failed == 0 {
				continue;
			}
			writeln!(tw, "{kind}\t{ok}\t{skipped}\t{failed}")?;
		}
		tw.flush()
	}
}
