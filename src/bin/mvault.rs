//! `mvault` — thin command-line front end over `mc_backup`.
//!
//! Carries no engine logic of its own: argument parsing, a progress sink
//! that prints to stderr, and a tracing subscriber.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mc_backup::region::RegionFile;
use mc_backup::{BackupManager, DiffBackupManager};

#[derive(Parser)]
#[command(name = "mvault", about = "Incremental diff backups for Minecraft worlds")]
struct Cli {
	/// World directory to back up or restore into.
	#[arg(long, global = true, default_value = "world")]
	world: PathBuf,

	/// Directory holding backups.dat/backups.json and archive files.
	#[arg(long, global = true, default_value = "backups")]
	backup_dir: PathBuf,

	/// Worker thread count; defaults to available parallelism.
	#[arg(long, global = true)]
	jobs: Option<usize>,

	/// Increase log verbosity; repeat for more (-v, -vv).
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Take a new backup of the world directory.
	Create {
		#[arg(long)]
		desc: Option<String>,
	},
	/// Restore the world directory to the state at chain index `index`.
	Restore { index: usize },
	/// Delete the backup at chain index `index`, merging history as needed.
	Delete { index: usize },
	/// List backups, newest first.
	List,
	/// Compare two region files and print a diagnostic summary.
	Diff { a: PathBuf, b: PathBuf },
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	install_tracing(cli.verbose);

	match run(cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("error: {err}");
			ExitCode::FAILURE
		}
	}
}

fn install_tracing(verbose: u8) {
	let default_directive = match verbose {
		0 => "mc_backup=info,mvault=info",
		1 => "mc_backup=debug,mvault=debug",
		_ => "mc_backup=trace,mvault=trace",
	};
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn progress_sink(phrase: &str) {
	eprintln!("{phrase}");
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
	if let Command::Diff { a, b } = &cli.command {
		let region_a = RegionFile::open(a)?;
		let region_b = RegionFile::open(b)?;
		let report = region_a.report_diff(&region_b, true)?;
		println!("{report:#?}");
		return Ok(());
	}

	let manager = DiffBackupManager::new(cli.world, cli.backup_dir, cli.jobs)?;

	match cli.command {
		Command::Create { desc } => {
			let info = manager.create_backup(desc, &mut progress_sink)?;
			println!("created backup {} at {}", info.id, info.timestamp);
		}
		Command::Restore { index } => {
			manager.restore_backup(index, &mut progress_sink)?;
			println!("restored backup {index}");
		}
		Command::Delete { index } => {
			manager.delete_backup(index, &mut progress_sink)?;
			println!("deleted backup {index}");
		}
		Command::List => {
			for (idx, info) in manager.list_backups()?.into_iter().enumerate() {
				let desc = info.desc.as_deref().unwrap_or("");
				println!("{idx:>3}  {}  {}  {desc}", info.timestamp, info.id);
			}
		}
		Command::Diff { .. } => unreachable!("handled above"),
	}

	Ok(())
}
