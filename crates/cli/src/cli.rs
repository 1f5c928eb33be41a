use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "idlefarm")]
#[command(about = "Keeps presence sessions alive and banks activity hours")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Farm the configured accounts until stopped or all targets complete
	Run {
		/// Account roster file
		#[arg(short, long, default_value = "accounts.json")]
		config: PathBuf,

		/// Farm only this account from the roster
		#[arg(short, long)]
		account: Option<String>,

		/// Seconds between account starts in fleet mode
		#[arg(long, default_value = "2")]
		stagger: u64,
	},

	/// Validate the roster and print the farming plan
	Check {
		/// Account roster file
		#[arg(short, long, default_value = "accounts.json")]
		config: PathBuf,
	},

	/// Write a sample roster file
	Init {
		/// Where to write the roster
		#[arg(default_value = "accounts.json")]
		path: PathBuf,

		/// Overwrite an existing file
		#[arg(long, short)]
		force: bool,
	},
}
