//! Command dispatch.

mod check;
mod init;
mod run;

use anyhow::Result;

use crate::cli::{Cli, Commands};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Run {
			config,
			account,
			stagger,
		} => run::run(config, account, stagger).await,
		Commands::Check { config } => check::check(&config),
		Commands::Init { path, force } => init::init(&path, force),
	}
}
