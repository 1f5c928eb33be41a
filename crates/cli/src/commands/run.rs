//! `run` — farm the configured accounts until stopped or complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::info;

use idlefarm::{
	AccountIdentity, EventKind, FarmEvent, FleetRunner, OrchestratorConfig, SessionOrchestrator,
};
use idlefarm_provider::SessionProvider;
use idlefarm_provider::sim::SimProvider;

use crate::config::{self, RosterEntry};
use crate::console;

pub async fn run(config_path: PathBuf, only_account: Option<String>, stagger: u64) -> Result<()> {
	let roster = config::load_roster(&config_path)?;
	let mut entries = roster.accounts;
	if let Some(name) = &only_account {
		entries.retain(|entry| &entry.name == name);
		if entries.is_empty() {
			bail!("account {name:?} is not in the roster");
		}
	}

	let data_dir = config::data_dir();
	info!(
		target = "farm",
		accounts = entries.len(),
		data_dir = %data_dir.display(),
		"starting"
	);

	let (done_tx, mut done_rx) = mpsc::unbounded_channel();
	let mut orchestrators = Vec::with_capacity(entries.len());
	for entry in &entries {
		let orchestrator = build_orchestrator(entry, &data_dir)?;
		orchestrator.set_completion_sink(done_tx.clone());
		watch_challenges(&orchestrator);
		orchestrators.push(orchestrator);
	}
	drop(done_tx);

	// Completion echoes go straight to the terminal.
	let printer = tokio::spawn(async move {
		while let Some(done) = done_rx.recv().await {
			println!(
				"{} finished {} after {:.1}h",
				done.account.bold(),
				done.entry,
				done.total_secs / 3600.0
			);
		}
	});

	let fleet = Arc::new(FleetRunner::new(
		orchestrators,
		Duration::from_secs(stagger),
	));
	fleet.start().await;

	tokio::select! {
		_ = console::run_console(Arc::clone(&fleet)) => {}
		_ = tokio::signal::ctrl_c() => {
			println!("\ninterrupted; shutting down");
		}
		_ = fleet.wait() => {
			println!("all accounts finished");
		}
	}

	fleet.shutdown().await;
	printer.abort();
	Ok(())
}

fn build_orchestrator(entry: &RosterEntry, data_dir: &Path) -> Result<SessionOrchestrator> {
	let identity = AccountIdentity {
		account: entry.name.clone(),
		password: entry.password.clone(),
		otp_seed: entry.shared_secret.clone(),
	};
	Ok(SessionOrchestrator::new(
		identity,
		entry.activities.clone(),
		entry.target_spec()?,
		entry.custom_label.clone(),
		connect_provider(entry),
		OrchestratorConfig::new(data_dir),
	))
}

/// Provider wiring point. The wire transport is an external integration
/// implementing [`SessionProvider`]; the in-tree loopback provider drives
/// the full lifecycle locally.
fn connect_provider(_entry: &RosterEntry) -> Arc<dyn SessionProvider> {
	Arc::new(SimProvider::new())
}

/// Prints a prompt whenever an account suspends on a login challenge.
fn watch_challenges(orchestrator: &SessionOrchestrator) {
	let account = orchestrator.account().to_string();
	orchestrator
		.bus()
		.subscribe(EventKind::ChallengeRequired, move |event| {
			let FarmEvent::ChallengeRequired {
				domain_hint,
				last_code_wrong,
				..
			} = event
			else {
				return;
			};
			let hint = domain_hint.as_deref().unwrap_or("authenticator");
			let prompt = if *last_code_wrong {
				format!("{account}: code rejected, try again with: code {account} <code>").red()
			} else {
				format!("{account}: login code needed ({hint}), answer with: code {account} <code>")
					.yellow()
			};
			println!("{prompt}");
		});
}
