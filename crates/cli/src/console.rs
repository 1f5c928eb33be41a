//! Interactive command reader available while farming.
//!
//! Reads commands from stdin line by line: `status`, `add`, `remove`,
//! `reconnect`, `code`, `stop`, `help`. Returns when the user asks to stop
//! or stdin closes; the caller then shuts the fleet down.

use std::sync::Arc;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use idlefarm::{FleetRunner, SessionPhase};
use idlefarm_provider::ActivityEntry;

pub async fn run_console(fleet: Arc<FleetRunner>) {
	println!("{}", "type 'help' for commands".dimmed());

	let stdin = BufReader::new(tokio::io::stdin());
	let mut lines = stdin.lines();

	while let Ok(Some(line)) = lines.next_line().await {
		let mut parts = line.split_whitespace();
		let Some(command) = parts.next() else {
			continue;
		};
		let rest: Vec<&str> = parts.collect();

		match command {
			"status" => print_status(&fleet),
			"stop" => {
				println!("stopping all accounts...");
				return;
			}
			"add" => add(&fleet, &rest).await,
			"remove" => remove(&fleet, &rest).await,
			"reconnect" => reconnect(&fleet, &rest).await,
			"code" => code(&fleet, &rest),
			"help" => print_help(),
			other => {
				println!("unknown command {other:?}");
				print_help();
			}
		}
	}
}

fn print_help() {
	println!(
		"commands:\n  status                         show all accounts\n  add <account> <id> [label]     start farming an activity\n  remove <account> <id>          stop farming an activity\n  reconnect <account>            drop and re-establish a session\n  code <account> <code>          answer a pending login challenge\n  stop                           stop farming and exit\n  help                           this text"
	);
}

fn print_status(fleet: &FleetRunner) {
	for orchestrator in fleet.orchestrators() {
		let status = orchestrator.status();
		let phase = match status.phase {
			SessionPhase::LoggedOn => "logged on".green(),
			SessionPhase::Reconnecting | SessionPhase::Connecting => {
				format!("{:?}", status.phase).to_lowercase().yellow()
			}
			SessionPhase::Failed => "failed".red(),
			other => format!("{other:?}").to_lowercase().normal(),
		};
		println!("{} [{}]", status.account.bold(), phase);

		for activity in &status.activities {
			let hours = activity.accumulated_secs / 3600.0;
			match activity.target_hours {
				Some(target) if target > 0.0 => {
					// Informational only; completion decisions happen on the
					// checkpoint tick.
					let percent = (hours / target * 100.0).min(100.0);
					println!("  {:<28} {hours:>8.2}h / {target:.2}h ({percent:.0}%)", activity.entry.to_string());
				}
				_ => println!("  {:<28} {hours:>8.2}h", activity.entry.to_string()),
			}
		}
	}
}

async fn add(fleet: &FleetRunner, args: &[&str]) {
	let (Some(account), Some(id)) = (args.first(), args.get(1)) else {
		println!("usage: add <account> <id> [label]");
		return;
	};
	let Ok(id) = id.parse::<u32>() else {
		println!("activity id must be a number");
		return;
	};
	let Some(orchestrator) = fleet.find(account) else {
		println!("no such account {account:?}");
		return;
	};

	let entry = if args.len() > 2 {
		ActivityEntry::labeled(id, args[2..].join(" "))
	} else {
		ActivityEntry::new(id)
	};
	match orchestrator.add_activity(entry).await {
		Ok(true) => println!("added activity {id} to {account}"),
		Ok(false) => println!("{account} already farms activity {id}"),
		Err(err) => println!("could not add activity: {err}"),
	}
}

async fn remove(fleet: &FleetRunner, args: &[&str]) {
	let (Some(account), Some(id)) = (args.first(), args.get(1)) else {
		println!("usage: remove <account> <id>");
		return;
	};
	let Ok(id) = id.parse::<u32>() else {
		println!("activity id must be a number");
		return;
	};
	let Some(orchestrator) = fleet.find(account) else {
		println!("no such account {account:?}");
		return;
	};

	match orchestrator.remove_activity(id).await {
		Ok(true) => println!("removed activity {id} from {account}"),
		Ok(false) => println!("{account} does not farm activity {id}"),
		Err(err) => println!("could not remove activity: {err}"),
	}
}

async fn reconnect(fleet: &FleetRunner, args: &[&str]) {
	let Some(account) = args.first() else {
		println!("usage: reconnect <account>");
		return;
	};
	let Some(orchestrator) = fleet.find(account) else {
		println!("no such account {account:?}");
		return;
	};
	orchestrator.reconnect_now().await;
}

fn code(fleet: &FleetRunner, args: &[&str]) {
	let (Some(account), Some(code)) = (args.first(), args.get(1)) else {
		println!("usage: code <account> <code>");
		return;
	};
	let Some(orchestrator) = fleet.find(account) else {
		println!("no such account {account:?}");
		return;
	};
	orchestrator.submit_code(*code);
	println!("code forwarded to {account}");
}
