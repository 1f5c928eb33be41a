//! `check` — validate the roster and print the farming plan.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::config;

pub fn check(config_path: &Path) -> Result<()> {
	let roster = config::load_roster(config_path)?;
	println!(
		"{}: {} account(s) ok",
		config_path.display(),
		roster.accounts.len()
	);

	for entry in &roster.accounts {
		let auth = match (&entry.password, &entry.shared_secret) {
			(Some(_), Some(_)) => "password + seed",
			(Some(_), None) => "password (interactive codes)",
			(None, Some(_)) => "seed only",
			(None, None) => "cached token only",
		};
		println!("{} [{auth}]", entry.name.bold());

		let targets = entry.target_spec()?;
		for activity in &entry.activities {
			match targets.get(&activity.id) {
				Some(hours) => println!("  {activity} until {hours:.2}h"),
				None => println!("  {activity} indefinitely"),
			}
		}
		if let Some(label) = &entry.custom_label {
			println!("  display label: {label:?}");
		}
	}
	Ok(())
}
