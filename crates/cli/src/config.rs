//! Account roster loading and data-directory resolution.
//!
//! The roster is a JSON file listing the accounts to farm, their activities,
//! and optional per-activity hour targets. A malformed roster is an
//! unrecoverable startup error.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use idlefarm::TargetSpec;
use idlefarm_provider::ActivityEntry;

/// One account in the roster file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RosterEntry {
	pub name: String,
	#[serde(default)]
	pub password: Option<String>,
	/// Pre-shared second-factor seed; with one set, no interactive code
	/// entry is needed.
	#[serde(default)]
	pub shared_secret: Option<String>,
	pub activities: Vec<ActivityEntry>,
	/// Hours to farm per activity id (keys are ids as strings). Omitted
	/// ids farm indefinitely.
	#[serde(default)]
	pub targets: HashMap<String, f64>,
	/// Display label broadcast ahead of the activity list.
	#[serde(default)]
	pub custom_label: Option<String>,
}

impl RosterEntry {
	/// Parses the string-keyed target map into a typed spec.
	pub fn target_spec(&self) -> Result<TargetSpec> {
		let mut targets = TargetSpec::new();
		for (id, hours) in &self.targets {
			let id: u32 = id.parse().with_context(|| {
				format!("account {:?}: target key {id:?} is not an activity id", self.name)
			})?;
			if !hours.is_finite() || *hours < 0.0 {
				bail!("account {:?}: target for activity {id} must be a non-negative number", self.name);
			}
			targets.insert(id, *hours);
		}
		Ok(targets)
	}
}

/// The roster file as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Roster {
	pub accounts: Vec<RosterEntry>,
}

/// Loads and validates a roster file.
pub fn load_roster(path: &Path) -> Result<Roster> {
	let raw = fs::read_to_string(path)
		.with_context(|| format!("cannot read roster {}", path.display()))?;
	let roster: Roster = serde_json::from_str(&raw)
		.with_context(|| format!("malformed roster {}", path.display()))?;
	validate(&roster)?;
	Ok(roster)
}

fn validate(roster: &Roster) -> Result<()> {
	if roster.accounts.is_empty() {
		bail!("roster lists no accounts");
	}

	let mut names = HashSet::new();
	for entry in &roster.accounts {
		if entry.name.trim().is_empty() {
			bail!("roster contains an account with an empty name");
		}
		if !names.insert(entry.name.as_str()) {
			bail!("duplicate account {:?} in roster", entry.name);
		}
		if entry.activities.is_empty() {
			bail!("account {:?} lists no activities", entry.name);
		}

		let mut ids = HashSet::new();
		for activity in &entry.activities {
			if !ids.insert(activity.id) {
				bail!("account {:?} lists activity {} twice", entry.name, activity.id);
			}
		}

		let targets = entry.target_spec()?;
		for id in targets.keys() {
			if !ids.contains(id) {
				bail!(
					"account {:?} targets activity {id} but does not farm it",
					entry.name
				);
			}
		}
	}
	Ok(())
}

/// Root for per-account persisted state (session tokens, ledgers).
/// `IDLEFARM_DATA_DIR` overrides the platform default.
pub fn data_dir() -> PathBuf {
	if let Some(dir) = std::env::var_os("IDLEFARM_DATA_DIR") {
		return PathBuf::from(dir);
	}
	dirs::data_local_dir()
		.unwrap_or_else(|| PathBuf::from("."))
		.join("idlefarm")
}

/// Starter roster written by `idlefarm init`.
pub const SAMPLE_ROSTER: &str = r#"{
  "accounts": [
    {
      "name": "alice",
      "password": "hunter2",
      "activities": [
        { "id": 730 },
        { "id": 440, "label": "Backup title" }
      ],
      "targets": { "730": 10.0 },
      "customLabel": "Farming hours"
    }
  ]
}
"#;

#[cfg(test)]
mod tests {
	use super::*;

	fn write_roster(content: &str) -> (tempfile::TempDir, PathBuf) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("accounts.json");
		fs::write(&path, content).unwrap();
		(dir, path)
	}

	#[test]
	fn sample_roster_loads_cleanly() {
		let (_dir, path) = write_roster(SAMPLE_ROSTER);
		let roster = load_roster(&path).unwrap();
		assert_eq!(roster.accounts.len(), 1);

		let entry = &roster.accounts[0];
		assert_eq!(entry.name, "alice");
		assert_eq!(entry.activities[1].label.as_deref(), Some("Backup title"));
		assert_eq!(entry.custom_label.as_deref(), Some("Farming hours"));
		assert_eq!(entry.target_spec().unwrap().get(&730), Some(&10.0));
	}

	#[test]
	fn malformed_json_is_an_error() {
		let (_dir, path) = write_roster("{ not json");
		assert!(load_roster(&path).is_err());
	}

	#[test]
	fn empty_account_list_is_rejected() {
		let (_dir, path) = write_roster(r#"{ "accounts": [] }"#);
		assert!(load_roster(&path).is_err());
	}

	#[test]
	fn duplicate_account_names_are_rejected() {
		let (_dir, path) = write_roster(
			r#"{ "accounts": [
				{ "name": "alice", "activities": [{ "id": 1 }] },
				{ "name": "alice", "activities": [{ "id": 2 }] }
			] }"#,
		);
		assert!(load_roster(&path).is_err());
	}

	#[test]
	fn duplicate_activity_ids_are_rejected() {
		let (_dir, path) = write_roster(
			r#"{ "accounts": [
				{ "name": "alice", "activities": [{ "id": 1 }, { "id": 1 }] }
			] }"#,
		);
		assert!(load_roster(&path).is_err());
	}

	#[test]
	fn target_for_an_unfarmed_activity_is_rejected() {
		let (_dir, path) = write_roster(
			r#"{ "accounts": [
				{ "name": "alice", "activities": [{ "id": 1 }], "targets": { "2": 1.0 } }
			] }"#,
		);
		assert!(load_roster(&path).is_err());
	}

	#[test]
	fn non_numeric_target_key_is_rejected() {
		let (_dir, path) = write_roster(
			r#"{ "accounts": [
				{ "name": "alice", "activities": [{ "id": 1 }], "targets": { "one": 1.0 } }
			] }"#,
		);
		assert!(load_roster(&path).is_err());
	}

	#[test]
	fn negative_target_hours_are_rejected() {
		let (_dir, path) = write_roster(
			r#"{ "accounts": [
				{ "name": "alice", "activities": [{ "id": 1 }], "targets": { "1": -2.0 } }
			] }"#,
		);
		assert!(load_roster(&path).is_err());
	}

	#[test]
	fn data_dir_honours_the_env_override() {
		// Tests share one process; restore the previous value.
		let previous = std::env::var_os("IDLEFARM_DATA_DIR");
		unsafe { std::env::set_var("IDLEFARM_DATA_DIR", "/tmp/idlefarm-test") };
		assert_eq!(data_dir(), PathBuf::from("/tmp/idlefarm-test"));
		match previous {
			Some(value) => unsafe { std::env::set_var("IDLEFARM_DATA_DIR", value) },
			None => unsafe { std::env::remove_var("IDLEFARM_DATA_DIR") },
		}
	}
}
