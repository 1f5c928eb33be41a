//! Crash-safe per-activity playtime ledger.
//!
//! Converts wall-clock session time into durable accumulated seconds per
//! activity, independent of how often the session drops and comes back. The
//! ledger file is rewritten atomically on every checkpoint, so a crash loses
//! at most one checkpoint interval, never committed progress. Reopening an
//! existing ledger resumes it; nothing is reset.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::persist;

/// Hours-of-playtime targets per activity id. An activity with no entry
/// farms indefinitely.
pub type TargetSpec = HashMap<u32, f64>;

const SECS_PER_HOUR: f64 = 3600.0;

/// Per-account elapsed-seconds ledger with clock state for running
/// activities.
pub struct PlaytimeAccumulator {
	account: String,
	path: PathBuf,
	ledger: HashMap<u32, f64>,
	running: HashMap<u32, Instant>,
}

impl PlaytimeAccumulator {
	/// Opens (or creates) the ledger for `account` under `dir`. An existing
	/// file resumes previously committed seconds; a corrupt file is logged
	/// and treated as empty.
	pub fn open(account: impl Into<String>, dir: &Path) -> Self {
		let account = account.into();
		let path = dir.join(format!("{account}.json"));
		let ledger = load_ledger(&account, &path);
		Self {
			account,
			path,
			ledger,
			running: HashMap::new(),
		}
	}

	/// Starts the clock for every listed activity not already running.
	/// Previously committed seconds are kept as they are.
	pub fn begin(&mut self, ids: &[u32]) {
		self.begin_at(ids, Instant::now());
	}

	/// Commits elapsed time for all running activities and restarts their
	/// clocks, then persists the ledger.
	pub fn checkpoint(&mut self) {
		self.checkpoint_at(Instant::now());
	}

	/// Disconnect boundary: commit elapsed time, then stop all clocks.
	///
	/// Wall time spent disconnected is neither counted nor double-counted; a
	/// later [`begin`](Self::begin) restarts the clocks at the new
	/// connection time.
	pub fn suspend(&mut self) {
		self.suspend_at(Instant::now());
	}

	fn begin_at(&mut self, ids: &[u32], now: Instant) {
		for &id in ids {
			self.running.entry(id).or_insert(now);
			self.ledger.entry(id).or_insert(0.0);
		}
		debug!(
			target = "farm.ledger",
			account = self.account,
			running = self.running.len(),
			"activity clocks started"
		);
	}

	fn checkpoint_at(&mut self, now: Instant) {
		for (id, started) in self.running.iter_mut() {
			let elapsed = now.duration_since(*started).as_secs_f64();
			*self.ledger.entry(*id).or_insert(0.0) += elapsed;
			*started = now;
		}
		self.persist();
	}

	fn suspend_at(&mut self, now: Instant) {
		self.checkpoint_at(now);
		self.running.clear();
	}

	/// Running activities whose committed seconds have reached their target.
	/// Does not mutate state.
	pub fn completed(&self, targets: &TargetSpec) -> Vec<u32> {
		let mut done: Vec<u32> = self
			.running
			.keys()
			.copied()
			.filter(|id| {
				targets.get(id).is_some_and(|hours| {
					self.ledger.get(id).copied().unwrap_or(0.0) >= hours * SECS_PER_HOUR
				})
			})
			.collect();
		done.sort_unstable();
		done
	}

	/// Stops tracking the listed activities and removes their ledger
	/// entries, then persists.
	pub fn drop_activities(&mut self, ids: &[u32]) {
		for id in ids {
			self.running.remove(id);
			if self.ledger.remove(id).is_some() {
				info!(
					target = "farm.ledger",
					account = self.account,
					activity = id,
					"ledger entry removed"
				);
			}
		}
		self.persist();
	}

	/// Committed seconds for one activity (excludes the in-flight interval).
	pub fn committed_secs(&self, id: u32) -> f64 {
		self.ledger.get(&id).copied().unwrap_or(0.0)
	}

	/// Committed plus in-flight seconds, for display only.
	pub fn live_secs(&self, id: u32) -> f64 {
		let in_flight = self
			.running
			.get(&id)
			.map(|started| started.elapsed().as_secs_f64())
			.unwrap_or(0.0);
		self.committed_secs(id) + in_flight
	}

	pub fn is_running(&self, id: u32) -> bool {
		self.running.contains_key(&id)
	}

	/// Persists the ledger. Best-effort: failure is logged and farming
	/// continues in memory.
	fn persist(&self) {
		let on_disk: BTreeMap<String, f64> = self
			.ledger
			.iter()
			.map(|(id, secs)| (id.to_string(), *secs))
			.collect();
		let json = match serde_json::to_vec_pretty(&on_disk) {
			Ok(json) => json,
			Err(err) => {
				warn!(target = "farm.ledger", account = self.account, error = %err, "failed to encode ledger");
				return;
			}
		};
		if let Err(err) = persist::write_atomic(&self.path, &json) {
			warn!(
				target = "farm.ledger",
				account = self.account,
				path = %self.path.display(),
				error = %err,
				"failed to persist ledger; progress kept in memory"
			);
		}
	}
}

fn load_ledger(account: &str, path: &Path) -> HashMap<u32, f64> {
	let Ok(raw) = fs::read_to_string(path) else {
		return HashMap::new();
	};

	let parsed: BTreeMap<String, f64> = match serde_json::from_str(&raw) {
		Ok(parsed) => parsed,
		Err(err) => {
			warn!(
				target = "farm.ledger",
				account,
				path = %path.display(),
				error = %err,
				"corrupt ledger; starting empty"
			);
			return HashMap::new();
		}
	};

	parsed
		.into_iter()
		.filter_map(|(id, secs)| match id.parse::<u32>() {
			Ok(id) if secs >= 0.0 => Some((id, secs)),
			_ => {
				warn!(target = "farm.ledger", account, entry = id, "ignoring bad ledger entry");
				None
			}
		})
		.collect()
}
