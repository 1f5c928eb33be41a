//! Per-account session-token cache.
//!
//! One JSON file per account under the cache directory. A cached token lets a
//! relogin after a transient drop skip the full credential exchange (and any
//! second-factor challenge). Corruption is never fatal: a file that fails to
//! parse is logged, dropped, and treated as a miss.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::persist;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
	token: String,
	account_id: String,
}

/// Durable account → reusable-session-token store.
#[derive(Debug, Clone)]
pub struct SessionCache {
	dir: PathBuf,
}

impl SessionCache {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	fn entry_path(&self, account: &str) -> PathBuf {
		self.dir.join(format!("{account}.json"))
	}

	/// Persists `token` for `account`. Best-effort: a failed write is logged
	/// and reported as `false`, never raised.
	pub fn save(&self, account: &str, token: &str) -> bool {
		let entry = CacheEntry {
			token: token.to_string(),
			account_id: account.to_string(),
		};
		let json = match serde_json::to_vec_pretty(&entry) {
			Ok(json) => json,
			Err(err) => {
				warn!(target = "farm.cache", account, error = %err, "failed to encode session token");
				return false;
			}
		};
		match persist::write_atomic(&self.entry_path(account), &json) {
			Ok(()) => {
				debug!(target = "farm.cache", account, "session token cached");
				true
			}
			Err(err) => {
				warn!(target = "farm.cache", account, error = %err, "failed to write session token");
				false
			}
		}
	}

	/// Loads the cached token for `account`, or `None` on miss or corruption.
	pub fn load(&self, account: &str) -> Option<String> {
		let path = self.entry_path(account);
		let raw = fs::read_to_string(&path).ok()?;

		let entry: CacheEntry = match serde_json::from_str(&raw) {
			Ok(entry) => entry,
			Err(err) => {
				warn!(
					target = "farm.cache",
					account,
					path = %path.display(),
					error = %err,
					"corrupt session-token cache entry; discarding"
				);
				let _ = fs::remove_file(&path);
				return None;
			}
		};

		if entry.account_id != account {
			warn!(
				target = "farm.cache",
				account,
				found = entry.account_id,
				"session-token cache entry names another account; ignoring"
			);
			return None;
		}

		Some(entry.token)
	}

	/// Forgets the cached token for `account` (e.g. after the provider
	/// rejected it). Returns whether an entry existed.
	pub fn clear(&self, account: &str) -> bool {
		match persist::remove_if_present(&self.entry_path(account)) {
			Ok(existed) => existed,
			Err(err) => {
				warn!(target = "farm.cache", account, error = %err, "failed to clear session token");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cache() -> (tempfile::TempDir, SessionCache) {
		let dir = tempfile::tempdir().unwrap();
		let cache = SessionCache::new(dir.path());
		(dir, cache)
	}

	#[test]
	fn save_then_load_round_trips() {
		let (_dir, cache) = cache();
		assert!(cache.save("alice", "deadbeef"));
		assert_eq!(cache.load("alice").as_deref(), Some("deadbeef"));
	}

	#[test]
	fn missing_entry_is_a_miss() {
		let (_dir, cache) = cache();
		assert_eq!(cache.load("nobody"), None);
	}

	#[test]
	fn corrupt_entry_is_a_logged_miss_and_discarded() {
		let (dir, cache) = cache();
		let path = dir.path().join("alice.json");
		fs::write(&path, "{not json").unwrap();

		assert_eq!(cache.load("alice"), None);
		assert!(!path.exists());
	}

	#[test]
	fn entry_for_another_account_is_ignored() {
		let (dir, cache) = cache();
		assert!(cache.save("bob", "cafef00d"));
		fs::rename(dir.path().join("bob.json"), dir.path().join("alice.json")).unwrap();

		assert_eq!(cache.load("alice"), None);
	}

	#[test]
	fn interrupted_save_leaves_previous_value_loadable() {
		let (dir, cache) = cache();
		assert!(cache.save("alice", "previous"));

		// A save that dies before the rename leaves only a temp file behind.
		fs::write(dir.path().join("alice.json.tmp"), "half-written garbag").unwrap();

		assert_eq!(cache.load("alice").as_deref(), Some("previous"));
	}

	#[test]
	fn clear_reports_whether_an_entry_existed() {
		let (_dir, cache) = cache();
		assert!(!cache.clear("alice"));
		assert!(cache.save("alice", "deadbeef"));
		assert!(cache.clear("alice"));
		assert_eq!(cache.load("alice"), None);
	}

	#[test]
	fn newer_save_supersedes_the_cached_token() {
		let (_dir, cache) = cache();
		assert!(cache.save("alice", "old"));
		assert!(cache.save("alice", "new"));
		assert_eq!(cache.load("alice").as_deref(), Some("new"));
	}
}
