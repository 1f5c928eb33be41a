//! Crash-safe persistence primitive shared by the token cache and the ledger.
//!
//! All on-disk state goes through [`write_atomic`]: the payload lands in a
//! temporary file next to the target, is flushed, and only then renamed over
//! the target. A crash mid-write leaves the previous file intact; a torn
//! temporary is never readable under the target path.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Writes `bytes` to `path` via a sibling temp file and atomic rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}

	let tmp = tmp_path(path);
	{
		let mut file = File::create(&tmp)?;
		file.write_all(bytes)?;
		file.sync_all()?;
	}

	if let Err(err) = fs::rename(&tmp, path) {
		let _ = fs::remove_file(&tmp);
		return Err(err);
	}
	Ok(())
}

/// Removes `path`, reporting whether anything was there.
pub fn remove_if_present(path: &Path) -> io::Result<bool> {
	match fs::remove_file(path) {
		Ok(()) => Ok(true),
		Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
		Err(err) => Err(err),
	}
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
	let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(".tmp");
	path.with_file_name(name)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn write_atomic_creates_parents_and_replaces() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested/state.json");

		write_atomic(&path, b"one").unwrap();
		assert_eq!(fs::read(&path).unwrap(), b"one");

		write_atomic(&path, b"two").unwrap();
		assert_eq!(fs::read(&path).unwrap(), b"two");
	}

	#[test]
	fn stray_temp_file_never_shadows_the_target() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("state.json");

		write_atomic(&path, b"committed").unwrap();
		// A write interrupted before rename leaves only the temp behind.
		fs::write(tmp_path(&path), b"torn").unwrap();

		assert_eq!(fs::read(&path).unwrap(), b"committed");
	}

	#[test]
	fn remove_if_present_reports_absence() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("gone.json");

		assert!(!remove_if_present(&path).unwrap());
		write_atomic(&path, b"x").unwrap();
		assert!(remove_if_present(&path).unwrap());
		assert!(!path.exists());
	}
}
